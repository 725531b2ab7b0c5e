//! # VE.Direct Protocol Module
//!
//! Decoding of the VE.Direct text protocol sent by Victron battery
//! monitors and charge controllers.
//!
//! This module handles:
//! - The field catalog (units, scaling, descriptions)
//! - Line reading with checksum resynchronization
//! - Fixed-point decoding of raw values
//! - Per-cycle synthesis of derived fields

pub mod catalog;
pub mod fixed;
pub mod reader;
pub mod decoder;
pub mod synth;
