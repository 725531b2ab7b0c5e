//! # VE.Direct Monitor Library
//!
//! Decode the text-mode telemetry of Victron battery monitors and charge
//! controllers and distribute it to displays, logs and other processes.
//!
//! This library provides the frame reader, field catalog and decoder, the
//! derived-metric synthesizer and the sinks; the `vedirect-mon` binary wires
//! them together from configuration.

pub mod config;
pub mod cycle;
pub mod error;
pub mod pipeline;
pub mod relay;
pub mod serial;
pub mod sink;
pub mod vedirect;
