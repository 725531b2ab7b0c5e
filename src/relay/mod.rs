//! # Distribution Role and Relay
//!
//! One process owns the input (serial device or replay file) and may
//! republish every record to subscribers. Subscribers read the owner's
//! stream instead of a device.
//!
//! The core only sees two narrow capabilities: [`Publisher`] to write one
//! record, and an `AsyncBufRead` to read records. The Unix socket
//! transport in [`unix`] is one binding of both.

pub mod unix;

use crate::config::InputSource;
use crate::error::Result;

pub use unix::{subscribe, UnixRelay};

/// Role of this process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Reads the device or a replay file; stamps time and tracks events
    SourceOwner,
    /// Reads a stream relayed by an owner
    Subscriber,
}

impl Role {
    /// Role implied by the input source
    pub fn for_source(source: InputSource) -> Self {
        match source {
            InputSource::Device | InputSource::Replay => Role::SourceOwner,
            InputSource::Relay => Role::Subscriber,
        }
    }

    /// Whether the plot log is written when the config leaves it unset
    pub fn plots_by_default(self) -> bool {
        self == Role::SourceOwner
    }
}

/// Capability to forward one `(key, value)` record to subscribers
#[cfg_attr(test, mockall::automock)]
pub trait Publisher: Send {
    /// Publish a record
    ///
    /// Must not block on slow subscribers.
    fn publish(&self, key: &str, value: &str) -> Result<()>;
}

/// Wire form of a relayed record
pub fn encode_line(key: &str, value: &str) -> String {
    format!("{}\t{}\n", key, value)
}
