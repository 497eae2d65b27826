//! # simgate-types::errors
//!
//! Defines the common error taxonomy used throughout the simgate
//! workspace. Using `thiserror` provides clean, descriptive error handling.
//! Transient conditions (reconnects, codec skips) never appear here; they
//! are handled and logged inside their subsystem.

use crate::time::SimTime;
use thiserror::Error;

/// An error in the static configuration of the process.
///
/// Raised synchronously while components are constructed; fatal for the
/// initialization path. Where a concrete property is at fault, the variant
/// carries its dotted key and the offending value.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing configuration property `{key}`")]
    Missing { key: String },
    #[error("invalid value \"{value}\" for configuration property `{key}`: {message}")]
    Entry {
        key: String,
        value: String,
        message: String,
    },
    #[error("invalid configuration: {0}")]
    Message(String),
    #[error("i/o error reading configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ConfigError {
    pub fn entry(
        key: impl Into<String>,
        value: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        ConfigError::Entry {
            key: key.into(),
            value: value.into(),
            message: message.into(),
        }
    }

    pub fn missing(key: impl Into<String>) -> Self {
        ConfigError::Missing { key: key.into() }
    }
}

/// The model solver cannot advance or commit its state.
///
/// Fatal: the dispatcher aborts the run. Carries the simulation time at
/// which the failure occurred.
#[derive(Error, Debug, Clone)]
#[error("{message} (at simulation time {time})")]
pub struct SolverError {
    pub time: SimTime,
    pub message: String,
}

impl SolverError {
    pub fn new(time: SimTime, message: impl Into<String>) -> Self {
        Self {
            time,
            message: message.into(),
        }
    }
}

/// A permanent error originating from the network subsystem.
///
/// Transient failures (EOF, timed-out packets) are recovered locally by
/// the subscriber and never reach this type; what remains aborts the run.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("connection to {addr} was closed")]
    ConnectionClosed { addr: String },
    #[error("i/o error on connection to {addr}: {source}")]
    Io {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("giving up on {addr} after {attempts} reconnection attempts")]
    ReconnectExhausted { addr: String, attempts: u32 },
}

/// An error while encoding values for the wire.
///
/// Inadmissible type casts are rejected at configuration time, so the only
/// runtime failures are value-dependent.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("string of {len} bytes exceeds the 16-bit length field")]
    StringTooLong { len: usize },
    #[error("a {src} value cannot be encoded as {wire}")]
    UnsupportedCast { src: String, wire: String },
}

/// An error raised while an event is distributed to listeners.
///
/// The dispatcher propagates it upward and the run aborts.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error(transparent)]
    Net(#[from] NetError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("the event queue has been shut down")]
    QueueClosed,
    #[error("data log write failed: {0}")]
    DataLog(std::io::Error),
}
