use std::fmt;
use std::panic::Location;

use thiserror::Error;

use crate::types::SQLINTEGER;

/// SQLSTATE reported when no error is current.
pub const NO_ERROR_STATE: &str = "00000";

/// The first diagnostic record of a failing call, plus where the adapter saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub native_code: SQLINTEGER,
    /// Five-character SQLSTATE.
    pub state: String,
    pub message: String,
    /// Native call (or adapter operation) that failed.
    pub what: &'static str,
    pub file: &'static str,
    pub line: u32,
}

impl ErrorRecord {
    /// Record synthesized by the adapter itself, without asking the wire client.
    #[track_caller]
    pub fn synthesized(state: &str, message: impl Into<String>, what: &'static str) -> Self {
        let location = Location::caller();
        Self {
            native_code: 0,
            state: state.to_string(),
            message: message.into(),
            what,
            file: location.file(),
            line: location.line(),
        }
    }

    /// Host-facing triple, or `None` when the driver left no message.
    pub fn info(&self) -> Option<ErrorInfo> {
        if self.message.is_empty() {
            return None;
        }
        Some(ErrorInfo {
            code: self.native_code,
            message: format!(
                "{} ({}[{}] at {}:{})",
                self.message, self.what, self.native_code, self.file, self.line
            ),
            state: self.state.clone(),
        })
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SQLSTATE[{}]: {} ({}[{}] at {}:{})",
            self.state, self.message, self.what, self.native_code, self.file, self.line
        )
    }
}

/// What the host's "error info" call returns: native code, formatted message, SQLSTATE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: SQLINTEGER,
    pub message: String,
    pub state: String,
}

/// Errors surfaced by the adapter.
#[derive(Debug, Error)]
pub enum Error {
    /// Connection bootstrap failed before a connection bundle existed.
    #[error("SQLSTATE[{}] {}: {} {}", .0.state, .0.what, .0.native_code, .0.message)]
    Connect(ErrorRecord),

    /// A native call failed; the record is also stored in the bundle's error slot.
    #[error("{0}")]
    Native(ErrorRecord),

    /// The adapter refused an operation (open transaction, unknown attribute, ...).
    #[error("{0}")]
    Adapter(ErrorRecord),

    #[error("SQLSTATE[{state}]: {message}")]
    Rewrite { state: String, message: String },

    #[error("Invalid value for {option}: {reason}")]
    InvalidOption {
        option: &'static str,
        reason: String,
    },
}

impl Error {
    pub fn record(&self) -> Option<&ErrorRecord> {
        match self {
            Error::Connect(record) | Error::Native(record) | Error::Adapter(record) => Some(record),
            Error::Rewrite { .. } | Error::InvalidOption { .. } => None,
        }
    }

    pub fn sqlstate(&self) -> &str {
        match self {
            Error::Connect(record) | Error::Native(record) | Error::Adapter(record) => {
                &record.state
            }
            Error::Rewrite { state, .. } => state,
            Error::InvalidOption { .. } => "HY024",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
