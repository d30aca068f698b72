//! Error types for bench sessions
//!
//! Setup and streaming failures are kept apart so the CLI can tell a bad
//! operator input from a dropped serial link or a corrupt telemetry line.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::bench::session::SessionState;

/// Result alias used by the bench modules
pub type BenchResult<T> = std::result::Result<T, BenchError>;

/// Everything that can stop a bench session
#[derive(Error, Debug)]
pub enum BenchError {
    /// Operator text could not be turned into a discharge current
    #[error("invalid discharge current {input:?}: {reason}")]
    InvalidInput { input: String, reason: String },

    /// The current does not fit the single-byte setpoint
    #[error(
        "discharge current {current}A encodes to {code}, above the single-byte limit (max {}A)",
        crate::bench::command::MAX_CURRENT_AMPS
    )]
    CurrentOutOfRange { current: f64, code: u32 },

    /// The serial port could not be opened
    #[error("failed to open serial port {port}: {source}")]
    SerialOpen {
        port: String,
        #[source]
        source: serialport::Error,
    },

    /// Reading from or writing to the serial port failed
    #[error("serial I/O error: {0}")]
    SerialIo(#[from] std::io::Error),

    /// Reading operator input or writing to the console failed
    #[error("console I/O error: {0}")]
    Console(#[source] std::io::Error),

    /// A telemetry line was not valid UTF-8
    #[error("telemetry line is not valid UTF-8: {0}")]
    Decode(#[from] std::string::FromUtf8Error),

    /// The log file could not be created
    #[error("failed to open log file {}: {source}", .path.display())]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Appending to or flushing the log file failed
    #[error("failed to write log file {}: {source}", .path.display())]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file could not be read or parsed
    #[error("invalid configuration {}: {reason}", .path.display())]
    Config { path: PathBuf, reason: String },

    /// A session step was attempted out of order
    #[error("invalid session transition from {from:?} to {to:?}")]
    InvalidTransition { from: SessionState, to: SessionState },

    /// No telemetry arrived within the configured idle limit
    #[error("no telemetry received for {0:?}")]
    Idle(Duration),
}

impl BenchError {
    /// True when the serial link went away rather than misbehaved
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            BenchError::SerialIo(e) if matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::NotConnected
            )
        )
    }
}
