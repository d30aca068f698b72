//! Battery characterization bench
//!
//! This module provides:
//! - Discharge current parsing and single-byte setpoint encoding
//! - Operator prompts
//! - Telemetry line decoding and header stripping
//! - Per-run CSV logs
//! - The session state machine tying them together

pub mod command;
pub mod logfile;
pub mod prompt;
pub mod session;
pub mod telemetry;

pub use command::Current;
pub use prompt::Prompter;
pub use session::{Presets, Session};
