//! Serial port communication with the bench controller board
//!
//! This module provides functionality for:
//! - Listing available serial ports
//! - Opening the controller link with a read timeout
//! - Streaming telemetry to the console and the session log

pub mod monitor;
pub mod port;

pub use monitor::StopReason;
pub use port::{PortConfig, SerialConnection};
