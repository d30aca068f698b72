//! Telemetry lines from the controller board
//!
//! The board prints newline-terminated UTF-8 records. Every record starts
//! with a fixed-width header (two characters) that is dropped before the
//! payload is shown or logged. The header's meaning is not documented by the
//! firmware, so it is kept on the parsed line but never interpreted.

use std::io::{self, BufRead, BufReader, ErrorKind, Read};

use crate::error::{BenchError, BenchResult};

/// Width of the header at the start of every telemetry line, in characters
pub const TELEMETRY_PREFIX_WIDTH: usize = 2;

/// One decoded telemetry record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryLine {
    /// Stripped header characters
    pub header: String,
    /// Everything after the header, without the line terminator
    pub payload: String,
    /// Terminator as received (`"\n"` or `"\r\n"`)
    pub terminator: String,
}

/// Outcome of decoding one raw line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    Record(TelemetryLine),
    /// Content shorter than the header; carries the decoded text
    TooShort(String),
}

impl TelemetryLine {
    /// Decode raw bytes (terminator included) and strip the header
    pub fn parse(raw: Vec<u8>) -> BenchResult<ParsedLine> {
        let text = String::from_utf8(raw)?;

        let (content, terminator) = split_terminator(&text);
        if content.chars().count() < TELEMETRY_PREFIX_WIDTH {
            return Ok(ParsedLine::TooShort(content.to_string()));
        }

        // Header width is counted in characters, not bytes
        let split_at = content
            .char_indices()
            .nth(TELEMETRY_PREFIX_WIDTH)
            .map(|(idx, _)| idx)
            .unwrap_or(content.len());

        Ok(ParsedLine::Record(Self {
            header: content[..split_at].to_string(),
            payload: content[split_at..].to_string(),
            terminator: terminator.to_string(),
        }))
    }

    /// Payload with its original terminator, as written to the log file
    pub fn log_text(&self) -> String {
        format!("{}{}", self.payload, self.terminator)
    }
}

fn split_terminator(text: &str) -> (&str, &str) {
    if let Some(content) = text.strip_suffix("\r\n") {
        (content, "\r\n")
    } else if let Some(content) = text.strip_suffix('\n') {
        (content, "\n")
    } else {
        (text, "")
    }
}

/// Result of one read attempt
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A complete line arrived
    Line(Vec<u8>),
    /// The read timed out before a newline; partial bytes are kept
    Pending,
}

/// Newline-delimited reader over the serial link
///
/// Bytes received before a read timeout are buffered and prepended to the
/// next read, so timeouts never split a line.
pub struct LineReader<R: Read> {
    inner: BufReader<R>,
    pending: Vec<u8>,
}

impl<R: Read> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
            pending: Vec::new(),
        }
    }

    /// Read until a newline, a timeout or the end of the stream
    pub fn read_line(&mut self) -> BenchResult<ReadOutcome> {
        match self.inner.read_until(b'\n', &mut self.pending) {
            Ok(_) if self.pending.last() == Some(&b'\n') => {
                Ok(ReadOutcome::Line(std::mem::take(&mut self.pending)))
            }
            Ok(_) => {
                // End of stream; an unterminated tail is never handed out
                let dropped = std::mem::take(&mut self.pending).len();
                if dropped > 0 {
                    log::warn!("serial stream ended mid-line, discarded {} bytes", dropped);
                }
                Err(BenchError::SerialIo(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "serial port closed",
                )))
            }
            Err(ref e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                Ok(ReadOutcome::Pending)
            }
            Err(ref e) if e.kind() == ErrorKind::Interrupted => Ok(ReadOutcome::Pending),
            Err(e) => Err(BenchError::SerialIo(e)),
        }
    }

    /// Bytes received since the last complete line
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }
}
