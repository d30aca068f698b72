//! Telemetry stream monitor
//!
//! Reads lines from the controller board until cancelled or until the link
//! fails, echoing each payload to the console and appending it to the
//! session log.

use chrono::Local;
use colored::Colorize;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::bench::logfile::LogSink;
use crate::bench::telemetry::{LineReader, ParsedLine, ReadOutcome, TelemetryLine};
use crate::error::{BenchError, BenchResult};

/// Configuration for telemetry monitoring
#[derive(Debug, Clone, Default)]
pub struct MonitorConfig {
    /// Prefix console echo with a local timestamp
    pub show_timestamps: bool,
    /// Give up when no complete line arrives for this long
    pub idle_limit: Option<Duration>,
}

/// Why the stream stopped
#[derive(Debug)]
pub enum StopReason {
    /// The cancel flag was cleared (Ctrl+C)
    Cancelled,
    /// Reading, decoding or logging failed
    Failed(BenchError),
}

/// What happened during one stream
#[derive(Debug)]
pub struct StreamSummary {
    /// Lines echoed (and logged, when logging)
    pub lines: usize,
    /// Lines shorter than the header, dropped
    pub skipped: usize,
    pub stop: StopReason,
}

impl StreamSummary {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.stop, StopReason::Cancelled)
    }
}

/// Read-print-log loop over a serial link
pub struct TelemetryMonitor<'a, R: Read, W: Write> {
    reader: LineReader<R>,
    console: W,
    log: Option<&'a mut LogSink>,
    config: MonitorConfig,
    running: Arc<AtomicBool>,
    line_count: usize,
    skipped: usize,
}

impl<'a, R: Read, W: Write> TelemetryMonitor<'a, R, W> {
    /// Create a monitor; the stream runs while `running` stays true
    pub fn new(
        port: R,
        console: W,
        log: Option<&'a mut LogSink>,
        config: MonitorConfig,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            reader: LineReader::new(port),
            console,
            log,
            config,
            running,
            line_count: 0,
            skipped: 0,
        }
    }

    /// Run until cancelled or until the first error
    pub fn run(mut self) -> StreamSummary {
        let stop = match self.stream() {
            Ok(()) => StopReason::Cancelled,
            Err(e) => StopReason::Failed(e),
        };

        StreamSummary {
            lines: self.line_count,
            skipped: self.skipped,
            stop,
        }
    }

    fn stream(&mut self) -> BenchResult<()> {
        let mut last_line = Instant::now();

        while self.running.load(Ordering::SeqCst) {
            match self.reader.read_line()? {
                ReadOutcome::Line(raw) => {
                    last_line = Instant::now();
                    self.process_line(raw)?;
                }
                ReadOutcome::Pending => {
                    if let Some(limit) = self.config.idle_limit {
                        if last_line.elapsed() >= limit {
                            return Err(BenchError::Idle(limit));
                        }
                    }
                }
            }
        }

        if !self.reader.pending().is_empty() {
            log::warn!(
                "discarding {} bytes of an unfinished line",
                self.reader.pending().len()
            );
        }
        log::info!("telemetry stream cancelled after {} lines", self.line_count);
        Ok(())
    }

    /// Decode, strip, echo and log one raw line
    fn process_line(&mut self, raw: Vec<u8>) -> BenchResult<()> {
        let line = match TelemetryLine::parse(raw)? {
            ParsedLine::Record(line) => line,
            ParsedLine::TooShort(text) => {
                self.skipped += 1;
                log::warn!("skipping telemetry line shorter than its header: {:?}", text);
                return Ok(());
            }
        };

        self.line_count += 1;
        log::trace!("header {:?} payload {:?}", line.header, line.payload);

        let formatted = self.format_line(&line);
        writeln!(self.console, "{}", formatted).map_err(BenchError::Console)?;

        if let Some(sink) = self.log.as_deref_mut() {
            sink.append(&line)?;
        }

        Ok(())
    }

    /// Format a payload for display
    fn format_line(&self, line: &TelemetryLine) -> String {
        if self.config.show_timestamps {
            let timestamp = Local::now().format("%H:%M:%S%.3f");
            format!("{} {}", timestamp.to_string().dimmed(), line.payload)
        } else {
            line.payload.clone()
        }
    }
}
