//! Telemetry log files
//!
//! One CSV per run, named after the battery under test and the discharge
//! current: `logs/LiPo_1.5.csv`. Existing files are truncated.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::command::Current;
use super::telemetry::TelemetryLine;
use crate::error::{BenchError, BenchResult};

/// Build `<dir>/<battery>_<current>.csv`
pub fn log_path(dir: &Path, battery: &str, current: Current) -> PathBuf {
    dir.join(format!("{}_{}.csv", battery, current))
}

/// Open log file for one session
///
/// Closing consumes the sink, so a log is closed at most once. Dropping it
/// without `close` still flushes through `BufWriter`, but errors are lost.
#[derive(Debug)]
pub struct LogSink {
    path: PathBuf,
    writer: BufWriter<File>,
    lines: usize,
}

impl LogSink {
    /// Create (or truncate) the log file, optionally creating its directory
    pub fn create(path: PathBuf, create_dir: bool) -> BenchResult<Self> {
        if create_dir {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|source| BenchError::FileOpen {
                    path: path.clone(),
                    source,
                })?;
            }
        }

        let file = File::create(&path).map_err(|source| BenchError::FileOpen {
            path: path.clone(),
            source,
        })?;

        log::info!("logging telemetry to {}", path.display());

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            lines: 0,
        })
    }

    /// Append one line and flush it to disk
    pub fn append(&mut self, line: &TelemetryLine) -> BenchResult<()> {
        self.writer
            .write_all(line.log_text().as_bytes())
            .and_then(|_| self.writer.flush())
            .map_err(|source| BenchError::FileWrite {
                path: self.path.clone(),
                source,
            })?;

        self.lines += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush, sync and close; returns the number of lines written
    pub fn close(mut self) -> BenchResult<usize> {
        let path = self.path.clone();
        self.writer.flush().map_err(|source| BenchError::FileWrite {
            path: path.clone(),
            source,
        })?;

        let file = self.writer.into_inner().map_err(|e| BenchError::FileWrite {
            path: path.clone(),
            source: e.into_error(),
        })?;
        file.sync_all()
            .map_err(|source| BenchError::FileWrite { path, source })?;

        log::debug!("closed log {} after {} lines", self.path.display(), self.lines);
        Ok(self.lines)
    }
}
