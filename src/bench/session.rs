//! Bench session
//!
//! One discharge run: collect the setpoint, send the command byte, open the
//! log, then stream telemetry until cancelled or until the link fails.
//!
//! ```text
//! Idle -> Configuring -> CommandSent -> Streaming -> Terminated
//! ```
//!
//! Any state may jump to `Terminated`; nothing moves backwards.

use colored::Colorize;
use std::io::{BufRead, Read, Write};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use super::command::{CommandByte, Current};
use super::logfile::{log_path, LogSink};
use super::prompt::{normalize_battery, Prompter};
use crate::config::SessionSection;
use crate::error::{BenchError, BenchResult};
use crate::serial::monitor::{MonitorConfig, StopReason, StreamSummary, TelemetryMonitor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Configuring,
    CommandSent,
    Streaming,
    Terminated,
}

impl SessionState {
    /// The single forward step from this state
    fn next(self) -> Option<Self> {
        match self {
            Self::Idle => Some(Self::Configuring),
            Self::Configuring => Some(Self::CommandSent),
            Self::CommandSent => Some(Self::Streaming),
            Self::Streaming => Some(Self::Terminated),
            Self::Terminated => None,
        }
    }

    pub fn can_transition(self, to: Self) -> bool {
        self.next() == Some(to) || (to == Self::Terminated && self != Self::Terminated)
    }
}

/// Answers supplied up front instead of prompting
#[derive(Debug, Clone, Default)]
pub struct Presets {
    pub current: Option<Current>,
    pub battery: Option<String>,
    /// Disable logging without asking
    pub no_log: bool,
}

/// Operator choices for one run
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub current: Current,
    /// Battery name; `None` disables logging
    pub battery: Option<String>,
}

/// One run against the bench controller
pub struct Session<P: Read + Write> {
    port: P,
    config: SessionSection,
    state: SessionState,
    settings: Option<SessionSettings>,
    command: Option<CommandByte>,
    log: Option<LogSink>,
}

impl<P: Read + Write> Session<P> {
    /// Start a session on an already opened port
    pub fn new(port: P, config: SessionSection) -> Self {
        Self {
            port,
            config,
            state: SessionState::Idle,
            settings: None,
            command: None,
            log: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn settings(&self) -> Option<&SessionSettings> {
        self.settings.as_ref()
    }

    pub fn log_path(&self) -> Option<&std::path::Path> {
        self.log.as_ref().map(|l| l.path())
    }

    fn advance(&mut self, to: SessionState) -> BenchResult<()> {
        if !self.state.can_transition(to) {
            return Err(BenchError::InvalidTransition {
                from: self.state,
                to,
            });
        }

        log::debug!("session {:?} -> {:?}", self.state, to);
        self.state = to;
        Ok(())
    }

    /// Collect current and battery name, prompting for whatever `presets`
    /// leaves open. The setpoint is validated here, before anything is sent.
    pub fn configure<R: BufRead, W: Write>(
        &mut self,
        prompter: &mut Prompter<R, W>,
        presets: Presets,
    ) -> BenchResult<&SessionSettings> {
        self.advance(SessionState::Configuring)?;

        let result = Self::collect(prompter, presets);
        let (settings, command) = match result {
            Ok(pair) => pair,
            Err(e) => {
                self.state = SessionState::Terminated;
                return Err(e);
            }
        };

        log::info!(
            "setpoint {}A -> command byte {}, logging {}",
            settings.current,
            command,
            settings.battery.as_deref().unwrap_or("off")
        );

        self.command = Some(command);
        Ok(self.settings.insert(settings))
    }

    fn collect<R: BufRead, W: Write>(
        prompter: &mut Prompter<R, W>,
        presets: Presets,
    ) -> BenchResult<(SessionSettings, CommandByte)> {
        let current = match presets.current {
            Some(current) => current,
            None => prompter.ask_current()?,
        };
        let command = CommandByte::encode(current)?;

        let battery = if presets.no_log {
            None
        } else {
            match presets.battery {
                Some(name) => normalize_battery(&name),
                None => prompter.ask_battery()?,
            }
        };

        Ok((SessionSettings { current, battery }, command))
    }

    /// Write the command byte, then open the log when a battery was named
    pub fn send_command(&mut self) -> BenchResult<CommandByte> {
        let command = match (self.state, self.command) {
            (SessionState::Configuring, Some(command)) => command,
            _ => {
                return Err(BenchError::InvalidTransition {
                    from: self.state,
                    to: SessionState::CommandSent,
                })
            }
        };

        if let Err(e) = self.port.write_all(&command.as_bytes()).and_then(|_| self.port.flush()) {
            self.state = SessionState::Terminated;
            return Err(BenchError::SerialIo(e));
        }
        self.advance(SessionState::CommandSent)?;
        log::info!("sent command byte {}", command);

        if let Some(settings) = &self.settings {
            if let Some(battery) = &settings.battery {
                let path = log_path(&self.config.log_dir, battery, settings.current);
                match LogSink::create(path, self.config.create_log_dir) {
                    Ok(sink) => self.log = Some(sink),
                    Err(e) => {
                        self.state = SessionState::Terminated;
                        return Err(e);
                    }
                }
            }
        }

        Ok(command)
    }

    /// Announce the run, wait for the board to settle, then stream until
    /// `running` is cleared or the link fails. The log is closed exactly once
    /// on the way out, whatever stopped the stream.
    pub fn stream<W: Write>(
        &mut self,
        mut console: W,
        running: Arc<AtomicBool>,
    ) -> BenchResult<StreamSummary> {
        self.advance(SessionState::Streaming)?;

        if let Err(e) = writeln!(console, "{}", "Running profile".cyan().bold()) {
            return self.terminate_with(BenchError::Console(e));
        }
        if let Some(sink) = &self.log {
            log::debug!("streaming into {}", sink.path().display());
        }
        std::thread::sleep(self.config.settle());

        let monitor_config = MonitorConfig {
            show_timestamps: self.config.show_timestamps,
            idle_limit: self.config.idle_limit(),
        };
        let mut summary = TelemetryMonitor::new(
            &mut self.port,
            &mut console,
            self.log.as_mut(),
            monitor_config,
            running,
        )
        .run();

        let closed = self.log.take().map(LogSink::close).transpose();
        self.advance(SessionState::Terminated)?;

        match closed {
            Ok(Some(lines)) => log::info!("log closed with {} lines", lines),
            Ok(None) => {}
            Err(e) => {
                // A failed close outranks a plain cancellation
                if summary.is_cancelled() {
                    summary.stop = StopReason::Failed(e);
                } else {
                    log::error!("{}", e);
                }
            }
        }

        Ok(summary)
    }

    fn terminate_with<T>(&mut self, error: BenchError) -> BenchResult<T> {
        if let Some(sink) = self.log.take() {
            if let Err(e) = sink.close() {
                log::error!("{}", e);
            }
        }
        self.state = SessionState::Terminated;
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::{self, Cursor};
    use std::path::Path;
    use tempfile::tempdir;

    /// In-memory serial link: scripted input, recorded output
    struct FakePort {
        rx: Cursor<Vec<u8>>,
        tx: Vec<u8>,
    }

    impl FakePort {
        fn new(rx: &[u8]) -> Self {
            Self {
                rx: Cursor::new(rx.to_vec()),
                tx: Vec::new(),
            }
        }
    }

    impl Read for FakePort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.rx.read(buf)
        }
    }

    impl Write for FakePort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.tx.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn section(log_dir: &Path) -> SessionSection {
        SessionSection {
            log_dir: log_dir.to_path_buf(),
            settle_ms: 0,
            ..SessionSection::default()
        }
    }

    fn running() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(true))
    }

    #[test]
    fn test_state_transitions() {
        use SessionState::*;

        assert!(Idle.can_transition(Configuring));
        assert!(Streaming.can_transition(Terminated));
        assert!(Configuring.can_transition(Terminated));
        assert!(!Idle.can_transition(Streaming));
        assert!(!CommandSent.can_transition(Configuring));
        assert!(!Terminated.can_transition(Terminated));
    }

    #[test]
    fn test_full_run_with_logging() {
        let dir = tempdir().unwrap();
        let port = FakePort::new(b"OK,12.4,3.7\nOK,12.3,3.7\n");
        let mut session = Session::new(port, section(&dir.path().join("logs")));

        let mut prompter = Prompter::new(Cursor::new("1.5\nLiPo\n"), io::sink());
        session.configure(&mut prompter, Presets::default()).unwrap();

        let command = session.send_command().unwrap();
        assert_eq!(command.code(), 15);
        assert_eq!(session.port.tx, vec![15]);

        let expected = dir.path().join("logs").join("LiPo_1.5.csv");
        assert_eq!(session.log_path(), Some(expected.as_path()));

        let mut console = Vec::new();
        let summary = session.stream(&mut console, running()).unwrap();

        // The scripted port runs dry, which reads as a disconnect
        assert!(matches!(summary.stop, StopReason::Failed(ref e) if e.is_disconnect()));
        assert_eq!(summary.lines, 2);
        assert_eq!(session.state(), SessionState::Terminated);
        assert!(session.log_path().is_none());

        assert_eq!(
            fs::read_to_string(&expected).unwrap(),
            ",12.4,3.7\n,12.3,3.7\n"
        );
        let shown = String::from_utf8(console).unwrap();
        assert!(shown.contains("Running profile"));
        assert!(shown.ends_with(",12.4,3.7\n,12.3,3.7\n"));
    }

    #[test]
    fn test_blank_answers_send_zero_and_skip_log() {
        let dir = tempdir().unwrap();
        let log_dir = dir.path().join("logs");
        let mut session = Session::new(FakePort::new(b"OK,1\n"), section(&log_dir));

        let mut prompter = Prompter::new(Cursor::new("\n\n"), io::sink());
        let settings = session.configure(&mut prompter, Presets::default()).unwrap();
        assert_eq!(settings.battery, None);

        assert_eq!(session.send_command().unwrap().code(), 0);
        assert_eq!(session.port.tx, vec![0]);

        let mut console = Vec::new();
        let summary = session.stream(&mut console, running()).unwrap();

        assert_eq!(summary.lines, 1);
        assert!(String::from_utf8(console).unwrap().ends_with(",1\n"));
        assert!(!log_dir.exists());
    }

    #[test]
    fn test_out_of_range_current_sends_nothing() {
        let dir = tempdir().unwrap();
        let mut session = Session::new(FakePort::new(b""), section(dir.path()));

        let presets = Presets {
            current: Some(Current::new(25.6).unwrap()),
            no_log: true,
            ..Presets::default()
        };
        let mut prompter = Prompter::new(Cursor::new(""), io::sink());

        let err = session.configure(&mut prompter, presets).unwrap_err();
        assert!(matches!(err, BenchError::CurrentOutOfRange { code: 256, .. }));
        assert_eq!(session.state(), SessionState::Terminated);
        assert!(session.send_command().is_err());
        assert!(session.port.tx.is_empty());
    }

    #[test]
    fn test_presets_skip_prompts() {
        let dir = tempdir().unwrap();
        let mut session = Session::new(FakePort::new(b""), section(dir.path()));

        let presets = Presets {
            current: Some(Current::new(25.5).unwrap()),
            battery: Some("  NiMH ".to_string()),
            no_log: false,
        };
        let mut prompter = Prompter::new(Cursor::new(""), Vec::new());
        let settings = session.configure(&mut prompter, presets).unwrap().clone();

        assert_eq!(settings.battery.as_deref(), Some("NiMH"));
        assert_eq!(session.send_command().unwrap().code(), 255);
        assert!(dir.path().join("NiMH_25.5.csv").exists());
    }

    #[test]
    fn test_disconnect_mid_line_keeps_flushed_lines_only() {
        let dir = tempdir().unwrap();
        let port = FakePort::new(b"OK,1\nOK,2\nOK,3");
        let mut session = Session::new(port, section(dir.path()));

        let presets = Presets {
            current: Some(Current::new(1.0).unwrap()),
            battery: Some("LiPo".to_string()),
            no_log: false,
        };
        let mut prompter = Prompter::new(Cursor::new(""), io::sink());
        session.configure(&mut prompter, presets).unwrap();
        session.send_command().unwrap();

        let summary = session.stream(io::sink(), running()).unwrap();
        assert!(matches!(summary.stop, StopReason::Failed(ref e) if e.is_disconnect()));

        let logged = fs::read_to_string(dir.path().join("LiPo_1.0.csv")).unwrap();
        assert_eq!(logged, ",1\n,2\n");
    }

    #[test]
    fn test_cancelled_before_first_line() {
        let dir = tempdir().unwrap();
        let mut session = Session::new(FakePort::new(b"OK,1\n"), section(dir.path()));

        let presets = Presets {
            current: Some(Current::new(0.5).unwrap()),
            battery: Some("LiPo".to_string()),
            no_log: false,
        };
        let mut prompter = Prompter::new(Cursor::new(""), io::sink());
        session.configure(&mut prompter, presets).unwrap();
        session.send_command().unwrap();

        let summary = session
            .stream(io::sink(), Arc::new(AtomicBool::new(false)))
            .unwrap();

        assert!(summary.is_cancelled());
        assert_eq!(session.state(), SessionState::Terminated);
        assert_eq!(
            fs::read_to_string(dir.path().join("LiPo_0.5.csv")).unwrap(),
            ""
        );
    }

    #[test]
    fn test_steps_out_of_order_are_rejected() {
        let dir = tempdir().unwrap();
        let mut session = Session::new(FakePort::new(b""), section(dir.path()));

        assert!(matches!(
            session.send_command().unwrap_err(),
            BenchError::InvalidTransition { from: SessionState::Idle, .. }
        ));
        assert!(matches!(
            session.stream(io::sink(), running()).unwrap_err(),
            BenchError::InvalidTransition { .. }
        ));
    }
}
