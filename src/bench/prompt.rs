//! Operator prompts
//!
//! Prompts read from any `BufRead` and write to any `Write`, so sessions can
//! be driven from a terminal or from a script.

use std::io::{self, BufRead, Write};

use super::command::Current;
use crate::error::{BenchError, BenchResult};

pub const CURRENT_PROMPT: &str =
    "Enter discharge current (multiple of 0.1A) or leave blank for default 0:";
pub const BATTERY_PROMPT: &str = "Name battery type or leave blank to not log data:";

pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Print `question` and read one line, without its terminator.
    /// End of input reads as a blank answer.
    pub fn ask(&mut self, question: &str) -> io::Result<String> {
        writeln!(self.output, "{}", question)?;
        self.output.flush()?;

        let mut answer = String::new();
        self.input.read_line(&mut answer)?;

        Ok(answer.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Ask for the discharge current
    pub fn ask_current(&mut self) -> BenchResult<Current> {
        let answer = self.ask(CURRENT_PROMPT).map_err(BenchError::Console)?;
        Current::parse_input(&answer)
    }

    /// Ask for the battery name; `None` means logging is off
    pub fn ask_battery(&mut self) -> BenchResult<Option<String>> {
        let answer = self.ask(BATTERY_PROMPT).map_err(BenchError::Console)?;
        Ok(normalize_battery(&answer))
    }
}

/// Blank names disable logging
pub fn normalize_battery(name: &str) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_prompts_in_order() {
        let mut out = Vec::new();
        let mut prompter = Prompter::new(Cursor::new("1.5\nLiPo\n"), &mut out);

        let current = prompter.ask_current().unwrap();
        let battery = prompter.ask_battery().unwrap();

        assert_eq!(current.amps(), 1.5);
        assert_eq!(battery.as_deref(), Some("LiPo"));

        let shown = String::from_utf8(out).unwrap();
        assert!(shown.starts_with(CURRENT_PROMPT));
        assert!(shown.contains(BATTERY_PROMPT));
    }

    #[test]
    fn test_blank_answers() {
        let mut prompter = Prompter::new(Cursor::new("\r\n  \n"), Vec::new());

        assert_eq!(prompter.ask_current().unwrap().amps(), 0.0);
        assert_eq!(prompter.ask_battery().unwrap(), None);
    }

    #[test]
    fn test_closed_input_reads_blank() {
        let mut prompter = Prompter::new(Cursor::new(""), Vec::new());
        assert_eq!(prompter.ask_battery().unwrap(), None);
    }

    #[test]
    fn test_invalid_current() {
        let mut prompter = Prompter::new(Cursor::new("lots\n"), Vec::new());
        assert!(matches!(
            prompter.ask_current().unwrap_err(),
            BenchError::InvalidInput { .. }
        ));
    }
}
