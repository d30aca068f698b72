//! Discharge current and its single-byte setpoint encoding
//!
//! The controller board takes one raw byte: the discharge current in tenths
//! of an ampere. Anything above 25.5A cannot be represented and is rejected
//! instead of wrapping.

use std::fmt;

use crate::error::{BenchError, BenchResult};

/// Setpoint resolution: one code step is 0.1A
pub const STEPS_PER_AMP: f64 = 10.0;

/// Largest code a single byte can carry
pub const MAX_CODE: u32 = u8::MAX as u32;

/// Highest current the board accepts
pub const MAX_CURRENT_AMPS: f64 = MAX_CODE as f64 / STEPS_PER_AMP;

/// Discharge current in amperes
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Current(f64);

impl Current {
    /// Wrap a raw amperes value, rejecting negative and non-finite values
    pub fn new(amps: f64) -> BenchResult<Self> {
        if !amps.is_finite() {
            return Err(BenchError::InvalidInput {
                input: amps.to_string(),
                reason: "current must be a finite number".to_string(),
            });
        }
        if amps < 0.0 {
            return Err(BenchError::InvalidInput {
                input: amps.to_string(),
                reason: "current cannot be negative".to_string(),
            });
        }

        // Collapse -0.0 so it never shows up in file names
        Ok(Self(amps + 0.0))
    }

    /// Parse operator text. Blank input means 0.0A.
    pub fn parse_input(input: &str) -> BenchResult<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(Self(0.0));
        }

        let amps: f64 = trimmed.parse().map_err(|_| BenchError::InvalidInput {
            input: trimmed.to_string(),
            reason: "expected a number of amperes, e.g. 1.5".to_string(),
        })?;

        Self::new(amps).map_err(|e| match e {
            BenchError::InvalidInput { reason, .. } => BenchError::InvalidInput {
                input: trimmed.to_string(),
                reason,
            },
            other => other,
        })
    }

    pub fn amps(&self) -> f64 {
        self.0
    }
}

/// Formats the way bench log names expect: `1.5`, `0.0`, `2.0`
impl fmt::Display for Current {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.fract() == 0.0 {
            write!(f, "{:.1}", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// The one byte sent to the board to start a discharge profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandByte(u8);

impl CommandByte {
    /// Encode `round(current * 10)`, failing when it does not fit a byte
    pub fn encode(current: Current) -> BenchResult<Self> {
        let scaled = (current.amps() * STEPS_PER_AMP).round();
        if scaled > MAX_CODE as f64 {
            return Err(BenchError::CurrentOutOfRange {
                current: current.amps(),
                code: scaled.min(u32::MAX as f64) as u32,
            });
        }

        Ok(Self(scaled as u8))
    }

    pub fn code(&self) -> u8 {
        self.0
    }

    /// Wire form: exactly one raw byte
    pub fn as_bytes(&self) -> [u8; 1] {
        [self.0]
    }
}

impl TryFrom<Current> for CommandByte {
    type Error = BenchError;

    fn try_from(current: Current) -> BenchResult<Self> {
        Self::encode(current)
    }
}

impl fmt::Display for CommandByte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x} ({})", self.0, self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_for(input: &str) -> BenchResult<u8> {
        CommandByte::encode(Current::parse_input(input)?).map(|b| b.code())
    }

    #[test]
    fn test_blank_input_defaults_to_zero() {
        let current = Current::parse_input("").unwrap();
        assert_eq!(current.amps(), 0.0);
        assert_eq!(current.to_string(), "0.0");
        assert_eq!(code_for("   \n").unwrap(), 0);
    }

    #[test]
    fn test_single_byte_boundary() {
        assert_eq!(code_for("25.5").unwrap(), 255);

        let err = code_for("25.6").unwrap_err();
        assert!(matches!(err, BenchError::CurrentOutOfRange { code: 256, .. }));
    }

    #[test]
    fn test_rounding_not_truncation() {
        // 0.7 * 10 is 7.000000000000001 in binary floating point
        assert_eq!(code_for("0.7").unwrap(), 7);
        assert_eq!(code_for("2.3").unwrap(), 23);
        assert_eq!(code_for("1.5").unwrap(), 15);
        assert_eq!(code_for("0.04").unwrap(), 0);
        assert_eq!(code_for("0.06").unwrap(), 1);
    }

    #[test]
    fn test_rejects_bad_input() {
        for text in ["abc", "1,5", "-0.1", "inf", "NaN"] {
            let err = Current::parse_input(text).unwrap_err();
            assert!(
                matches!(err, BenchError::InvalidInput { ref input, .. } if input == text),
                "{text} should be rejected"
            );
        }
    }

    #[test]
    fn test_display_matches_log_names() {
        assert_eq!(Current::parse_input("1.5").unwrap().to_string(), "1.5");
        assert_eq!(Current::parse_input("2").unwrap().to_string(), "2.0");
        assert_eq!(Current::parse_input("0.1").unwrap().to_string(), "0.1");
        assert_eq!(Current::parse_input("-0").unwrap().to_string(), "0.0");
    }

    #[test]
    fn test_wire_form_is_one_byte() {
        let byte = CommandByte::try_from(Current::new(12.8).unwrap()).unwrap();
        assert_eq!(byte.as_bytes(), [128]);
        assert_eq!(MAX_CURRENT_AMPS, 25.5);
    }
}
