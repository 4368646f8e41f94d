//! Simulation time values.
//!
//! Durations are written `<number> <unit>`, e.g. `"10 ns"` or `"2.5us"`.
//! The unit defaults to picoseconds when omitted.

use std::fmt;

use super::convert::{scalar_text, ConversionError, FromValue};
use super::Value;

/// Units from the largest to the smallest, with their value in femtoseconds.
const UNITS: [(&str, u64); 6] = [
    ("s", 1_000_000_000_000_000),
    ("ms", 1_000_000_000_000),
    ("us", 1_000_000_000),
    ("ns", 1_000_000),
    ("ps", 1_000),
    ("fs", 1),
];

const DEFAULT_UNIT: &str = "ps";

/// A simulation duration with femtosecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimTime(u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);

    pub fn from_fs(fs: u64) -> Self {
        SimTime(fs)
    }

    pub fn as_fs(&self) -> u64 {
        self.0
    }

    pub fn as_ps(&self) -> f64 {
        self.0 as f64 / 1_000.0
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return write!(f, "0 {}", DEFAULT_UNIT);
        }
        for (unit, factor) in UNITS {
            if self.0 % factor == 0 {
                return write!(f, "{} {}", self.0 / factor, unit);
            }
        }
        write!(f, "{} fs", self.0)
    }
}

/// Parse a duration string (e.g., "10 ns", "2.5us", "100") to a [`SimTime`]
///
/// # Arguments
/// * `text` - The duration string to parse
///
/// # Returns
/// * `Ok(SimTime)` - The parsed duration
/// * `Err(String)` - An error message if parsing fails
///
/// # Examples
/// ```
/// use vplatform::description::time::parse_sim_time;
///
/// assert_eq!(parse_sim_time("10 ns").unwrap().as_fs(), 10_000_000);
/// assert_eq!(parse_sim_time("3").unwrap().as_fs(), 3_000);
/// assert!(parse_sim_time("10 weeks").is_err());
/// ```
pub fn parse_sim_time(text: &str) -> Result<SimTime, String> {
    let text = text.trim();
    let number = extract_number_part(text);
    if number.is_empty() {
        return Err(format!("Invalid duration format: {}", text));
    }

    let unit = text[number.len()..].trim();
    let unit = if unit.is_empty() { DEFAULT_UNIT } else { unit };
    let factor = UNITS
        .iter()
        .find(|(name, _)| *name == unit)
        .map(|(_, factor)| *factor)
        .ok_or_else(|| format!("Invalid duration unit: {}", unit))?;

    if number.contains('.') {
        let value: f64 = number
            .parse()
            .map_err(|_| format!("Invalid duration format: {}", text))?;
        let fs = (value * factor as f64).round();
        if !fs.is_finite() || fs > u64::MAX as f64 {
            return Err(format!("Duration out of range: {}", text));
        }
        return Ok(SimTime(fs as u64));
    }

    number
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(factor))
        .map(SimTime)
        .ok_or_else(|| format!("Duration out of range: {}", text))
}

/// Extract the numeric part from a duration string by finding the first
/// character that is neither a digit nor a decimal point
fn extract_number_part(text: &str) -> &str {
    let end = text
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(text.len());
    &text[..end]
}

impl FromValue for SimTime {
    const TYPE_NAME: &'static str = "time";

    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        let raw = scalar_text(value, Self::TYPE_NAME)?;
        parse_sim_time(raw).map_err(|_| ConversionError::InvalidValue {
            target: Self::TYPE_NAME,
            raw: raw.to_string(),
            origin: value.origin(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sim_time_units() {
        assert_eq!(parse_sim_time("1 fs"), Ok(SimTime::from_fs(1)));
        assert_eq!(parse_sim_time("1 ps"), Ok(SimTime::from_fs(1_000)));
        assert_eq!(parse_sim_time("10 ns"), Ok(SimTime::from_fs(10_000_000)));
        assert_eq!(parse_sim_time("10ns"), Ok(SimTime::from_fs(10_000_000)));
        assert_eq!(parse_sim_time("1 us"), Ok(SimTime::from_fs(1_000_000_000)));
        assert_eq!(parse_sim_time("1 ms"), Ok(SimTime::from_fs(1_000_000_000_000)));
        assert_eq!(parse_sim_time("1 s"), Ok(SimTime::from_fs(1_000_000_000_000_000)));
    }

    #[test]
    fn test_parse_sim_time_default_unit_and_fractions() {
        assert_eq!(parse_sim_time("250"), Ok(SimTime::from_fs(250_000)));
        assert_eq!(parse_sim_time("2.5 ns"), Ok(SimTime::from_fs(2_500_000)));
        assert_eq!(parse_sim_time("0.5 fs"), Ok(SimTime::from_fs(1)));
    }

    #[test]
    fn test_parse_sim_time_invalid() {
        assert!(parse_sim_time("").is_err());
        assert!(parse_sim_time("ns").is_err());
        assert!(parse_sim_time("10 weeks").is_err());
        assert!(parse_sim_time("1.2.3 ns").is_err());
        assert!(parse_sim_time("99999999999 s").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(SimTime::from_fs(10_000_000).to_string(), "10 ns");
        assert_eq!(SimTime::from_fs(1_500).to_string(), "1500 fs");
        assert_eq!(SimTime::ZERO.to_string(), "0 ps");
    }

    #[test]
    fn test_from_value() {
        assert_eq!(
            Value::string("5 us").parse::<SimTime>(),
            Ok(SimTime::from_fs(5_000_000_000))
        );
        assert!(Value::string("soon").parse::<SimTime>().is_err());
    }
}
