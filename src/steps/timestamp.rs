use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Reasons a timestamp string cannot be turned into an offset
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimestampError {
    #[error("empty timestamp")]
    Empty,

    #[error("too many ':' segments in '{0}'")]
    TooManySegments(String),

    #[error("non-numeric segment '{0}'")]
    NotNumeric(String),

    #[error("seconds component {0} is out of range (must be < 60)")]
    SecondsOutOfRange(u64),

    #[error("timestamp '{0}' overflows")]
    Overflow(String),
}

/// Whole-second offset from the start of a video
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    seconds: u64,
}

impl Timestamp {
    pub fn from_seconds(seconds: u64) -> Self {
        Self { seconds }
    }

    /// Parse `SS` or `MM:SS`, tolerating bracket decoration like `[01:22]`
    pub fn parse(raw: &str) -> Result<Self, TimestampError> {
        let cleaned = normalize(raw);
        if cleaned.is_empty() {
            return Err(TimestampError::Empty);
        }

        let parts: Vec<&str> = cleaned.split(':').map(str::trim).collect();
        match parts.as_slice() {
            [seconds] => Ok(Self {
                seconds: parse_segment(seconds)?,
            }),
            [minutes, seconds] => {
                let minutes = parse_segment(minutes)?;
                let seconds = parse_segment(seconds)?;
                if seconds >= 60 {
                    return Err(TimestampError::SecondsOutOfRange(seconds));
                }
                let total = minutes
                    .checked_mul(60)
                    .and_then(|m| m.checked_add(seconds))
                    .ok_or_else(|| TimestampError::Overflow(cleaned.to_string()))?;
                Ok(Self { seconds: total })
            }
            _ => Err(TimestampError::TooManySegments(cleaned.to_string())),
        }
    }

    pub fn as_secs(&self) -> u64 {
        self.seconds
    }
}

impl FromStr for Timestamp {
    type Err = TimestampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.seconds / 60, self.seconds % 60)
    }
}

/// Strip surrounding whitespace and square brackets, matched or not
pub fn normalize(raw: &str) -> &str {
    raw.trim_matches(|c: char| c.is_whitespace() || c == '[' || c == ']')
}

fn parse_segment(segment: &str) -> Result<u64, TimestampError> {
    if segment.is_empty() || !segment.chars().all(|c| c.is_ascii_digit()) {
        return Err(TimestampError::NotNumeric(segment.to_string()));
    }
    segment
        .parse::<u64>()
        .map_err(|_| TimestampError::Overflow(segment.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_seconds() {
        assert_eq!(Timestamp::parse("12").unwrap().as_secs(), 12);
        assert_eq!(Timestamp::parse("0").unwrap().as_secs(), 0);
    }

    #[test]
    fn test_minutes_seconds() {
        assert_eq!(Timestamp::parse("01:05").unwrap().as_secs(), 65);
        assert_eq!(Timestamp::parse("10:00").unwrap().as_secs(), 600);
    }

    #[test]
    fn test_brackets_are_stripped() {
        let plain = Timestamp::parse("01:05").unwrap();
        assert_eq!(Timestamp::parse("[01:05]").unwrap(), plain);
        assert_eq!(Timestamp::parse("  [01:05 ").unwrap(), plain);
        assert_eq!(Timestamp::parse("01:05]]").unwrap(), plain);
        assert_eq!(Timestamp::parse("[ 01 : 05 ]").unwrap(), plain);
    }

    #[test]
    fn test_malformed() {
        assert_eq!(Timestamp::parse(""), Err(TimestampError::Empty));
        assert_eq!(Timestamp::parse("[]"), Err(TimestampError::Empty));
        assert!(matches!(
            Timestamp::parse("01:02:03"),
            Err(TimestampError::TooManySegments(_))
        ));
        assert!(matches!(Timestamp::parse("-5"), Err(TimestampError::NotNumeric(_))));
        assert!(matches!(Timestamp::parse("1m30"), Err(TimestampError::NotNumeric(_))));
        assert!(matches!(Timestamp::parse("01:"), Err(TimestampError::NotNumeric(_))));
        assert!(matches!(
            Timestamp::parse("99999999999999999999999"),
            Err(TimestampError::Overflow(_))
        ));
    }

    #[test]
    fn test_seconds_above_59_rejected() {
        assert_eq!(
            Timestamp::parse("01:75"),
            Err(TimestampError::SecondsOutOfRange(75))
        );
        // bare seconds have no upper bound
        assert_eq!(Timestamp::parse("75").unwrap().as_secs(), 75);
    }

    #[test]
    fn test_display() {
        assert_eq!(Timestamp::from_seconds(65).to_string(), "01:05");
        assert_eq!(Timestamp::from_seconds(5).to_string(), "00:05");
    }
}
