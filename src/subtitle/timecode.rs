// SRT timecodes
use crate::error::{Result, SubmythError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const MS_PER_SECOND: u64 = 1_000;
const MS_PER_MINUTE: u64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: u64 = 60 * MS_PER_MINUTE;

/// Canonical timecode shape. Hours may be wider than two digits.
pub(crate) const TIMECODE_PATTERN: &str = r"\d{2,}:\d{2}:\d{2},\d{3}";

static CANONICAL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{2,}):(\d{2}):(\d{2}),(\d{3})$").expect("Invalid timecode regex")
});

/// A point on a media timeline with millisecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timecode(u64);

impl Timecode {
    pub const ZERO: Timecode = Timecode(0);

    pub fn from_millis(ms: u64) -> Self {
        Timecode(ms)
    }

    /// Build from components, rejecting minutes or seconds above 59 and millis above 999.
    pub fn from_hms_millis(hours: u64, minutes: u64, seconds: u64, millis: u64) -> Result<Self> {
        if minutes > 59 || seconds > 59 || millis > 999 {
            return Err(SubmythError::Format(format!(
                "{:02}:{:02}:{:02},{:03} has a component out of range",
                hours, minutes, seconds, millis
            )));
        }
        let total = hours
            .checked_mul(MS_PER_HOUR)
            .and_then(|h| h.checked_add(minutes * MS_PER_MINUTE + seconds * MS_PER_SECOND + millis))
            .ok_or_else(|| SubmythError::Format(format!("{} hours overflows", hours)))?;
        Ok(Timecode(total))
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.0)
    }

    pub fn hours(&self) -> u64 {
        self.0 / MS_PER_HOUR
    }

    pub fn minutes(&self) -> u64 {
        (self.0 % MS_PER_HOUR) / MS_PER_MINUTE
    }

    pub fn seconds(&self) -> u64 {
        (self.0 % MS_PER_MINUTE) / MS_PER_SECOND
    }

    pub fn millis(&self) -> u64 {
        self.0 % MS_PER_SECOND
    }
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02},{:03}",
            self.hours(),
            self.minutes(),
            self.seconds(),
            self.millis()
        )
    }
}

impl FromStr for Timecode {
    type Err = SubmythError;

    fn from_str(s: &str) -> Result<Self> {
        let caps = CANONICAL_REGEX
            .captures(s)
            .ok_or_else(|| SubmythError::Format(format!("'{}' is not HH:MM:SS,mmm", s)))?;
        let field = |i: usize| -> Result<u64> {
            caps[i]
                .parse()
                .map_err(|_| SubmythError::Format(format!("'{}' is out of range", s)))
        };
        Timecode::from_hms_millis(field(1)?, field(2)?, field(3)?, field(4)?)
    }
}

impl TryFrom<String> for Timecode {
    type Error = SubmythError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Timecode> for String {
    fn from(value: Timecode) -> Self {
        value.to_string()
    }
}
