use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Calendar month, formatted as `YYYY-MM`.
///
/// Ordering is chronological.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    year: i32,
    month: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum YearMonthParseError {
    Format(String),
    MonthOutOfRange(u32),
}

impl fmt::Display for YearMonthParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            YearMonthParseError::Format(raw) => write!(f, "expected YYYY-MM, got {raw:?}"),
            YearMonthParseError::MonthOutOfRange(m) => write!(f, "month out of range: {m}"),
        }
    }
}

impl std::error::Error for YearMonthParseError {}

impl YearMonth {
    pub fn new(year: i32, month: u8) -> Result<Self, YearMonthParseError> {
        if !(1..=12).contains(&month) {
            return Err(YearMonthParseError::MonthOutOfRange(month as u32));
        }
        Ok(Self { year, month })
    }

    /// Constructor for constants. Panics at compile time when `month` is outside 1..=12.
    pub const fn from_const(year: i32, month: u8) -> Self {
        assert!(month >= 1 && month <= 12, "month out of range");
        Self { year, month }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    /// The following calendar month.
    pub fn succ(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Number of months from `self` to `other` (negative if `other` is earlier).
    pub fn months_until(&self, other: YearMonth) -> i64 {
        let a = self.year as i64 * 12 + (self.month as i64 - 1);
        let b = other.year as i64 * 12 + (other.month as i64 - 1);
        b - a
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = YearMonthParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || YearMonthParseError::Format(s.to_string());
        let (year, month) = s.trim().split_once('-').ok_or_else(bad)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(bad());
        }
        let year: i32 = year.parse().map_err(|_| bad())?;
        let month: u32 = month.parse().map_err(|_| bad())?;
        if !(1..=12).contains(&month) {
            return Err(YearMonthParseError::MonthOutOfRange(month));
        }
        Ok(Self {
            year,
            month: month as u8,
        })
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for YearMonth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::{YearMonth, YearMonthParseError};

    fn ym(s: &str) -> YearMonth {
        s.parse().unwrap()
    }

    #[test]
    fn parses_and_formats_zero_padded() {
        let m = ym("2015-01");
        assert_eq!(m.year(), 2015);
        assert_eq!(m.month(), 1);
        assert_eq!(m.to_string(), "2015-01");
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(
            "2015-1".parse::<YearMonth>(),
            Err(YearMonthParseError::Format(_))
        ));
        assert!(matches!(
            "201501".parse::<YearMonth>(),
            Err(YearMonthParseError::Format(_))
        ));
        assert_eq!(
            "2015-13".parse::<YearMonth>(),
            Err(YearMonthParseError::MonthOutOfRange(13))
        );
    }

    #[test]
    fn succ_rolls_over_year() {
        assert_eq!(ym("2015-11").succ(), ym("2015-12"));
        assert_eq!(ym("2015-12").succ(), ym("2016-01"));
    }

    #[test]
    fn ordering_is_chronological() {
        assert!(ym("2015-12") < ym("2016-01"));
        assert_eq!(ym("2015-01").months_until(ym("2017-03")), 26);
        assert_eq!(ym("2017-03").months_until(ym("2015-01")), -26);
    }

    #[test]
    fn serde_uses_string_form() {
        let json = serde_json::to_string(&ym("2016-07")).unwrap();
        assert_eq!(json, "\"2016-07\"");
        let back: YearMonth = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ym("2016-07"));
    }
}
