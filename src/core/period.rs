use crate::error::{SettlementError, SettlementResult};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A weekly settlement period, identified by its start date.
///
/// # Examples
///
/// ```
/// use league_settlement::core::period::Period;
///
/// let week: Period = "2026-03-02".parse().unwrap();
/// assert_eq!(week.next().to_string(), "2026-03-09");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Period(NaiveDate);

impl Period {
    pub const LENGTH_DAYS: i64 = 7;

    pub fn new(start: NaiveDate) -> Self {
        Self(start)
    }

    pub fn start(&self) -> NaiveDate {
        self.0
    }

    /// Last calendar day inside the period.
    pub fn end(&self) -> NaiveDate {
        self.0 + Duration::days(Self::LENGTH_DAYS - 1)
    }

    /// The period a carry computed at the close of `self` lands in.
    pub fn next(&self) -> Period {
        Period(self.0 + Duration::days(Self::LENGTH_DAYS))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.0 && date <= self.end()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for Period {
    type Err = SettlementError;

    fn from_str(s: &str) -> SettlementResult<Self> {
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Period)
            .map_err(|e| SettlementError::validation(format!("invalid period start '{s}': {e}")))
    }
}

impl From<NaiveDate> for Period {
    fn from(date: NaiveDate) -> Self {
        Period(date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_next_crosses_month() {
        let p = Period::new(date(2026, 1, 26));
        assert_eq!(p.next().start(), date(2026, 2, 2));
    }

    #[test]
    fn test_contains() {
        let p = Period::new(date(2026, 3, 2));
        assert!(p.contains(date(2026, 3, 2)));
        assert!(p.contains(date(2026, 3, 8)));
        assert!(!p.contains(date(2026, 3, 9)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = "03/02/2026".parse::<Period>().unwrap_err();
        assert!(matches!(err, SettlementError::Validation(_)));
    }
}
