//! Calendar day a dataset refers to.

use chrono::{Datelike, Days, NaiveDate};
use std::fmt;
use std::str::FromStr;

/// A calendar day, displayed in compact `YYYY-DDD` form (year, day of year).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataDate(NaiveDate);

impl DataDate {
    /// Date from year and 1-based day of year.
    pub fn from_year_day(year: i32, day_of_year: u32) -> Option<Self> {
        NaiveDate::from_yo_opt(year, day_of_year).map(Self)
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    /// 1-based day of year.
    pub fn day_of_year(&self) -> u32 {
        self.0.ordinal()
    }

    /// The date `days` days later.
    pub fn next(&self, days: u32) -> Self {
        Self(self.0 + Days::new(u64::from(days)))
    }
}

impl fmt::Display for DataDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:03}", self.year(), self.day_of_year())
    }
}

impl FromStr for DataDate {
    type Err = String;

    /// Accepts `YYYY-DDD` and ISO `YYYY-MM-DD`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parts: Vec<&str> = s.split('-').collect();
        let parsed = match parts.as_slice() {
            [year, day] => {
                let year: i32 = year.parse().map_err(|_| format!("Invalid year in date: {}", s))?;
                let day: u32 = day
                    .parse()
                    .map_err(|_| format!("Invalid day of year in date: {}", s))?;
                Self::from_year_day(year, day)
            }
            [_, _, _] => NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().map(Self),
            _ => None,
        };
        parsed.ok_or_else(|| format!("Invalid date (expected YYYY-DDD or YYYY-MM-DD): {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_display() {
        let date = DataDate::from_year_day(2010, 360).unwrap();
        assert_eq!(date.to_string(), "2010-360");
        assert_eq!(DataDate::from_year_day(2011, 5).unwrap().to_string(), "2011-005");
    }

    #[test]
    fn test_next_crosses_year_boundary() {
        let date = DataDate::from_year_day(2010, 360).unwrap();
        let later = date.next(7);
        assert_eq!(later.year(), 2011);
        assert_eq!(later.day_of_year(), 2);
        assert_eq!(date.next(0), date);
    }

    #[test]
    fn test_parse_both_forms() {
        let compact: DataDate = "2010-360".parse().unwrap();
        let iso: DataDate = "2010-12-26".parse().unwrap();
        assert_eq!(compact, iso);
        assert!("2010-367".parse::<DataDate>().is_err());
        assert!("yesterday".parse::<DataDate>().is_err());
    }

    #[test]
    fn test_leap_day_of_year() {
        assert!(DataDate::from_year_day(2012, 366).is_some());
        assert!(DataDate::from_year_day(2011, 366).is_none());
    }
}
