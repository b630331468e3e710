use std::fmt;

use chrono::{Datelike, Local, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Serialize, Serializer};

/// A percentage in `[0.0, 100.0]` rounded half-up to one decimal place.
///
/// Stored as integer tenths so equality and display are exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Percentage {
    tenths: u16,
}

impl Percentage {
    pub const FULL: Percentage = Percentage { tenths: 1000 };

    /// `part / whole * 100`, rounded half-up to one decimal.
    #[must_use]
    pub fn of(part: u32, whole: u32) -> Self {
        if whole == 0 {
            return Self::default();
        }
        let part = u64::from(part.min(whole));
        let whole = u64::from(whole);
        let tenths = (2 * part * 1000 + whole) / (2 * whole);
        Self {
            tenths: tenths.min(1000) as u16,
        }
    }

    #[must_use]
    pub fn from_tenths(tenths: u16) -> Self {
        Self {
            tenths: tenths.min(1000),
        }
    }

    #[must_use]
    pub fn tenths(self) -> u16 {
        self.tenths
    }

    #[must_use]
    pub fn value(self) -> f64 {
        f64::from(self.tenths) / 10.0
    }

    /// Fill ratio in `0.0..=1.0`.
    #[must_use]
    pub fn ratio(self) -> f64 {
        f64::from(self.tenths) / 1000.0
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.tenths / 10, self.tenths % 10)
    }
}

impl Serialize for Percentage {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(self.value())
    }
}

/// How far a calendar year has progressed on a given date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct YearProgress {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub day_of_year: u32,
    pub days_in_year: u32,
    pub percentage: Percentage,
}

impl YearProgress {
    #[must_use]
    pub fn compute(date: NaiveDate) -> Self {
        let year = date.year();
        let days_in_year = days_in_year(year);
        let day_of_year = date.ordinal();

        Self {
            year,
            month: date.month(),
            day: date.day(),
            day_of_year,
            days_in_year,
            percentage: Percentage::of(day_of_year, days_in_year),
        }
    }

    #[must_use]
    pub fn date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
    }

    #[must_use]
    pub fn is_last_day(&self) -> bool {
        self.day_of_year == self.days_in_year
    }
}

#[must_use]
pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

#[must_use]
pub fn days_in_year(year: i32) -> u32 {
    if is_leap_year(year) { 366 } else { 365 }
}

/// Days in `month` (1-based). Out-of-range months have zero days.
#[must_use]
pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

pub trait Clock {
    fn today(&self) -> NaiveDate;
}

/// Reads the wall clock, in the configured zone when one is set.
#[derive(Debug, Clone, Default)]
pub struct SystemClock {
    timezone: Option<Tz>,
}

impl SystemClock {
    #[must_use]
    pub fn new(timezone: Option<Tz>) -> Self {
        Self { timezone }
    }
}

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        match self.timezone {
            Some(tz) => Utc::now().with_timezone(&tz).date_naive(),
            None => Local::now().date_naive(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, NaiveDate};

    use super::{Percentage, YearProgress, days_in_month, days_in_year, is_leap_year};

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn first_day_of_common_year() {
        let progress = YearProgress::compute(ymd(2023, 1, 1));
        assert_eq!(progress.day_of_year, 1);
        assert_eq!(progress.days_in_year, 365);
        assert_eq!(progress.percentage.to_string(), "0.3");
    }

    #[test]
    fn last_day_of_leap_year() {
        let progress = YearProgress::compute(ymd(2024, 12, 31));
        assert_eq!(progress.day_of_year, 366);
        assert_eq!(progress.days_in_year, 366);
        assert_eq!(progress.percentage.to_string(), "100.0");
        assert!(progress.is_last_day());
    }

    #[test]
    fn leap_rule_matches_century_exceptions() {
        assert!(is_leap_year(2000));
        assert!(is_leap_year(2024));
        assert!(!is_leap_year(1900));
        assert!(!is_leap_year(2100));
        assert!(!is_leap_year(2023));

        for year in 1583..=2800 {
            let expected = NaiveDate::from_ymd_opt(year, 2, 29).is_some();
            assert_eq!(is_leap_year(year), expected, "year {year}");
            assert_eq!(days_in_year(year) == 366, expected, "year {year}");
        }
    }

    #[test]
    fn month_lengths_sum_to_year_length() {
        for year in [1900, 2000, 2023, 2024] {
            let total: u32 = (1..=12).map(|m| days_in_month(year, m)).sum();
            assert_eq!(total, days_in_year(year));
        }
        assert_eq!(days_in_month(2024, 13), 0);
    }

    #[test]
    fn day_of_year_strictly_increases_and_only_last_day_is_full() {
        for year in [2023, 2024] {
            let mut date = ymd(year, 1, 1);
            let mut previous = 0;
            while date.year() == year {
                let progress = YearProgress::compute(date);
                assert!(progress.day_of_year > previous);
                assert!(progress.day_of_year >= 1);
                assert!(progress.day_of_year <= progress.days_in_year);
                assert_eq!(
                    progress.percentage == Percentage::FULL,
                    progress.is_last_day(),
                    "{date}"
                );
                previous = progress.day_of_year;
                let Some(next) = date.succ_opt() else { break };
                date = next;
            }
            assert_eq!(previous, days_in_year(year));
        }
    }

    #[test]
    fn rounds_half_up() {
        // 1/8 = 12.5% exactly, 1/16 = 6.25% -> 6.3
        assert_eq!(Percentage::of(1, 8).to_string(), "12.5");
        assert_eq!(Percentage::of(1, 16).to_string(), "6.3");
        assert_eq!(Percentage::of(0, 365).to_string(), "0.0");
        assert_eq!(Percentage::of(5, 0), Percentage::default());
    }

    #[test]
    fn serializes_as_number() {
        let json = serde_json::to_string(&Percentage::of(1, 365)).expect("serialize");
        assert_eq!(json, "0.3");
    }
}
