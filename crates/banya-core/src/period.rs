//! Time windows for aggregation.
//!
//! All windows are computed in UTC. A window is half-open: `start <= t < end`,
//! with `None` meaning unbounded on that side.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Window {
  pub start: Option<DateTime<Utc>>,
  pub end:   Option<DateTime<Utc>>,
}

impl Window {
  pub const UNBOUNDED: Self = Self { start: None, end: None };

  pub fn contains(&self, at: DateTime<Utc>) -> bool {
    self.start.is_none_or(|s| at >= s) && self.end.is_none_or(|e| at < e)
  }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
  Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

// ─── Period ──────────────────────────────────────────────────────────────────

/// Leaderboard period selector.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Period {
  Week,
  Month,
  #[default]
  Year,
  All,
}

impl Period {
  /// Parse a selector, rejecting anything but `week|month|year|all`.
  pub fn parse(raw: &str) -> Result<Self> {
    raw.parse().map_err(|_| Error::InvalidPeriod(raw.to_owned()))
  }

  /// The window from the start of the period containing `reference` up to
  /// and including `reference`. [`Period::All`] is unbounded on both sides.
  pub fn window(self, reference: DateTime<Utc>) -> Window {
    let today = reference.date_naive();
    let start = match self {
      Self::Week => {
        let back = i64::from(today.weekday().num_days_from_monday());
        today - Duration::days(back)
      }
      Self::Month => today.with_day(1).unwrap_or(today),
      Self::Year => NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today),
      Self::All => return Window::UNBOUNDED,
    };
    Window {
      start: Some(midnight(start)),
      // Timestamps are stored at microsecond precision.
      end:   Some(reference + Duration::microseconds(1)),
    }
  }
}

// ─── ISO week ────────────────────────────────────────────────────────────────

/// An explicit ISO-8601 week, e.g. `2024-W02`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsoWeek {
  pub year: i32,
  pub week: u32,
}

impl IsoWeek {
  pub fn new(year: i32, week: u32) -> Result<Self> {
    NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)
      .map(|_| Self { year, week })
      .ok_or(Error::InvalidWeek { year, week })
  }

  /// The ISO week containing `at`.
  pub fn containing(at: DateTime<Utc>) -> Self {
    let iso = at.date_naive().iso_week();
    Self { year: iso.year(), week: iso.week() }
  }

  /// Monday 00:00 up to (excluding) the next Monday 00:00.
  pub fn window(self) -> Result<Window> {
    let monday = NaiveDate::from_isoywd_opt(self.year, self.week, Weekday::Mon)
      .ok_or(Error::InvalidWeek { year: self.year, week: self.week })?;
    Ok(Window {
      start: Some(midnight(monday)),
      end:   Some(midnight(monday + Duration::days(7))),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
  }

  #[test]
  fn parses_known_periods_only() {
    assert_eq!(Period::parse("week").unwrap(), Period::Week);
    assert_eq!(Period::parse("all").unwrap(), Period::All);
    assert!(matches!(Period::parse("decade"), Err(Error::InvalidPeriod(_))));
    assert!(Period::parse("Week").is_err());
  }

  #[test]
  fn week_starts_on_monday() {
    // 2024-01-10 is a Wednesday.
    let w = Period::Week.window(at(2024, 1, 10, 15));
    assert_eq!(w.start, Some(at(2024, 1, 8, 0)));
    assert!(w.contains(at(2024, 1, 10, 15)));
    assert!(!w.contains(at(2024, 1, 10, 16)));
    assert!(!w.contains(at(2024, 1, 7, 23)));
  }

  #[test]
  fn month_and_year_start_on_first_day() {
    let reference = at(2024, 3, 15, 9);
    assert_eq!(Period::Month.window(reference).start, Some(at(2024, 3, 1, 0)));
    assert_eq!(Period::Year.window(reference).start, Some(at(2024, 1, 1, 0)));
  }

  #[test]
  fn all_is_unbounded() {
    let w = Period::All.window(at(2024, 3, 15, 9));
    assert!(w.contains(at(1990, 1, 1, 0)));
    assert!(w.contains(at(2090, 1, 1, 0)));
  }

  #[test]
  fn iso_week_window() {
    // ISO week 1 of 2025 starts on Monday 2024-12-30.
    let w = IsoWeek::new(2025, 1).unwrap().window().unwrap();
    assert_eq!(w.start, Some(at(2024, 12, 30, 0)));
    assert_eq!(w.end, Some(at(2025, 1, 6, 0)));
    assert_eq!(IsoWeek::containing(at(2024, 12, 31, 12)), IsoWeek { year: 2025, week: 1 });
  }

  #[test]
  fn invalid_iso_week_is_rejected() {
    assert!(IsoWeek::new(2024, 0).is_err());
    assert!(IsoWeek::new(2021, 53).is_err());
    assert!(IsoWeek::new(2020, 53).is_ok());
  }
}
