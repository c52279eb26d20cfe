//! Calendar-day keys and local day boundaries.

use chrono::{
  DateTime, Datelike, Duration, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
  Utc, Weekday,
};
use std::fmt;
use std::str::FromStr;

/// A calendar day in the user's local calendar, printed as `YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DayKey(NaiveDate);

impl DayKey {
  pub fn date(self) -> NaiveDate {
    self.0
  }

  /// The day `n` days before this one
  pub fn days_before(self, n: u32) -> Self {
    Self(self.0 - Duration::days(i64::from(n)))
  }

  /// `len` days ending at (and including) this one, oldest first.
  pub fn trailing(self, len: usize) -> Vec<DayKey> {
    (0..len as u32).rev().map(|i| self.days_before(i)).collect()
  }

  /// Sunday-first single-letter label
  pub fn weekday_letter(self) -> char {
    match self.0.weekday() {
      Weekday::Sun | Weekday::Sat => 'S',
      Weekday::Mon => 'M',
      Weekday::Tue | Weekday::Thu => 'T',
      Weekday::Wed => 'W',
      Weekday::Fri => 'F',
    }
  }

  /// UTC instants of local `00:00:00.000` and `23:59:59.999` for this day.
  pub fn bounds_in<Tz: TimeZone>(self, tz: &Tz) -> DayBounds {
    let start = self.0.and_time(NaiveTime::MIN);
    let end = self.0.and_hms_milli_opt(23, 59, 59, 999).unwrap_or(start);
    DayBounds {
      start: local_to_utc(tz, start),
      end: local_to_utc(tz, end),
    }
  }
}

/// Resolve a local wall-clock time, taking the earlier instant on DST folds
/// and reading skipped times as UTC.
fn local_to_utc<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> DateTime<Utc> {
  tz.from_local_datetime(&naive)
    .earliest()
    .map(|dt| dt.with_timezone(&Utc))
    .unwrap_or_else(|| naive.and_utc())
}

impl fmt::Display for DayKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0.format("%Y-%m-%d"))
  }
}

impl FromStr for DayKey {
  type Err = chrono::ParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map(Self)
  }
}

/// Inclusive UTC range covering one local day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayBounds {
  pub start: DateTime<Utc>,
  pub end: DateTime<Utc>,
}

/// Source of "today" and of the local timezone.
pub trait Clock: Send + Sync {
  fn today(&self) -> DayKey;

  fn bounds(&self, day: DayKey) -> DayBounds;
}

/// Device clock in the local timezone
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn today(&self) -> DayKey {
    DayKey(Local::now().date_naive())
  }

  fn bounds(&self, day: DayKey) -> DayBounds {
    day.bounds_in(&Local)
  }
}

/// Clock pinned to one day in a fixed UTC offset.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
  pub today: DayKey,
  pub offset: FixedOffset,
}

impl FixedClock {
  pub fn new(today: DayKey, offset: FixedOffset) -> Self {
    Self { today, offset }
  }
}

impl Clock for FixedClock {
  fn today(&self) -> DayKey {
    self.today
  }

  fn bounds(&self, day: DayKey) -> DayBounds {
    day.bounds_in(&self.offset)
  }
}
