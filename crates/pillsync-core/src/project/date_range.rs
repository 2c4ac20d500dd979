//! Named date buckets for the activity view.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ParseEnumError;

/// Date-range filter, resolved against the caller's "now" on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DateRange {
    #[serde(rename = "today")]
    Today,
    #[serde(rename = "yesterday")]
    Yesterday,
    #[serde(rename = "last-7-days")]
    Last7Days,
    #[serde(rename = "last-30-days")]
    Last30Days,
    #[serde(rename = "this-month")]
    ThisMonth,
}

impl DateRange {
    pub const ALL: [DateRange; 5] = [
        DateRange::Today,
        DateRange::Yesterday,
        DateRange::Last7Days,
        DateRange::Last30Days,
        DateRange::ThisMonth,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DateRange::Today => "today",
            DateRange::Yesterday => "yesterday",
            DateRange::Last7Days => "last-7-days",
            DateRange::Last30Days => "last-30-days",
            DateRange::ThisMonth => "this-month",
        }
    }

    /// Inclusive start and optional exclusive end of the bucket.
    ///
    /// Calendar buckets start at local midnight in `now`'s time zone. The
    /// rolling buckets count back whole days from `now`.
    pub fn bounds<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> (DateTime<Utc>, Option<DateTime<Utc>>) {
        let tz = now.timezone();
        let today = now.date_naive();

        match self {
            DateRange::Today => (local_midnight(&tz, today), None),
            DateRange::Yesterday => {
                let yesterday = today.pred_opt().unwrap_or(today);
                (
                    local_midnight(&tz, yesterday),
                    Some(local_midnight(&tz, today)),
                )
            }
            DateRange::Last7Days => (now.with_timezone(&Utc) - Duration::days(7), None),
            DateRange::Last30Days => (now.with_timezone(&Utc) - Duration::days(30), None),
            DateRange::ThisMonth => {
                let first = NaiveDate::from_ymd_opt(today.year(), today.month(), 1).unwrap_or(today);
                (local_midnight(&tz, first), None)
            }
        }
    }

    pub fn contains<Tz: TimeZone>(&self, timestamp: DateTime<Utc>, now: &DateTime<Tz>) -> bool {
        let (start, end) = self.bounds(now);
        timestamp >= start && end.map_or(true, |end| timestamp < end)
    }
}

/// First instant of `date` in `tz`. A midnight skipped by a DST jump
/// resolves to the first valid instant after it.
fn local_midnight<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default();
    (0..=2)
        .find_map(|hour| {
            tz.from_local_datetime(&(midnight + Duration::hours(hour)))
                .earliest()
        })
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DateRange {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DateRange::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("date range", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn tz() -> FixedOffset {
        FixedOffset::east_opt(2 * 3600).unwrap()
    }

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        tz().with_ymd_and_hms(y, m, d, h, min, 0).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_today_starts_at_local_midnight() {
        let now = tz().with_ymd_and_hms(2024, 3, 10, 9, 30, 0).unwrap();

        assert!(DateRange::Today.contains(local(2024, 3, 10, 0, 0), &now));
        assert!(DateRange::Today.contains(local(2024, 3, 10, 9, 0), &now));
        assert!(!DateRange::Today.contains(local(2024, 3, 9, 23, 59), &now));
    }

    #[test]
    fn test_yesterday_is_half_open() {
        let now = tz().with_ymd_and_hms(2024, 3, 10, 9, 30, 0).unwrap();

        assert!(DateRange::Yesterday.contains(local(2024, 3, 9, 0, 0), &now));
        assert!(DateRange::Yesterday.contains(local(2024, 3, 9, 23, 59), &now));
        assert!(!DateRange::Yesterday.contains(local(2024, 3, 10, 0, 0), &now));
        assert!(!DateRange::Yesterday.contains(local(2024, 3, 8, 23, 59), &now));
    }

    #[test]
    fn test_rolling_windows() {
        let now = tz().with_ymd_and_hms(2024, 3, 10, 9, 30, 0).unwrap();

        assert!(DateRange::Last7Days.contains(local(2024, 3, 3, 10, 0), &now));
        assert!(!DateRange::Last7Days.contains(local(2024, 3, 3, 9, 0), &now));
        assert!(DateRange::Last30Days.contains(local(2024, 2, 10, 10, 0), &now));
    }

    #[test]
    fn test_this_month_crosses_year_start() {
        let now = tz().with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap();

        assert!(DateRange::ThisMonth.contains(local(2024, 1, 1, 0, 0), &now));
        assert!(!DateRange::ThisMonth.contains(local(2023, 12, 31, 23, 59), &now));
        assert!(DateRange::Yesterday.contains(local(2023, 12, 31, 12, 0), &now));
    }

    #[test]
    fn test_bucket_moves_with_now() {
        let stamp = local(2024, 3, 10, 20, 0);
        let evening = tz().with_ymd_and_hms(2024, 3, 10, 23, 0, 0).unwrap();
        let next_morning = tz().with_ymd_and_hms(2024, 3, 11, 1, 0, 0).unwrap();

        assert!(DateRange::Today.contains(stamp, &evening));
        assert!(!DateRange::Today.contains(stamp, &next_morning));
        assert!(DateRange::Yesterday.contains(stamp, &next_morning));
    }

    #[test]
    fn test_parse_names() {
        for range in DateRange::ALL {
            assert_eq!(range.as_str().parse::<DateRange>().unwrap(), range);
        }
        let parsed: DateRange = serde_json::from_str("\"last-7-days\"").unwrap();
        assert_eq!(parsed, DateRange::Last7Days);
        assert!("last-week".parse::<DateRange>().is_err());
    }
}
