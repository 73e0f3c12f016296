// src/model.rs
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IngestError;

/// Fixed format of the upstream `trending_date` column: two-digit year, day, month.
pub const TRENDING_DATE_FORMAT: &str = "%y.%d.%m";

/// Fallback layout for publish times already normalized by the cleaned export.
const PUBLISH_TIME_NAIVE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub title: String,
}

/// One video's measured state on one trending day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub video_id: String,
    pub trending_date: NaiveDate,
    pub title: Option<String>,
    pub channel_title: Option<String>,
    pub category_id: String,
    pub publish_time: Option<DateTime<Utc>>,
    pub views: Option<i64>,
    pub likes: Option<i64>,
    pub dislikes: Option<i64>,
    pub comment_count: Option<i64>,
}

impl Observation {
    /// Natural key: at most one row per video per trending day.
    pub fn key(&self) -> (&str, NaiveDate) {
        (self.video_id.as_str(), self.trending_date)
    }
}

pub fn parse_trending_date(raw: &str) -> Result<NaiveDate, IngestError> {
    NaiveDate::parse_from_str(raw.trim(), TRENDING_DATE_FORMAT).map_err(|e| {
        IngestError::malformed(
            "trending_date",
            format!("{raw:?} does not match {TRENDING_DATE_FORMAT}: {e}"),
        )
    })
}

/// Lenient publish-time parsing: unparseable values become `None`.
pub fn parse_publish_time(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, PUBLISH_TIME_NAIVE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Storage form of a trending day: ISO text sorts the same as the calendar.
pub fn date_to_store(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

pub fn date_from_store(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trending_date_is_year_day_month() {
        let d = parse_trending_date("17.14.11").unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2017, 11, 14).unwrap());
        // 01.02 is the 1st of February, not the 2nd of January
        let d = parse_trending_date("18.01.02").unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2018, 2, 1).unwrap());
    }

    #[test]
    fn trending_date_rejects_other_layouts() {
        assert!(parse_trending_date("2017-11-14").is_err());
        assert!(parse_trending_date("17.11.14").is_err()); // month 14
        assert!(parse_trending_date("").is_err());
    }

    #[test]
    fn publish_time_degrades_to_none() {
        let t = parse_publish_time("2017-11-13T17:13:01.000Z").unwrap();
        assert_eq!(t.to_rfc3339(), "2017-11-13T17:13:01+00:00");
        let t = parse_publish_time("2017-11-13 17:13:01").unwrap();
        assert_eq!(t.timestamp(), 1_510_593_181);
        assert!(parse_publish_time("yesterday-ish").is_none());
        assert!(parse_publish_time("   ").is_none());
    }

    #[test]
    fn store_dates_round_trip_and_sort() {
        let a = NaiveDate::from_ymd_opt(2017, 9, 30).unwrap();
        let b = NaiveDate::from_ymd_opt(2017, 11, 2).unwrap();
        assert!(date_to_store(a) < date_to_store(b));
        assert_eq!(date_from_store(&date_to_store(b)), Some(b));
    }
}
