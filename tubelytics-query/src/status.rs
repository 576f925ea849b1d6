// Copyright 2025 The Tubelytics Authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Status-class bucketing
//!
//! Every status in `[200, 599]` falls into exactly one bucket. Anything else
//! (informational, redirects, a 0 written by a dropped connection) is counted
//! nowhere.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tubelytics_core::{day_key, RequestLogEntry};

/// Bucket a status code belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusClass {
    Ok2xx,
    Err4xx,
    Err5xx,
    Err429,
}

impl StatusClass {
    /// `None` for statuses outside every bucket
    pub fn classify(status: i32) -> Option<Self> {
        match status {
            200..=299 => Some(StatusClass::Ok2xx),
            429 => Some(StatusClass::Err429),
            400..=499 => Some(StatusClass::Err4xx),
            500..=599 => Some(StatusClass::Err5xx),
            _ => None,
        }
    }
}

/// Per-bucket counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub ok_2xx: u64,
    pub err_4xx: u64,
    pub err_5xx: u64,
    pub err_429: u64,
}

impl StatusCounts {
    pub fn record(&mut self, status: i32) {
        match StatusClass::classify(status) {
            Some(StatusClass::Ok2xx) => self.ok_2xx += 1,
            Some(StatusClass::Err4xx) => self.err_4xx += 1,
            Some(StatusClass::Err5xx) => self.err_5xx += 1,
            Some(StatusClass::Err429) => self.err_429 += 1,
            None => {}
        }
    }

    pub fn bucketed(&self) -> u64 {
        self.ok_2xx + self.err_4xx + self.err_5xx + self.err_429
    }
}

/// One UTC day of status counts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayStatusCounts {
    pub day: String,
    #[serde(flatten)]
    pub counts: StatusCounts,
}

/// Bucket rows by UTC day, ascending
pub fn day_buckets(rows: &[RequestLogEntry]) -> Vec<DayStatusCounts> {
    let mut days: BTreeMap<String, StatusCounts> = BTreeMap::new();
    for row in rows {
        days.entry(day_key(&row.created_at))
            .or_default()
            .record(row.status);
    }

    days.into_iter()
        .map(|(day, counts)| DayStatusCounts { day, counts })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tubelytics_core::{parse_timestamp, Service};

    fn row(ts: &str, status: i32) -> RequestLogEntry {
        RequestLogEntry::new(parse_timestamp(ts).unwrap(), Service::Ai, "/ai/title", "POST", status)
    }

    #[test]
    fn test_classify_edges() {
        assert_eq!(StatusClass::classify(200), Some(StatusClass::Ok2xx));
        assert_eq!(StatusClass::classify(299), Some(StatusClass::Ok2xx));
        assert_eq!(StatusClass::classify(400), Some(StatusClass::Err4xx));
        assert_eq!(StatusClass::classify(429), Some(StatusClass::Err429));
        assert_eq!(StatusClass::classify(499), Some(StatusClass::Err4xx));
        assert_eq!(StatusClass::classify(599), Some(StatusClass::Err5xx));
        assert_eq!(StatusClass::classify(0), None);
        assert_eq!(StatusClass::classify(302), None);
        assert_eq!(StatusClass::classify(600), None);
    }

    #[test]
    fn test_day_buckets_sorted_by_day() {
        let rows = vec![
            row("2024-01-02T03:00:00Z", 500),
            row("2024-01-01T10:00:00Z", 200),
            row("2024-01-01T11:00:00Z", 429),
            row("2024-01-01T12:00:00Z", 301),
        ];
        let buckets = day_buckets(&rows);

        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].day, "2024-01-01");
        assert_eq!(
            buckets[0].counts,
            StatusCounts { ok_2xx: 1, err_4xx: 0, err_5xx: 0, err_429: 1 }
        );
        assert_eq!(buckets[1].day, "2024-01-02");
        assert_eq!(buckets[1].counts.err_5xx, 1);
    }

    #[test]
    fn test_day_is_utc() {
        let rows = vec![row("2024-01-01T23:30:00-05:00", 200)];
        assert_eq!(day_buckets(&rows)[0].day, "2024-01-02");
    }

    #[test]
    fn test_json_shape_is_flat() {
        let buckets = day_buckets(&[row("2024-03-05T00:00:00Z", 404)]);
        let json = serde_json::to_value(&buckets).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{"day": "2024-03-05", "ok_2xx": 0, "err_4xx": 1, "err_5xx": 0, "err_429": 0}])
        );
    }

    #[test]
    fn test_empty_input() {
        assert!(day_buckets(&[]).is_empty());
    }

    proptest! {
        #[test]
        fn prop_bucketed_statuses_land_exactly_once(status in -10i32..1000) {
            let mut counts = StatusCounts::default();
            counts.record(status);
            let expected = u64::from(matches!(status, 200..=299 | 400..=599));
            prop_assert_eq!(counts.bucketed(), expected);
        }

        #[test]
        fn prop_day_totals_match_row_counts(statuses in proptest::collection::vec(100i32..700, 0..64)) {
            let rows: Vec<_> = statuses.iter().map(|s| row("2024-06-01T08:00:00Z", *s)).collect();
            let in_range = statuses
                .iter()
                .filter(|s| matches!(**s, 200..=299 | 400..=599))
                .count() as u64;
            let total: u64 = day_buckets(&rows).iter().map(|d| d.counts.bucketed()).sum();
            prop_assert_eq!(total, in_range);
        }
    }
}
