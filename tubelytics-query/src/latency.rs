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

//! Latency percentiles
//!
//! Nearest-rank with a floored index: `sorted[floor(p / 100 * (n - 1))]`.
//! No interpolation, so every reported value is one that was observed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tubelytics_core::{day_key, RequestLogEntry};

/// Value at percentile `p` (0..=100) of an ascending slice, `0.0` when empty
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p / 100.0 * (sorted.len() - 1) as f64).floor();
    let idx = (rank.max(0.0) as usize).min(sorted.len() - 1);
    sorted[idx]
}

/// Arithmetic mean rounded to the nearest integer, `0` when empty
pub fn rounded_mean(values: &[f64]) -> i64 {
    if values.is_empty() {
        return 0;
    }
    (values.iter().sum::<f64>() / values.len() as f64).round() as i64
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub avg: i64,
}

impl LatencyStats {
    pub fn from_sorted(sorted: &[f64]) -> Self {
        Self {
            p50: percentile(sorted, 50.0),
            p90: percentile(sorted, 90.0),
            p95: percentile(sorted, 95.0),
            p99: percentile(sorted, 99.0),
            avg: rounded_mean(sorted),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayLatency {
    pub day: String,
    #[serde(flatten)]
    pub stats: LatencyStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyReport {
    pub overall: LatencyStats,
    #[serde(rename = "byDay")]
    pub by_day: Vec<DayLatency>,
}

/// Overall and per-UTC-day latency stats. Rows without a finite latency are
/// skipped.
pub fn latency_report(rows: &[RequestLogEntry]) -> LatencyReport {
    let mut all = Vec::with_capacity(rows.len());
    let mut days: BTreeMap<String, Vec<f64>> = BTreeMap::new();

    for row in rows {
        let Some(latency) = row.finite_latency() else {
            continue;
        };
        all.push(latency);
        days.entry(day_key(&row.created_at)).or_default().push(latency);
    }

    all.sort_by(f64::total_cmp);
    let by_day = days
        .into_iter()
        .map(|(day, mut samples)| {
            samples.sort_by(f64::total_cmp);
            DayLatency {
                day,
                stats: LatencyStats::from_sorted(&samples),
            }
        })
        .collect();

    LatencyReport {
        overall: LatencyStats::from_sorted(&all),
        by_day,
    }
}
