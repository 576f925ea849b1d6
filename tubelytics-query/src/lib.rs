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

//! Tubelytics Query Engine
//!
//! Pure aggregations over request-log snapshots, and the [`AdminAnalytics`]
//! engine that feeds them from an event log.

pub mod breakdown;
pub mod csv;
pub mod engine;
pub mod latency;
pub mod overview;
pub mod status;

pub use breakdown::{route_breakdown, RouteUsage};
pub use csv::{quote_cell, to_csv, CsvColumn, ERRORS_COLUMNS, USAGE_COLUMNS};
pub use engine::{
    AdminAnalytics, AnalyticsSettings, DEFAULT_AGGREGATION_ROW_CAP, DEFAULT_TOP_USERS_LIMIT,
    DEFAULT_WINDOW_DAYS, MAX_WINDOW_DAYS,
};
pub use latency::{latency_report, percentile, rounded_mean, DayLatency, LatencyReport, LatencyStats};
pub use overview::{overview_summary, OverviewSummary};
pub use status::{day_buckets, DayStatusCounts, StatusClass, StatusCounts};
