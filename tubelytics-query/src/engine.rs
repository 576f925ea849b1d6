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

//! Admin analytics engine
//!
//! Composes the filter builder, one event log read and one aggregator per
//! admin endpoint.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use tubelytics_core::{
    format_timestamp, AggregationQuery, RawFilterParams, RequestLogEntry, RowOrder, Service,
    TopUser, ERRORS_CSV_LIMIT, ERRORS_LIMIT, USAGE_CSV_LIMIT,
};
use tubelytics_storage::{EventLogReader, Result};

use crate::breakdown::{route_breakdown, RouteUsage};
use crate::csv::{to_csv, ERRORS_COLUMNS, USAGE_COLUMNS};
use crate::latency::{latency_report, LatencyReport};
use crate::overview::{overview_summary, OverviewSummary};
use crate::status::{day_buckets, DayStatusCounts};

/// Rows a single aggregation read may return
pub const DEFAULT_AGGREGATION_ROW_CAP: usize = 50_000;

/// Callers listed by `top_users`
pub const DEFAULT_TOP_USERS_LIMIT: usize = 50;

/// Lookback applied to an unfiltered overview and to `top_users`
pub const DEFAULT_WINDOW_DAYS: i64 = 30;

/// Longest lookback accepted for `default_window_days`
pub const MAX_WINDOW_DAYS: i64 = 3_650;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsSettings {
    pub aggregation_row_cap: usize,
    pub top_users_limit: usize,
    pub default_window_days: i64,
}

impl Default for AnalyticsSettings {
    fn default() -> Self {
        Self {
            aggregation_row_cap: DEFAULT_AGGREGATION_ROW_CAP,
            top_users_limit: DEFAULT_TOP_USERS_LIMIT,
            default_window_days: DEFAULT_WINDOW_DAYS,
        }
    }
}

/// Read-only analytics over the request log
///
/// **Per call:**
/// - Builds one `AggregationQuery` from the caller's parameters
/// - Issues exactly one read against the injected [`EventLogReader`]
/// - Runs one pure aggregator over the returned snapshot
///
/// Holds no mutable state; cloning shares the reader.
#[derive(Clone)]
pub struct AdminAnalytics {
    reader: Arc<dyn EventLogReader>,
    settings: AnalyticsSettings,
}

impl AdminAnalytics {
    pub fn new(reader: Arc<dyn EventLogReader>, settings: AnalyticsSettings) -> Self {
        Self { reader, settings }
    }

    pub fn settings(&self) -> &AnalyticsSettings {
        &self.settings
    }

    pub fn backend_name(&self) -> &'static str {
        self.reader.backend_name()
    }

    async fn fetch(&self, endpoint: &'static str, query: AggregationQuery) -> Result<Vec<RequestLogEntry>> {
        let rows = self.reader.query(&query).await?;
        debug!(
            endpoint,
            rows = rows.len(),
            limit = query.limit,
            capped = rows.len() >= query.limit,
            "event log fetched"
        );
        Ok(rows)
    }

    fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let days = self.settings.default_window_days.clamp(0, MAX_WINDOW_DAYS);
        now - Duration::days(days)
    }

    /// Summary over every filter. With no filter at all, only the last
    /// `default_window_days` are read.
    pub async fn overview(&self, params: &RawFilterParams) -> Result<OverviewSummary> {
        self.overview_at(params, Utc::now()).await
    }

    async fn overview_at(&self, params: &RawFilterParams, now: DateTime<Utc>) -> Result<OverviewSummary> {
        let mut query = params.full_query(self.settings.aggregation_row_cap)?;
        if query.is_unfiltered() {
            query.start = Some(format_timestamp(&self.window_start(now)));
        }
        let rows = self.fetch("overview", query).await?;
        Ok(overview_summary(&rows))
    }

    /// Daily status buckets for one service. A `service` parameter in
    /// `params` is ignored.
    pub async fn usage_timeseries(
        &self,
        service: Service,
        params: &RawFilterParams,
    ) -> Result<Vec<DayStatusCounts>> {
        let query = params
            .range_query(self.settings.aggregation_row_cap)
            .with_service(service);
        let rows = self.fetch("usage_timeseries", query).await?;
        Ok(day_buckets(&rows))
    }

    /// Failed requests, newest first
    pub async fn recent_errors(&self, params: &RawFilterParams) -> Result<Vec<RequestLogEntry>> {
        let query = params
            .full_query(ERRORS_LIMIT.resolve(params.limit()))?
            .with_status_min(400)
            .with_order(RowOrder::NewestFirst);
        self.fetch("recent_errors", query).await
    }

    pub async fn top_users(&self) -> Result<Vec<TopUser>> {
        self.top_users_at(Utc::now()).await
    }

    async fn top_users_at(&self, now: DateTime<Utc>) -> Result<Vec<TopUser>> {
        let users = self
            .reader
            .top_users(self.window_start(now), self.settings.top_users_limit)
            .await?;
        debug!(users = users.len(), "top users ranked");
        Ok(users)
    }

    /// Latency percentiles for one service, `ai` when none is given
    pub async fn latency(&self, params: &RawFilterParams) -> Result<LatencyReport> {
        let service = params.service()?.unwrap_or(Service::Ai);
        let query = params
            .range_query(self.settings.aggregation_row_cap)
            .with_service(service)
            .latency_only();
        let rows = self.fetch("latency", query).await?;
        Ok(latency_report(&rows))
    }

    pub async fn usage_breakdown(&self, params: &RawFilterParams) -> Result<Vec<RouteUsage>> {
        let query = params.full_query(self.settings.aggregation_row_cap)?;
        let rows = self.fetch("usage_breakdown", query).await?;
        Ok(route_breakdown(&rows))
    }

    pub async fn errors_csv(&self, params: &RawFilterParams) -> Result<String> {
        let query = params
            .full_query(ERRORS_CSV_LIMIT.resolve(params.limit()))?
            .with_status_min(400)
            .with_order(RowOrder::NewestFirst);
        let rows = self.fetch("errors_csv", query).await?;
        Ok(to_csv(&rows, ERRORS_COLUMNS))
    }

    pub async fn usage_csv(&self, params: &RawFilterParams) -> Result<String> {
        let query = params
            .full_query(USAGE_CSV_LIMIT.resolve(params.limit()))?
            .with_order(RowOrder::NewestFirst);
        let rows = self.fetch("usage_csv", query).await?;
        Ok(to_csv(&rows, USAGE_COLUMNS))
    }
}
