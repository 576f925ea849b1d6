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

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tubelytics_core::{AggregationQuery, RequestLogEntry, TopUser};

use crate::error::Result;

/// Read side of the request log
#[async_trait]
pub trait EventLogReader: Send + Sync {
    /// Short backend identifier for health output ("memory", "postgres")
    fn backend_name(&self) -> &'static str;

    /// Issue one read with `query` as the predicate.
    ///
    /// Implementations must parse the time bounds before touching the store,
    /// honour `query.order` and never return more than `query.limit` rows.
    async fn query(&self, query: &AggregationQuery) -> Result<Vec<RequestLogEntry>>;

    /// Callers ranked by request count since `since`, most active first.
    /// Rows without a `user_email` are ignored.
    async fn top_users(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<TopUser>>;
}

/// Write side of the request log
#[async_trait]
pub trait EventLogWriter: Send + Sync {
    async fn append(&self, entry: RequestLogEntry) -> Result<()>;
}
