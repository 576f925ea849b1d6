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

//! In-process event log
//!
//! Keeps entries in insertion order behind a `parking_lot::RwLock`. The lock
//! is held only while scanning or pushing; matching rows are cloned out so the
//! caller gets an owned snapshot.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use tubelytics_core::{AggregationQuery, RequestLogEntry, RowOrder, Service, TopUser};

use crate::error::Result;
use crate::log::{EventLogReader, EventLogWriter};

/// Request log held in memory
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    entries: RwLock<Vec<RequestLogEntry>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the log, e.g. from a fixture
    pub fn with_entries(entries: Vec<RequestLogEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    pub fn push(&self, entry: RequestLogEntry) {
        self.entries.write().push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Copy of every entry in insertion order
    pub fn snapshot(&self) -> Vec<RequestLogEntry> {
        self.entries.read().clone()
    }
}

#[async_trait]
impl EventLogReader for MemoryEventLog {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn query(&self, query: &AggregationQuery) -> Result<Vec<RequestLogEntry>> {
        let bounds = query.time_bounds()?;
        let needle = query.route_needle();

        let mut rows: Vec<RequestLogEntry> = {
            let entries = self.entries.read();
            let matching = entries
                .iter()
                .filter(|entry| query.matches(entry, &bounds, needle.as_deref()));
            match query.order {
                // Cap after sorting so the newest rows survive
                RowOrder::NewestFirst => matching.cloned().collect(),
                RowOrder::Unordered => matching.take(query.limit).cloned().collect(),
            }
        };

        if query.order == RowOrder::NewestFirst {
            rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            rows.truncate(query.limit);
        }

        tracing::debug!(rows = rows.len(), limit = query.limit, "memory event log read");
        Ok(rows)
    }

    async fn top_users(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<TopUser>> {
        let mut by_email: HashMap<String, TopUser> = HashMap::new();

        for entry in self.entries.read().iter() {
            if entry.created_at < since {
                continue;
            }
            let Some(email) = entry.user_email.as_deref().filter(|e| !e.is_empty()) else {
                continue;
            };

            let user = by_email
                .entry(email.to_string())
                .or_insert_with(|| TopUser {
                    user_email: email.to_string(),
                    requests: 0,
                    ai_calls: 0,
                    youtube_calls: 0,
                    errors: 0,
                    last_seen: entry.created_at,
                });

            user.requests += 1;
            match entry.service {
                Service::Ai => user.ai_calls += 1,
                Service::Youtube => user.youtube_calls += 1,
                Service::Web => {}
            }
            if entry.status >= 400 {
                user.errors += 1;
            }
            if entry.created_at > user.last_seen {
                user.last_seen = entry.created_at;
            }
        }

        let mut ranking: Vec<TopUser> = by_email.into_values().collect();
        ranking.sort_by(|a, b| {
            b.requests
                .cmp(&a.requests)
                .then_with(|| a.user_email.cmp(&b.user_email))
        });
        ranking.truncate(limit);
        Ok(ranking)
    }
}

#[async_trait]
impl EventLogWriter for MemoryEventLog {
    async fn append(&self, entry: RequestLogEntry) -> Result<()> {
        self.push(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EventLogError;
    use tubelytics_core::parse_timestamp;

    fn entry(ts: &str, service: Service, route: &str, status: i32) -> RequestLogEntry {
        RequestLogEntry::new(parse_timestamp(ts).unwrap(), service, route, "GET", status)
    }

    fn seeded() -> MemoryEventLog {
        MemoryEventLog::with_entries(vec![
            entry("2024-01-02T09:00:00Z", Service::Ai, "/ai/title", 200)
                .with_user_email("a@example.com"),
            entry("2024-01-01T09:00:00Z", Service::Ai, "/ai/tags", 500)
                .with_user_email("b@example.com"),
            entry("2024-01-03T09:00:00Z", Service::Youtube, "/youtube/videos", 404)
                .with_user_email("a@example.com"),
            entry("2024-01-02T12:00:00Z", Service::Web, "/dashboard", 200),
        ])
    }

    #[tokio::test]
    async fn test_newest_first_caps_after_sorting() {
        let log = seeded();
        let query = AggregationQuery::new(2).with_order(RowOrder::NewestFirst);
        let rows = log.query(&query).await.unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].route, "/youtube/videos");
        assert_eq!(rows[1].route, "/dashboard");
    }

    #[tokio::test]
    async fn test_unordered_keeps_store_order() {
        let log = seeded();
        let rows = log.query(&AggregationQuery::new(3)).await.unwrap();
        let routes: Vec<_> = rows.iter().map(|r| r.route.as_str()).collect();
        assert_eq!(routes, vec!["/ai/title", "/ai/tags", "/youtube/videos"]);
    }

    #[tokio::test]
    async fn test_filters_apply_before_cap() {
        let log = seeded();
        let mut query = AggregationQuery::new(10).with_status_min(400);
        query.route_contains = Some("AI".to_string());
        let rows = log.query(&query).await.unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].route, "/ai/tags");
    }

    #[tokio::test]
    async fn test_bad_bound_fails_the_read() {
        let log = seeded();
        let mut query = AggregationQuery::new(10);
        query.start = Some("last tuesday".to_string());

        let err = log.query(&query).await.unwrap_err();
        assert!(matches!(err, EventLogError::Invalid(_)));
        assert_eq!(err.code(), "INVALID_FILTER");
    }

    #[tokio::test]
    async fn test_top_users_ranking() {
        let log = seeded();
        let since = parse_timestamp("2024-01-01T00:00:00Z").unwrap();
        let ranking = log.top_users(since, 10).await.unwrap();

        assert_eq!(ranking.len(), 2);
        assert_eq!(ranking[0].user_email, "a@example.com");
        assert_eq!(ranking[0].requests, 2);
        assert_eq!(ranking[0].ai_calls, 1);
        assert_eq!(ranking[0].youtube_calls, 1);
        assert_eq!(ranking[0].errors, 1);
        assert_eq!(
            ranking[0].last_seen,
            parse_timestamp("2024-01-03T09:00:00Z").unwrap()
        );
        assert_eq!(ranking[1].user_email, "b@example.com");

        let later = parse_timestamp("2024-01-02T00:00:00Z").unwrap();
        let ranking = log.top_users(later, 10).await.unwrap();
        assert_eq!(ranking.len(), 1);
        assert_eq!(ranking[0].requests, 2);
    }

    #[tokio::test]
    async fn test_append_is_visible_to_readers() {
        let log = MemoryEventLog::new();
        assert!(log.is_empty());
        log.append(entry("2024-01-01", Service::Web, "/", 200))
            .await
            .unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log.query(&AggregationQuery::new(5)).await.unwrap().len(), 1);
    }
}
