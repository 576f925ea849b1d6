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

//! Postgres-backed event log
//!
//! Reads and writes the `request_logs` table through a `sqlx` pool. Every
//! filter is pushed down into SQL as a bound parameter, so a read moves at
//! most `limit` rows over the wire.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use std::time::Duration;
use tubelytics_core::{AggregationQuery, RequestLogEntry, RowOrder, Service, TopUser};

use crate::error::{EventLogError, Result};
use crate::log::{EventLogReader, EventLogWriter};

const SELECT_COLUMNS: &str = "SELECT created_at, service, route, method, \
     status::int4 AS status, latency_ms::float8 AS latency_ms, user_email, error_code \
     FROM request_logs WHERE TRUE";

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS request_logs (
    id          BIGSERIAL PRIMARY KEY,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
    user_email  TEXT,
    service     TEXT NOT NULL,
    route       TEXT NOT NULL,
    method      TEXT NOT NULL,
    status      INTEGER NOT NULL,
    latency_ms  DOUBLE PRECISION,
    error_code  TEXT
)"#;

const CREATE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS request_logs_created_at_idx ON request_logs (created_at DESC)";

const TOP_USERS: &str = r#"
SELECT user_email,
       COUNT(*)::int8                                     AS requests,
       (COUNT(*) FILTER (WHERE service = 'ai'))::int8      AS ai_calls,
       (COUNT(*) FILTER (WHERE service = 'youtube'))::int8 AS youtube_calls,
       (COUNT(*) FILTER (WHERE status >= 400))::int8       AS errors,
       MAX(created_at)                                    AS last_seen
FROM request_logs
WHERE created_at >= $1 AND user_email IS NOT NULL AND user_email <> ''
GROUP BY user_email
ORDER BY requests DESC, user_email ASC
LIMIT $2"#;

/// Connection settings for [`PgEventLog`]
#[derive(Debug, Clone)]
pub struct PgEventLogConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PgEventLogConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/tubelytics".to_string(),
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Event log stored in Postgres
#[derive(Debug, Clone)]
pub struct PgEventLog {
    pool: PgPool,
}

impl PgEventLog {
    /// Build a pool without opening a connection.
    ///
    /// Connections are established on first use, so an unreachable database
    /// surfaces as [`EventLogError::Unavailable`] on the read that hits it
    /// rather than at startup. Only a malformed URL fails here.
    pub fn connect_lazy(config: &PgEventLogConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_lazy(&config.database_url)?;
        Ok(Self { pool })
    }

    /// Create `request_logs` and its timestamp index if missing
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_INDEX).execute(&self.pool).await?;
        tracing::info!("request_logs schema ensured");
        Ok(())
    }
}

/// Assemble the filtered SELECT for one read
fn select_builder(
    query: &AggregationQuery,
    bounds: (Option<DateTime<Utc>>, Option<DateTime<Utc>>),
    needle: Option<String>,
) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(SELECT_COLUMNS);
    let (start, end) = bounds;

    if let Some(start) = start {
        builder.push(" AND created_at >= ").push_bind(start);
    }
    if let Some(end) = end {
        builder.push(" AND created_at <= ").push_bind(end);
    }
    if let Some(needle) = needle {
        builder
            .push(" AND route ILIKE ")
            .push_bind(format!("%{}%", escape_like(&needle)));
    }
    if let Some(service) = query.service {
        builder
            .push(" AND service = ")
            .push_bind(service.as_str().to_string());
    }
    if let Some(status_min) = query.status_min {
        builder.push(" AND status >= ").push_bind(status_min);
    }
    if query.latency_only {
        builder.push(" AND latency_ms IS NOT NULL");
    }
    if query.order == RowOrder::NewestFirst {
        builder.push(" ORDER BY created_at DESC");
    }

    let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
    builder.push(" LIMIT ").push_bind(limit);
    builder
}

/// Escape `%`, `_` and `\` so user input only ever matches literally
fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn decode_entry(row: &PgRow) -> Result<RequestLogEntry> {
    let service: String = row.try_get("service")?;
    let service = service
        .parse::<Service>()
        .map_err(|e| EventLogError::Decode(e.to_string()))?;

    Ok(RequestLogEntry {
        created_at: row.try_get("created_at")?,
        service,
        route: row.try_get("route")?,
        method: row.try_get("method")?,
        status: row.try_get("status")?,
        latency_ms: row.try_get("latency_ms")?,
        user_email: row.try_get("user_email")?,
        error_code: row.try_get("error_code")?,
    })
}

fn decode_top_user(row: &PgRow) -> Result<TopUser> {
    Ok(TopUser {
        user_email: row.try_get("user_email")?,
        requests: row.try_get("requests")?,
        ai_calls: row.try_get("ai_calls")?,
        youtube_calls: row.try_get("youtube_calls")?,
        errors: row.try_get("errors")?,
        last_seen: row.try_get("last_seen")?,
    })
}

#[async_trait]
impl EventLogReader for PgEventLog {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn query(&self, query: &AggregationQuery) -> Result<Vec<RequestLogEntry>> {
        let bounds = query.time_bounds()?;
        let mut builder = select_builder(query, bounds, query.route_needle());

        let rows = builder.build().fetch_all(&self.pool).await?;
        tracing::debug!(rows = rows.len(), limit = query.limit, "postgres event log read");

        rows.iter().map(decode_entry).collect()
    }

    async fn top_users(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<TopUser>> {
        let rows = sqlx::query(TOP_USERS)
            .bind(since)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(decode_top_user).collect()
    }
}

#[async_trait]
impl EventLogWriter for PgEventLog {
    async fn append(&self, entry: RequestLogEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO request_logs \
             (created_at, user_email, service, route, method, status, latency_ms, error_code) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(entry.created_at)
        .bind(entry.user_email)
        .bind(entry.service.as_str())
        .bind(entry.route)
        .bind(entry.method)
        .bind(entry.status)
        .bind(entry.latency_ms)
        .bind(entry.error_code)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tubelytics_core::parse_timestamp;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("/ai/title"), "/ai/title");
        assert_eq!(escape_like("100%_off\\"), "100\\%\\_off\\\\");
    }

    #[test]
    fn test_unfiltered_select() {
        let query = AggregationQuery::new(50_000);
        let builder = select_builder(&query, (None, None), None);
        assert_eq!(builder.sql(), format!("{SELECT_COLUMNS} LIMIT $1"));
    }

    #[test]
    fn test_every_predicate_is_bound() {
        let mut query = AggregationQuery::new(100)
            .with_service(Service::Ai)
            .with_status_min(400)
            .with_order(RowOrder::NewestFirst)
            .latency_only();
        query.route_contains = Some("Title".to_string());

        let bounds = (
            parse_timestamp("2024-01-01"),
            parse_timestamp("2024-01-31T23:59:59Z"),
        );
        let builder = select_builder(&query, bounds, query.route_needle());
        let sql = builder.sql();

        assert!(sql.contains("created_at >= $1"));
        assert!(sql.contains("created_at <= $2"));
        assert!(sql.contains("route ILIKE $3"));
        assert!(sql.contains("service = $4"));
        assert!(sql.contains("status >= $5"));
        assert!(sql.contains("latency_ms IS NOT NULL"));
        assert!(sql.ends_with("ORDER BY created_at DESC LIMIT $6"));
    }

    #[test]
    fn test_service_column_read_uncast() {
        // Read, filter and insert all treat service as plain text.
        assert!(SELECT_COLUMNS.contains("SELECT created_at, service, route"));
        assert!(!SELECT_COLUMNS.contains("service::"));
        assert!(SELECT_COLUMNS.contains("status::int4 AS status"));
    }

    #[tokio::test]
    async fn test_lazy_pool_rejects_bad_url() {
        let config = PgEventLogConfig {
            database_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(PgEventLog::connect_lazy(&config).is_err());
    }
}
