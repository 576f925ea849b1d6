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

use thiserror::Error;

/// Event log failures. None of these are retried.
#[derive(Debug, Error)]
pub enum EventLogError {
    /// The predicate itself was rejected (bad timestamp, unknown service)
    #[error(transparent)]
    Invalid(#[from] tubelytics_core::Error),

    /// The store could not be reached
    #[error("event log unavailable: {0}")]
    Unavailable(String),

    /// The store was reached but the read or write failed
    #[error("event log query failed: {0}")]
    Query(String),

    /// A row came back that does not fit `RequestLogEntry`
    #[error("malformed request log row: {0}")]
    Decode(String),
}

impl EventLogError {
    /// Stable identifier written to `error_code` and returned to clients
    pub fn code(&self) -> &'static str {
        match self {
            EventLogError::Invalid(_) => "INVALID_FILTER",
            EventLogError::Unavailable(_) => "STORE_UNAVAILABLE",
            EventLogError::Query(_) => "STORE_QUERY_FAILED",
            EventLogError::Decode(_) => "STORE_DECODE_FAILED",
        }
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for EventLogError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => EventLogError::Unavailable(err.to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                EventLogError::Decode(err.to_string())
            }
            other => EventLogError::Query(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, EventLogError>;
