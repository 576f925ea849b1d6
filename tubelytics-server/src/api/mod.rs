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

pub mod admin;
pub mod health;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tubelytics_core::RawFilterParams;
use tubelytics_query::AdminAnalytics;
use url::form_urlencoded;
use tubelytics_storage::{EventLogError, EventLogWriter};

pub use admin::{
    admin_router, ai_usage, errors, errors_csv, latency, overview, top_users, usage_breakdown,
    usage_csv, youtube_usage,
};
pub use health::{health_check, health_check_detailed};

/// Machine-readable failure code, attached to error responses so the request
/// recorder can persist it as `error_code`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode(pub &'static str);

/// Admin filter parameters read from the query string.
///
/// Never rejects: repeated keys keep their first value and undecodable input
/// degrades to absent parameters, leaving validation to the engine.
#[derive(Debug, Clone, Default)]
pub struct FilterQuery(pub RawFilterParams);

#[async_trait]
impl<S> FromRequestParts<S> for FilterQuery
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let query = parts.uri.query().unwrap_or_default();
        Ok(Self(RawFilterParams::from_pairs(form_urlencoded::parse(
            query.as_bytes(),
        ))))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] EventLogError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Store(EventLogError::Invalid(_)) => StatusCode::BAD_REQUEST,
            ApiError::Store(EventLogError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Store(e) => e.code(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        // Store internals stay in the log, clients get the category only
        let message = match &self {
            ApiError::Store(EventLogError::Invalid(e)) => e.to_string(),
            ApiError::Store(EventLogError::Unavailable(detail)) => {
                tracing::error!(code, %detail, "event log unavailable");
                "Event log unavailable".to_string()
            }
            ApiError::Store(e) => {
                tracing::error!(code, error = %e, "event log read failed");
                "Event log query failed".to_string()
            }
        };

        let mut response = (status, Json(ErrorResponse { error: message })).into_response();
        response.extensions_mut().insert(ErrorCode(code));
        response
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub analytics: AdminAnalytics,
    /// Where the request recorder appends
    pub log_writer: Arc<dyn EventLogWriter>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(analytics: AdminAnalytics, log_writer: Arc<dyn EventLogWriter>) -> Self {
        Self {
            analytics,
            log_writer,
            started_at: Instant::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tubelytics_core::Error as CoreError;

    #[test]
    fn test_store_errors_map_to_status() {
        let invalid = ApiError::from(EventLogError::Invalid(CoreError::UnknownService(
            "tiktok".to_string(),
        )));
        assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(invalid.code(), "INVALID_FILTER");

        let down = ApiError::from(EventLogError::Unavailable("refused".to_string()));
        assert_eq!(down.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let broken = ApiError::from(EventLogError::Query("syntax".to_string()));
        assert_eq!(broken.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(broken.code(), "STORE_QUERY_FAILED");
    }

    async fn extract(uri: &str) -> RawFilterParams {
        let (mut parts, _) = axum::http::Request::builder()
            .uri(uri)
            .body(())
            .unwrap()
            .into_parts();
        let FilterQuery(params) = FilterQuery::from_request_parts(&mut parts, &()).await.unwrap();
        params
    }

    #[tokio::test]
    async fn test_filter_query_keeps_first_value() {
        let params = extract("/api/v1/admin/errors?limit=5&limit=6&route=%2Fai%2Ftitle").await;
        assert_eq!(params.limit(), Some("5"));
        assert_eq!(params.route(), Some("/ai/title"));

        let params = extract("/api/v1/admin/errors").await;
        assert_eq!(params.limit(), None);
    }

    #[test]
    fn test_response_hides_store_detail() {
        let response =
            ApiError::from(EventLogError::Query("relation missing".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.extensions().get::<ErrorCode>(),
            Some(&ErrorCode("STORE_QUERY_FAILED"))
        );
    }
}
