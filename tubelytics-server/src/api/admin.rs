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

//! Admin analytics endpoints
//!
//! Mounted under `/api/v1/admin` behind authentication and the admin gate.
//! Every handler takes the raw filter parameters as optional strings through
//! [`FilterQuery`] and lets the engine decide what is malformed.

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tubelytics_core::{RequestLogEntry, Service, TopUser};
use tubelytics_query::{DayStatusCounts, LatencyReport, OverviewSummary, RouteUsage};

use super::{ApiError, AppState, FilterQuery};

/// Routes relative to the admin prefix
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/overview", get(overview))
        .route("/ai-usage", get(ai_usage))
        .route("/youtube-usage", get(youtube_usage))
        .route("/errors", get(errors))
        .route("/top-users", get(top_users))
        .route("/latency", get(latency))
        .route("/usage-breakdown", get(usage_breakdown))
        .route("/errors.csv", get(errors_csv))
        .route("/usage.csv", get(usage_csv))
}

/// GET /api/v1/admin/overview
pub async fn overview(
    State(state): State<AppState>,
    FilterQuery(params): FilterQuery,
) -> Result<Json<OverviewSummary>, ApiError> {
    Ok(Json(state.analytics.overview(&params).await?))
}

/// GET /api/v1/admin/ai-usage
pub async fn ai_usage(
    State(state): State<AppState>,
    FilterQuery(params): FilterQuery,
) -> Result<Json<Vec<DayStatusCounts>>, ApiError> {
    let days = state
        .analytics
        .usage_timeseries(Service::Ai, &params)
        .await?;
    Ok(Json(days))
}

/// GET /api/v1/admin/youtube-usage
pub async fn youtube_usage(
    State(state): State<AppState>,
    FilterQuery(params): FilterQuery,
) -> Result<Json<Vec<DayStatusCounts>>, ApiError> {
    let days = state
        .analytics
        .usage_timeseries(Service::Youtube, &params)
        .await?;
    Ok(Json(days))
}

/// GET /api/v1/admin/errors
pub async fn errors(
    State(state): State<AppState>,
    FilterQuery(params): FilterQuery,
) -> Result<Json<Vec<RequestLogEntry>>, ApiError> {
    Ok(Json(state.analytics.recent_errors(&params).await?))
}

/// GET /api/v1/admin/top-users
pub async fn top_users(State(state): State<AppState>) -> Result<Json<Vec<TopUser>>, ApiError> {
    Ok(Json(state.analytics.top_users().await?))
}

/// GET /api/v1/admin/latency
pub async fn latency(
    State(state): State<AppState>,
    FilterQuery(params): FilterQuery,
) -> Result<Json<LatencyReport>, ApiError> {
    Ok(Json(state.analytics.latency(&params).await?))
}

/// GET /api/v1/admin/usage-breakdown
pub async fn usage_breakdown(
    State(state): State<AppState>,
    FilterQuery(params): FilterQuery,
) -> Result<Json<Vec<RouteUsage>>, ApiError> {
    Ok(Json(state.analytics.usage_breakdown(&params).await?))
}

/// GET /api/v1/admin/errors.csv
pub async fn errors_csv(
    State(state): State<AppState>,
    FilterQuery(params): FilterQuery,
) -> Result<Response, ApiError> {
    let body = state.analytics.errors_csv(&params).await?;
    Ok(csv_attachment("errors.csv", body))
}

/// GET /api/v1/admin/usage.csv
pub async fn usage_csv(
    State(state): State<AppState>,
    FilterQuery(params): FilterQuery,
) -> Result<Response, ApiError> {
    let body = state.analytics.usage_csv(&params).await?;
    Ok(csv_attachment("usage.csv", body))
}

fn csv_attachment(filename: &'static str, body: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_attachment_headers() {
        let response = csv_attachment("usage.csv", "a,b".to_string());
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "text/csv; charset=utf-8");
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "attachment; filename=\"usage.csv\""
        );
    }
}
