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

//! Request-log recording middleware
//!
//! Appends one `RequestLogEntry` per served request. The write is spawned and
//! never awaited, so a slow or failing store cannot delay or alter the
//! response.

use axum::{
    extract::{Request, State},
    http::Uri,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use std::time::Instant;
use tubelytics_core::{RequestLogEntry, Service};
use url::form_urlencoded;

use crate::api::{AppState, ErrorCode};
use crate::auth::AuthContext;

/// Query parameters never written to the log
const REDACTED_PARAMS: &[&str] = &["api_key", "x-api-key"];

pub async fn record_request(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let started = Instant::now();
    let created_at = Utc::now();
    let method = req.method().to_string();
    let route = loggable_route(req.uri());
    let service = Service::from_route(req.uri().path());
    let user_email = req
        .extensions()
        .get::<AuthContext>()
        .and_then(|ctx| ctx.email.clone());

    let response = next.run(req).await;

    let mut entry = RequestLogEntry::new(
        created_at,
        service,
        route,
        method,
        i32::from(response.status().as_u16()),
    )
    .with_latency_ms(started.elapsed().as_secs_f64() * 1000.0);
    entry.user_email = user_email;
    entry.error_code = response
        .extensions()
        .get::<ErrorCode>()
        .map(|code| code.0.to_string());

    let writer = state.log_writer.clone();
    tokio::spawn(async move {
        if let Err(e) = writer.append(entry).await {
            tracing::warn!(error = %e, code = e.code(), "failed to record request log");
        }
    });

    response
}

/// Path plus query, minus credentials
fn loggable_route(uri: &Uri) -> String {
    let path = uri.path();
    let Some(query) = uri.query() else {
        return path.to_string();
    };

    let has_secret = form_urlencoded::parse(query.as_bytes())
        .any(|(key, _)| REDACTED_PARAMS.contains(&key.to_ascii_lowercase().as_str()));
    if !has_secret {
        return format!("{path}?{query}");
    }

    let kept: String = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(
            form_urlencoded::parse(query.as_bytes())
                .filter(|(key, _)| !REDACTED_PARAMS.contains(&key.to_ascii_lowercase().as_str())),
        )
        .finish();
    if kept.is_empty() {
        path.to_string()
    } else {
        format!("{path}?{kept}")
    }
}
