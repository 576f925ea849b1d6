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

//! Request log records
//!
//! One `RequestLogEntry` is written per HTTP request served by the backend.
//! Entries are append-only: nothing in this workspace updates or deletes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Backend area that handled a request, derived from the route prefix at
/// write time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Ai,
    Youtube,
    Web,
}

impl Service {
    pub const ALL: [Service; 3] = [Service::Ai, Service::Youtube, Service::Web];

    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Ai => "ai",
            Service::Youtube => "youtube",
            Service::Web => "web",
        }
    }

    /// Classify a request path: `/ai...` and `/youtube...` map to their
    /// services, everything else is `web`.
    pub fn from_route(path: &str) -> Self {
        if path.starts_with("/ai") {
            Service::Ai
        } else if path.starts_with("/youtube") {
            Service::Youtube
        } else {
            Service::Web
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Service {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ai" => Ok(Service::Ai),
            "youtube" => Ok(Service::Youtube),
            "web" => Ok(Service::Web),
            _ => Err(Error::UnknownService(s.to_string())),
        }
    }
}

/// A single logged HTTP request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestLogEntry {
    #[serde(with = "rfc3339")]
    pub created_at: DateTime<Utc>,
    pub service: Service,
    pub route: String,
    pub method: String,
    pub status: i32,
    /// Absent when the request was not timed
    pub latency_ms: Option<f64>,
    pub user_email: Option<String>,
    /// Present only on failures
    pub error_code: Option<String>,
}

impl RequestLogEntry {
    pub fn new(
        created_at: DateTime<Utc>,
        service: Service,
        route: impl Into<String>,
        method: impl Into<String>,
        status: i32,
    ) -> Self {
        Self {
            created_at,
            service,
            route: route.into(),
            method: method.into(),
            status,
            latency_ms: None,
            user_email: None,
            error_code: None,
        }
    }

    pub fn with_latency_ms(mut self, latency_ms: f64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    pub fn with_user_email(mut self, email: impl Into<String>) -> Self {
        self.user_email = Some(email.into());
        self
    }

    pub fn with_error_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }

    /// The latency if it was measured and is a finite number
    pub fn finite_latency(&self) -> Option<f64> {
        self.latency_ms.filter(|ms| ms.is_finite())
    }
}

/// Caller ranking row produced by the store for the last N days
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopUser {
    pub user_email: String,
    pub requests: i64,
    pub ai_calls: i64,
    pub youtube_calls: i64,
    pub errors: i64,
    #[serde(with = "rfc3339")]
    pub last_seen: DateTime<Utc>,
}

mod rfc3339 {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&crate::timestamp::format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        crate::timestamp::parse_timestamp(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {raw}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::parse_timestamp;

    #[test]
    fn test_service_round_trip() {
        for service in Service::ALL {
            assert_eq!(service.as_str().parse::<Service>().unwrap(), service);
        }
        assert_eq!("YouTube".parse::<Service>().unwrap(), Service::Youtube);
        assert!(matches!(
            "mobile".parse::<Service>(),
            Err(Error::UnknownService(_))
        ));
    }

    #[test]
    fn test_service_from_route() {
        assert_eq!(Service::from_route("/ai/title"), Service::Ai);
        assert_eq!(Service::from_route("/youtube/channels?id=1"), Service::Youtube);
        assert_eq!(Service::from_route("/api/v1/admin/errors"), Service::Web);
        assert_eq!(Service::from_route("/"), Service::Web);
    }

    #[test]
    fn test_entry_json_shape() {
        let entry = RequestLogEntry::new(
            parse_timestamp("2024-01-01T10:00:00Z").unwrap(),
            Service::Ai,
            "/ai/title",
            "POST",
            500,
        )
        .with_latency_ms(120.0)
        .with_error_code("GEMINI_TIMEOUT");

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["created_at"], "2024-01-01T10:00:00Z");
        assert_eq!(json["service"], "ai");
        assert_eq!(json["status"], 500);
        assert_eq!(json["user_email"], serde_json::Value::Null);
        assert_eq!(json["error_code"], "GEMINI_TIMEOUT");

        let back: RequestLogEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_finite_latency() {
        let ts = parse_timestamp("2024-01-01").unwrap();
        let entry = RequestLogEntry::new(ts, Service::Web, "/", "GET", 200);
        assert_eq!(entry.finite_latency(), None);
        assert_eq!(entry.clone().with_latency_ms(f64::NAN).finite_latency(), None);
        assert_eq!(entry.with_latency_ms(42.0).finite_latency(), Some(42.0));
    }
}
