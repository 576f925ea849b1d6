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

use chrono::{DateTime, Utc};

use crate::entry::{RequestLogEntry, Service};
use crate::error::{Error, Result};
use crate::timestamp::parse_timestamp;

/// Row ordering requested from the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowOrder {
    /// Newest `created_at` first. Listing endpoints need this so the row cap
    /// keeps the most recent entries.
    NewestFirst,
    /// Store order; any subset of matching rows may survive the cap.
    #[default]
    Unordered,
}

/// Read predicate for one fetch against the request log.
///
/// Absent fields mean "no filter on that dimension".
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationQuery {
    /// Inclusive lower bound, unparsed
    pub start: Option<String>,
    /// Inclusive upper bound, unparsed
    pub end: Option<String>,
    /// Case-insensitive, unanchored substring of `route`
    pub route_contains: Option<String>,
    pub service: Option<Service>,
    /// `status >= status_min`
    pub status_min: Option<i32>,
    /// Only rows with a recorded latency
    pub latency_only: bool,
    pub order: RowOrder,
    pub limit: usize,
}

impl AggregationQuery {
    pub fn new(limit: usize) -> Self {
        Self {
            start: None,
            end: None,
            route_contains: None,
            service: None,
            status_min: None,
            latency_only: false,
            order: RowOrder::Unordered,
            limit,
        }
    }

    pub fn with_service(mut self, service: Service) -> Self {
        self.service = Some(service);
        self
    }

    pub fn with_status_min(mut self, status_min: i32) -> Self {
        self.status_min = Some(status_min);
        self
    }

    pub fn with_order(mut self, order: RowOrder) -> Self {
        self.order = order;
        self
    }

    pub fn latency_only(mut self) -> Self {
        self.latency_only = true;
        self
    }

    /// True when no caller-supplied dimension is set
    pub fn is_unfiltered(&self) -> bool {
        self.start.is_none()
            && self.end.is_none()
            && self.route_contains.is_none()
            && self.service.is_none()
    }

    /// Parse `start` and `end`. Stores call this before issuing the read so a
    /// malformed bound fails the whole request.
    pub fn time_bounds(&self) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
        let start = parse_bound("start", self.start.as_deref())?;
        let end = parse_bound("end", self.end.as_deref())?;
        Ok((start, end))
    }

    /// Lowercased route needle, if any
    pub fn route_needle(&self) -> Option<String> {
        self.route_contains.as_ref().map(|r| r.to_lowercase())
    }

    /// Evaluate every predicate except the row cap against one entry.
    ///
    /// `bounds` and `needle` are the pre-parsed outputs of [`time_bounds`]
    /// and [`route_needle`] so callers scanning many rows parse once.
    ///
    /// [`time_bounds`]: AggregationQuery::time_bounds
    /// [`route_needle`]: AggregationQuery::route_needle
    pub fn matches(
        &self,
        entry: &RequestLogEntry,
        bounds: &(Option<DateTime<Utc>>, Option<DateTime<Utc>>),
        needle: Option<&str>,
    ) -> bool {
        if let Some(start) = bounds.0 {
            if entry.created_at < start {
                return false;
            }
        }
        if let Some(end) = bounds.1 {
            if entry.created_at > end {
                return false;
            }
        }
        if let Some(service) = self.service {
            if entry.service != service {
                return false;
            }
        }
        if let Some(status_min) = self.status_min {
            if entry.status < status_min {
                return false;
            }
        }
        if self.latency_only && entry.latency_ms.is_none() {
            return false;
        }
        if let Some(needle) = needle {
            if !entry.route.to_lowercase().contains(needle) {
                return false;
            }
        }
        true
    }
}

fn parse_bound(field: &'static str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    match raw {
        None => Ok(None),
        Some(value) => parse_timestamp(value)
            .map(Some)
            .ok_or_else(|| Error::InvalidTimestamp {
                field,
                value: value.to_string(),
            }),
    }
}
