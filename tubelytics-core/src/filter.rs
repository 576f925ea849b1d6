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

//! Filter builder
//!
//! Turns the admin panel's raw query-string parameters into an
//! [`AggregationQuery`]. Every parameter is kept as a string until here so a
//! malformed `limit` degrades to the endpoint default instead of failing
//! extraction.

use serde::Deserialize;

use crate::entry::Service;
use crate::error::Result;
use crate::query::AggregationQuery;

/// Default and hard cap for an endpoint's `limit` parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitPolicy {
    pub default: usize,
    pub cap: usize,
}

impl LimitPolicy {
    pub const fn new(default: usize, cap: usize) -> Self {
        Self { default, cap }
    }

    /// `min(parsed-or-default, cap)`
    pub fn resolve(&self, raw: Option<&str>) -> usize {
        parse_limit(raw).unwrap_or(self.default).min(self.cap)
    }
}

/// Recent errors listing
pub const ERRORS_LIMIT: LimitPolicy = LimitPolicy::new(100, 500);
/// Errors CSV export
pub const ERRORS_CSV_LIMIT: LimitPolicy = LimitPolicy::new(1_000, 5_000);
/// Usage CSV export
pub const USAGE_CSV_LIMIT: LimitPolicy = LimitPolicy::new(5_000, 20_000);

/// Parse the leading integer of `raw` the way a lenient form parser would:
/// surrounding whitespace and a sign are allowed, trailing junk is ignored
/// (`"12abc"` is 12). Returns `None` for missing, non-numeric, zero or
/// negative input.
pub fn parse_limit(raw: Option<&str>) -> Option<usize> {
    let raw = raw?.trim_start();
    let (negative, digits) = match raw.as_bytes().first() {
        Some(b'-') => (true, &raw[1..]),
        Some(b'+') => (false, &raw[1..]),
        _ => (false, raw),
    };

    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 || negative {
        return None;
    }

    // Saturate absurdly long inputs, the cap brings them back down
    let value = digits[..end].parse::<usize>().unwrap_or(usize::MAX);
    (value > 0).then_some(value)
}

/// Raw admin query parameters. Empty strings count as absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFilterParams {
    pub start: Option<String>,
    pub end: Option<String>,
    pub route: Option<String>,
    pub service: Option<String>,
    pub limit: Option<String>,
}

impl RawFilterParams {
    /// Build from decoded query pairs. The first occurrence of a key wins and
    /// unrecognised keys are ignored, so no query string is ever rejected.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut params = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_ref() {
                "start" => &mut params.start,
                "end" => &mut params.end,
                "route" => &mut params.route,
                "service" => &mut params.service,
                "limit" => &mut params.limit,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into());
            }
        }
        params
    }

    pub fn start(&self) -> Option<&str> {
        non_empty(&self.start)
    }

    pub fn end(&self) -> Option<&str> {
        non_empty(&self.end)
    }

    pub fn route(&self) -> Option<&str> {
        non_empty(&self.route)
    }

    pub fn limit(&self) -> Option<&str> {
        non_empty(&self.limit)
    }

    /// The requested service tag, rejecting anything but `ai|youtube|web`
    pub fn service(&self) -> Result<Option<Service>> {
        non_empty(&self.service)
            .map(str::parse::<Service>)
            .transpose()
    }

    /// Query over start, end and route only. Endpoints that pin the service
    /// themselves start from this.
    pub fn range_query(&self, limit: usize) -> AggregationQuery {
        let mut query = AggregationQuery::new(limit);
        query.start = self.start().map(str::to_string);
        query.end = self.end().map(str::to_string);
        query.route_contains = self.route().map(str::to_string);
        query
    }

    /// Query over every dimension including the optional service filter
    pub fn full_query(&self, limit: usize) -> Result<AggregationQuery> {
        let mut query = self.range_query(limit);
        query.service = self.service()?;
        Ok(query)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
