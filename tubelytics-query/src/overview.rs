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

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tubelytics_core::{RequestLogEntry, Service};

use crate::status::StatusCounts;

/// Headline numbers for the admin dashboard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverviewSummary {
    pub requests: u64,
    /// Distinct non-empty caller emails
    pub active_users_like: u64,
    pub ai_calls: u64,
    pub yt_calls: u64,
    #[serde(flatten)]
    pub counts: StatusCounts,
}

pub fn overview_summary(rows: &[RequestLogEntry]) -> OverviewSummary {
    let mut summary = OverviewSummary::default();
    let mut users: HashSet<&str> = HashSet::new();

    for row in rows {
        summary.requests += 1;
        match row.service {
            Service::Ai => summary.ai_calls += 1,
            Service::Youtube => summary.yt_calls += 1,
            Service::Web => {}
        }
        summary.counts.record(row.status);
        if let Some(email) = row.user_email.as_deref().filter(|e| !e.is_empty()) {
            users.insert(email);
        }
    }

    summary.active_users_like = users.len() as u64;
    summary
}
