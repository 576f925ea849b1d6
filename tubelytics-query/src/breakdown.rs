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
use std::collections::BTreeMap;
use tubelytics_core::{RequestLogEntry, Service};

use crate::status::StatusCounts;

/// Traffic for one `(service, route)` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteUsage {
    pub route: String,
    pub service: Service,
    #[serde(flatten)]
    pub counts: StatusCounts,
    /// Every row for the pair, bucketed or not
    pub total: u64,
}

/// Group by `(service, route)`, busiest first.
///
/// Equal totals keep `(service, route)` ascending order.
pub fn route_breakdown(rows: &[RequestLogEntry]) -> Vec<RouteUsage> {
    let mut groups: BTreeMap<(Service, &str), (StatusCounts, u64)> = BTreeMap::new();
    for row in rows {
        let (counts, total) = groups.entry((row.service, row.route.as_str())).or_default();
        counts.record(row.status);
        *total += 1;
    }

    let mut usage: Vec<RouteUsage> = groups
        .into_iter()
        .map(|((service, route), (counts, total))| RouteUsage {
            route: route.to_string(),
            service,
            counts,
            total,
        })
        .collect();
    // Stable sort keeps the BTreeMap key order among ties
    usage.sort_by(|a, b| b.total.cmp(&a.total));
    usage
}
