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

//! Tubelytics Core
//!
//! Request-log records, query predicates and the filter builder shared by the
//! storage, query and server crates.

pub mod entry;
pub mod error;
pub mod filter;
pub mod query;
pub mod timestamp;

pub use entry::{RequestLogEntry, Service, TopUser};
pub use error::{Error, Result};
pub use filter::{
    parse_limit, LimitPolicy, RawFilterParams, ERRORS_CSV_LIMIT, ERRORS_LIMIT, USAGE_CSV_LIMIT,
};
pub use query::{AggregationQuery, RowOrder};
pub use timestamp::{day_key, format_timestamp, parse_timestamp};
