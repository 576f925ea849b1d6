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

//! Tubelytics Storage Layer
//!
//! Access to the append-only `request_logs` event log.
//!
//! ## Architecture
//!
//! The analytics engine never talks to a database directly. It receives an
//! [`EventLogReader`] at construction time, and the request recorder receives
//! an [`EventLogWriter`]. Two backends implement both traits:
//!
//! - **[`MemoryEventLog`]**: in-process vector behind a read/write lock, for
//!   development and tests
//! - **[`PgEventLog`]**: the managed Postgres table, through a `sqlx` pool
//!   (feature `postgres`, on by default)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tubelytics_storage::{EventLogReader, MemoryEventLog};
//!
//! let log = Arc::new(MemoryEventLog::new());
//! let reader: Arc<dyn EventLogReader> = log.clone();
//! ```

pub mod error;
pub mod log;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use error::{EventLogError, Result};
pub use log::{EventLogReader, EventLogWriter};
pub use memory::MemoryEventLog;
#[cfg(feature = "postgres")]
pub use postgres::{PgEventLog, PgEventLogConfig};
