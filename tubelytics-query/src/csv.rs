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

//! CSV export
//!
//! Every cell is quoted, embedded quotes are doubled and null becomes an empty
//! quoted cell. Rows are joined with `\n` and there is no trailing newline.

use tubelytics_core::{format_timestamp, RequestLogEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsvColumn {
    CreatedAt,
    Service,
    Route,
    Method,
    Status,
    LatencyMs,
    UserEmail,
    ErrorCode,
}

impl CsvColumn {
    pub fn header(&self) -> &'static str {
        match self {
            CsvColumn::CreatedAt => "created_at",
            CsvColumn::Service => "service",
            CsvColumn::Route => "route",
            CsvColumn::Method => "method",
            CsvColumn::Status => "status",
            CsvColumn::LatencyMs => "latency_ms",
            CsvColumn::UserEmail => "user_email",
            CsvColumn::ErrorCode => "error_code",
        }
    }

    fn cell(&self, entry: &RequestLogEntry) -> Option<String> {
        match self {
            CsvColumn::CreatedAt => Some(format_timestamp(&entry.created_at)),
            CsvColumn::Service => Some(entry.service.as_str().to_string()),
            CsvColumn::Route => Some(entry.route.clone()),
            CsvColumn::Method => Some(entry.method.clone()),
            CsvColumn::Status => Some(entry.status.to_string()),
            CsvColumn::LatencyMs => entry.latency_ms.map(|ms| ms.to_string()),
            CsvColumn::UserEmail => entry.user_email.clone(),
            CsvColumn::ErrorCode => entry.error_code.clone(),
        }
    }
}

/// Columns of `errors.csv`
pub const ERRORS_COLUMNS: &[CsvColumn] = &[
    CsvColumn::CreatedAt,
    CsvColumn::Service,
    CsvColumn::Route,
    CsvColumn::Method,
    CsvColumn::Status,
    CsvColumn::LatencyMs,
    CsvColumn::UserEmail,
    CsvColumn::ErrorCode,
];

/// Columns of `usage.csv`
pub const USAGE_COLUMNS: &[CsvColumn] = &[
    CsvColumn::CreatedAt,
    CsvColumn::Service,
    CsvColumn::Route,
    CsvColumn::Method,
    CsvColumn::Status,
    CsvColumn::LatencyMs,
    CsvColumn::UserEmail,
];

pub fn quote_cell(value: Option<&str>) -> String {
    let raw = value.unwrap_or("");
    format!("\"{}\"", raw.replace('"', "\"\""))
}

pub fn to_csv(rows: &[RequestLogEntry], columns: &[CsvColumn]) -> String {
    let header = columns
        .iter()
        .map(CsvColumn::header)
        .collect::<Vec<_>>()
        .join(",");

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(header);
    for row in rows {
        let line = columns
            .iter()
            .map(|column| quote_cell(column.cell(row).as_deref()))
            .collect::<Vec<_>>()
            .join(",");
        lines.push(line);
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tubelytics_core::{parse_timestamp, Service};

    /// Quote-aware reader for the subset of CSV `to_csv` produces
    fn parse_csv(text: &str) -> Vec<Vec<String>> {
        let mut rows = Vec::new();
        let mut row = Vec::new();
        let mut cell = String::new();
        let mut in_quotes = false;
        let mut chars = text.chars().peekable();

        while let Some(c) = chars.next() {
            match (c, in_quotes) {
                ('"', true) if chars.peek() == Some(&'"') => {
                    chars.next();
                    cell.push('"');
                }
                ('"', _) => in_quotes = !in_quotes,
                (',', false) => row.push(std::mem::take(&mut cell)),
                ('\n', false) => {
                    row.push(std::mem::take(&mut cell));
                    rows.push(std::mem::take(&mut row));
                }
                (c, _) => cell.push(c),
            }
        }
        row.push(cell);
        rows.push(row);
        rows
    }

    fn sample() -> RequestLogEntry {
        RequestLogEntry::new(
            parse_timestamp("2024-01-01T10:00:00Z").unwrap(),
            Service::Ai,
            "/ai/title",
            "POST",
            500,
        )
        .with_latency_ms(12.5)
        .with_user_email("a@example.com")
        .with_error_code("UPSTREAM_TIMEOUT")
    }

    #[test]
    fn test_quote_cell() {
        assert_eq!(quote_cell(Some("He said \"hi\"")), "\"He said \"\"hi\"\"\"");
        assert_eq!(quote_cell(None), "\"\"");
    }

    #[test]
    fn test_errors_export() {
        let csv = to_csv(&[sample()], ERRORS_COLUMNS);
        assert_eq!(
            csv,
            "created_at,service,route,method,status,latency_ms,user_email,error_code\n\
             \"2024-01-01T10:00:00Z\",\"ai\",\"/ai/title\",\"POST\",\"500\",\"12.5\",\"a@example.com\",\"UPSTREAM_TIMEOUT\""
        );
    }

    #[test]
    fn test_usage_export_nulls() {
        let entry = RequestLogEntry::new(
            parse_timestamp("2024-01-01T10:00:00Z").unwrap(),
            Service::Web,
            "/",
            "GET",
            200,
        )
        .with_latency_ms(100.0);
        let csv = to_csv(&[entry], USAGE_COLUMNS);
        let lines: Vec<_> = csv.lines().collect();

        assert_eq!(lines[0], "created_at,service,route,method,status,latency_ms,user_email");
        assert_eq!(
            lines[1],
            "\"2024-01-01T10:00:00Z\",\"web\",\"/\",\"GET\",\"200\",\"100\",\"\""
        );
        assert!(!csv.ends_with('\n'));
    }

    #[test]
    fn test_header_only_when_empty() {
        assert_eq!(
            to_csv(&[], USAGE_COLUMNS),
            "created_at,service,route,method,status,latency_ms,user_email"
        );
    }

    proptest! {
        #[test]
        fn prop_round_trip_recovers_cells(
            route in "[ -~]{0,24}",
            email in proptest::option::of("[ -~\n]{0,16}"),
            code in proptest::option::of("[ -~]{0,12}"),
        ) {
            let mut entry = sample();
            entry.route = route.clone();
            entry.user_email = email.clone();
            entry.error_code = code.clone();

            let parsed = parse_csv(&to_csv(&[entry], ERRORS_COLUMNS));
            prop_assert_eq!(parsed.len(), 2);
            prop_assert_eq!(parsed[1].len(), ERRORS_COLUMNS.len());
            prop_assert_eq!(&parsed[1][2], &route);
            prop_assert_eq!(&parsed[1][6], &email.unwrap_or_default());
            prop_assert_eq!(&parsed[1][7], &code.unwrap_or_default());
        }
    }
}
