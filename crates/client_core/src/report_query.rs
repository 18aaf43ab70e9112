use chrono::{DateTime, TimeZone};
use shared::report::{ExportFormat, ReportFilters, ReportKind, TimeRange};

use crate::date_range::{derive_date_range, DateRangeError};

const RESERVED_KEYS: [&str; 3] = ["startDate", "endDate", "format"];

/// Report type, time range and filters for one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportQuery {
    pub filters: ReportFilters,
    pub time_range: TimeRange,
}

impl ReportQuery {
    pub fn new(kind: ReportKind) -> Self {
        Self {
            filters: ReportFilters::new(kind),
            time_range: TimeRange::default(),
        }
    }

    pub fn with_time_range(mut self, time_range: TimeRange) -> Self {
        self.time_range = time_range;
        self
    }

    pub fn kind(&self) -> ReportKind {
        self.filters.kind()
    }

    /// `startDate`, `endDate`, then every non-empty filter.
    pub fn query_pairs<Tz: TimeZone>(
        &self,
        now: &DateTime<Tz>,
    ) -> Result<Vec<(String, String)>, DateRangeError> {
        let range = derive_date_range(now, &self.time_range)?;
        let start = range.start.ok_or(DateRangeError::MissingCustomStart)?;

        let mut pairs = vec![
            ("startDate".to_string(), start.query_value()),
            ("endDate".to_string(), range.end.query_value()),
        ];
        pairs.extend(
            self.filters
                .query_pairs()
                .into_iter()
                .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str())),
        );
        Ok(pairs)
    }

    pub fn export_pairs<Tz: TimeZone>(
        &self,
        now: &DateTime<Tz>,
        format: ExportFormat,
    ) -> Result<Vec<(String, String)>, DateRangeError> {
        let mut pairs = self.query_pairs(now)?;
        pairs.push(("format".to_string(), format.as_str().to_string()));
        Ok(pairs)
    }
}
