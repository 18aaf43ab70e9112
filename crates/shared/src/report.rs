use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{ShipmentStatus, TrackingNumber, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Overview,
    Shipments,
    Users,
    Drivers,
}

impl ReportKind {
    pub const ALL: [ReportKind; 4] = [
        ReportKind::Overview,
        ReportKind::Shipments,
        ReportKind::Users,
        ReportKind::Drivers,
    ];

    pub fn path_segment(self) -> &'static str {
        match self {
            ReportKind::Overview => "overview",
            ReportKind::Shipments => "shipments",
            ReportKind::Users => "users",
            ReportKind::Drivers => "drivers",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseReportError {
    #[error("unknown report type '{0}'")]
    Kind(String),
    #[error("unknown time range '{0}'")]
    TimeRange(String),
    #[error("unknown export format '{0}'")]
    Format(String),
}

impl FromStr for ReportKind {
    type Err = ParseReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReportKind::ALL
            .into_iter()
            .find(|kind| kind.path_segment() == s)
            .ok_or_else(|| ParseReportError::Kind(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeRange {
    Today,
    Week,
    Month,
    ThreeMonths,
    SixMonths,
    Year,
    Custom {
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    },
}

impl TimeRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::Today => "today",
            TimeRange::Week => "week",
            TimeRange::Month => "month",
            TimeRange::ThreeMonths => "3months",
            TimeRange::SixMonths => "6months",
            TimeRange::Year => "year",
            TimeRange::Custom { .. } => "custom",
        }
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        TimeRange::Month
    }
}

impl FromStr for TimeRange {
    type Err = ParseReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "today" => Ok(TimeRange::Today),
            "week" => Ok(TimeRange::Week),
            "month" => Ok(TimeRange::Month),
            "3months" => Ok(TimeRange::ThreeMonths),
            "6months" => Ok(TimeRange::SixMonths),
            "year" => Ok(TimeRange::Year),
            "custom" => Ok(TimeRange::Custom {
                start: None,
                end: None,
            }),
            other => Err(ParseReportError::TimeRange(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Pdf,
    Excel,
    Csv,
}

impl ExportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportFormat::Pdf => "pdf",
            ExportFormat::Excel => "excel",
            ExportFormat::Csv => "csv",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Pdf => "pdf",
            ExportFormat::Excel => "xlsx",
            ExportFormat::Csv => "csv",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ParseReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pdf" => Ok(ExportFormat::Pdf),
            "excel" | "xlsx" => Ok(ExportFormat::Excel),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(ParseReportError::Format(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShipmentFilters {
    pub status: Option<ShipmentStatus>,
    pub origin: String,
    pub destination: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilters {
    pub role: String,
    pub active: Option<bool>,
    pub search: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverFilters {
    pub search: String,
}

/// Filter schema per report kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterSchema {
    Overview,
    Shipments(ShipmentFilters),
    Users(UserFilters),
    Drivers(DriverFilters),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("invalid value '{value}' for filter '{key}'")]
    InvalidValue { key: String, value: String },
}

/// Typed filters for one report kind, plus keys the schema does not model.
/// Unknown keys are forwarded to the server unvalidated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFilters {
    pub schema: FilterSchema,
    pub extra: Vec<(String, String)>,
}

impl ReportFilters {
    pub fn new(kind: ReportKind) -> Self {
        let schema = match kind {
            ReportKind::Overview => FilterSchema::Overview,
            ReportKind::Shipments => FilterSchema::Shipments(ShipmentFilters::default()),
            ReportKind::Users => FilterSchema::Users(UserFilters::default()),
            ReportKind::Drivers => FilterSchema::Drivers(DriverFilters::default()),
        };
        Self {
            schema,
            extra: Vec::new(),
        }
    }

    pub fn kind(&self) -> ReportKind {
        match self.schema {
            FilterSchema::Overview => ReportKind::Overview,
            FilterSchema::Shipments(_) => ReportKind::Shipments,
            FilterSchema::Users(_) => ReportKind::Users,
            FilterSchema::Drivers(_) => ReportKind::Drivers,
        }
    }

    /// Routes a raw `key=value` pair into the typed schema when the key is
    /// known for this kind, otherwise into `extra` (replacing a previous value).
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), FilterError> {
        let value = value.trim();
        let invalid = || FilterError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };

        match (&mut self.schema, key) {
            (FilterSchema::Shipments(f), "status") => {
                f.status = if value.is_empty() {
                    None
                } else {
                    Some(value.parse().map_err(|_| invalid())?)
                };
            }
            (FilterSchema::Shipments(f), "origin") => f.origin = value.to_string(),
            (FilterSchema::Shipments(f), "destination") => f.destination = value.to_string(),
            (FilterSchema::Users(f), "role") => f.role = value.to_string(),
            (FilterSchema::Users(f), "active") => {
                f.active = match value {
                    "" => None,
                    "true" => Some(true),
                    "false" => Some(false),
                    _ => return Err(invalid()),
                };
            }
            (FilterSchema::Users(f), "search") => f.search = value.to_string(),
            (FilterSchema::Drivers(f), "search") => f.search = value.to_string(),
            _ => {
                if let Some(slot) = self.extra.iter_mut().find(|(k, _)| k == key) {
                    slot.1 = value.to_string();
                } else {
                    self.extra.push((key.to_string(), value.to_string()));
                }
            }
        }
        Ok(())
    }

    /// Non-empty filters as query pairs. Each key appears once; a key the
    /// typed schema owns is never taken from `extra`, even when its typed
    /// value is empty.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let typed: Vec<(&str, String)> = match &self.schema {
            FilterSchema::Overview => Vec::new(),
            FilterSchema::Shipments(f) => vec![
                (
                    "status",
                    f.status.map(ShipmentStatus::label).unwrap_or("").to_string(),
                ),
                ("origin", f.origin.clone()),
                ("destination", f.destination.clone()),
            ],
            FilterSchema::Users(f) => vec![
                ("role", f.role.clone()),
                (
                    "active",
                    f.active.map(|v| v.to_string()).unwrap_or_default(),
                ),
                ("search", f.search.clone()),
            ],
            FilterSchema::Drivers(f) => vec![("search", f.search.clone())],
        };

        let mut pairs: Vec<(String, String)> = Vec::new();
        let mut push = |key: &str, value: &str| {
            let value = value.trim();
            if value.is_empty() || pairs.iter().any(|(k, _)| k == key) {
                return;
            }
            pairs.push((key.to_string(), value.to_string()));
        };
        for (key, value) in &typed {
            push(key, value.as_str());
        }
        for (key, value) in &self.extra {
            if !typed.iter().any(|(owned, _)| *owned == key.as_str()) {
                push(key.as_str(), value.as_str());
            }
        }
        pairs
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentRow {
    pub tracking_number: TrackingNumber,
    pub status: ShipmentStatus,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub destination: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub shipments: u64,
    #[serde(default)]
    pub delivered: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewReport {
    pub total_shipments: u64,
    pub total_users: u64,
    pub total_drivers: u64,
    #[serde(default)]
    pub delivered_count: u64,
    #[serde(default)]
    pub pending_count: u64,
    #[serde(default)]
    pub trend: Vec<TrendPoint>,
    #[serde(default)]
    pub recent_shipments: Vec<ShipmentRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusCount {
    pub status: ShipmentStatus,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentsReport {
    pub total: u64,
    pub by_status: Vec<StatusCount>,
    #[serde(default)]
    pub shipments: Vec<ShipmentRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleCount {
    pub role: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRow {
    pub name: String,
    pub email: String,
    pub role: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsersReport {
    pub total: u64,
    pub by_role: Vec<RoleCount>,
    #[serde(default)]
    pub users: Vec<UserRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverPerformance {
    pub driver_id: UserId,
    pub name: String,
    #[serde(default)]
    pub assigned: u64,
    #[serde(default)]
    pub delivered: u64,
    #[serde(default)]
    pub pending: u64,
    #[serde(default)]
    pub handovers: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriversReport {
    pub total: u64,
    pub drivers: Vec<DriverPerformance>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReportResult {
    Overview(OverviewReport),
    Shipments(ShipmentsReport),
    Users(UsersReport),
    Drivers(DriversReport),
}

impl ReportResult {
    /// The endpoint does not tag its payload; the requested kind selects the shape.
    pub fn decode(kind: ReportKind, body: serde_json::Value) -> serde_json::Result<Self> {
        Ok(match kind {
            ReportKind::Overview => ReportResult::Overview(serde_json::from_value(body)?),
            ReportKind::Shipments => ReportResult::Shipments(serde_json::from_value(body)?),
            ReportKind::Users => ReportResult::Users(serde_json::from_value(body)?),
            ReportKind::Drivers => ReportResult::Drivers(serde_json::from_value(body)?),
        })
    }

    pub fn kind(&self) -> ReportKind {
        match self {
            ReportResult::Overview(_) => ReportKind::Overview,
            ReportResult::Shipments(_) => ReportKind::Shipments,
            ReportResult::Users(_) => ReportKind::Users,
            ReportResult::Drivers(_) => ReportKind::Drivers,
        }
    }
}
