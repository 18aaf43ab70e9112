//! Chart and table models for report results. Drawing is left to the front end.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use shared::report::{ReportResult, ShipmentRow};

pub const DETAIL_ROW_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewFormat {
    #[default]
    Chart,
    Table,
}

impl FromStr for ViewFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chart" => Ok(ViewFormat::Chart),
            "table" => Ok(ViewFormat::Table),
            other => Err(format!("unknown view format '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Line,
    Pie,
    Doughnut,
    GroupedBar,
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChartKind::Line => "line",
            ChartKind::Pie => "pie",
            ChartKind::Doughnut => "doughnut",
            ChartKind::GroupedBar => "grouped bar",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    pub label: String,
    pub values: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub title: String,
    pub labels: Vec<String>,
    pub datasets: Vec<Dataset>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    pub label: String,
    pub value: String,
}

impl Card {
    fn new(label: impl Into<String>, value: impl ToString) -> Self {
        Self {
            label: label.into(),
            value: value.to_string(),
        }
    }
}

/// At most `DETAIL_ROW_LIMIT` rows; `total` counts every record received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub total: usize,
}

impl DetailTable {
    fn build<T>(columns: &[&str], records: &[T], row: impl Fn(&T) -> Vec<String>) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: records.iter().take(DETAIL_ROW_LIMIT).map(row).collect(),
            total: records.len(),
        }
    }

    pub fn truncated(&self) -> bool {
        self.total > DETAIL_ROW_LIMIT
    }

    pub fn notice(&self) -> Option<String> {
        self.truncated().then(|| {
            format!(
                "Showing {DETAIL_ROW_LIMIT} of {} records. Export the report to see all data.",
                self.total
            )
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableView {
    pub title: String,
    pub cards: Vec<Card>,
    pub detail: DetailTable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendering {
    Chart(ChartSpec),
    Table(TableView),
}

pub fn render(result: &ReportResult, format: ViewFormat) -> Rendering {
    match format {
        ViewFormat::Chart => Rendering::Chart(chart(result)),
        ViewFormat::Table => Rendering::Table(table(result)),
    }
}

pub fn chart(result: &ReportResult) -> ChartSpec {
    match result {
        ReportResult::Overview(report) => ChartSpec {
            kind: ChartKind::Line,
            title: "Shipment trend".into(),
            labels: report
                .trend
                .iter()
                .map(|p| p.date.format("%Y-%m-%d").to_string())
                .collect(),
            datasets: vec![
                Dataset {
                    label: "Shipments".into(),
                    values: report.trend.iter().map(|p| p.shipments).collect(),
                },
                Dataset {
                    label: "Delivered".into(),
                    values: report.trend.iter().map(|p| p.delivered).collect(),
                },
            ],
        },
        ReportResult::Shipments(report) => ChartSpec {
            kind: ChartKind::Pie,
            title: "Shipments by status".into(),
            labels: report
                .by_status
                .iter()
                .map(|c| c.status.label().to_string())
                .collect(),
            datasets: vec![Dataset {
                label: "Shipments".into(),
                values: report.by_status.iter().map(|c| c.count).collect(),
            }],
        },
        ReportResult::Users(report) => ChartSpec {
            kind: ChartKind::Doughnut,
            title: "Users by role".into(),
            labels: report.by_role.iter().map(|c| c.role.clone()).collect(),
            datasets: vec![Dataset {
                label: "Users".into(),
                values: report.by_role.iter().map(|c| c.count).collect(),
            }],
        },
        ReportResult::Drivers(report) => {
            let series = |label: &str, pick: fn(&shared::report::DriverPerformance) -> u64| {
                Dataset {
                    label: label.into(),
                    values: report.drivers.iter().map(pick).collect(),
                }
            };
            ChartSpec {
                kind: ChartKind::GroupedBar,
                title: "Driver performance".into(),
                labels: report.drivers.iter().map(|d| d.name.clone()).collect(),
                datasets: vec![
                    series("Assigned", |d| d.assigned),
                    series("Delivered", |d| d.delivered),
                    series("Pending", |d| d.pending),
                ],
            }
        }
    }
}

const SHIPMENT_COLUMNS: [&str; 5] = ["Tracking #", "Status", "Origin", "Destination", "Created"];

fn shipment_row(row: &ShipmentRow) -> Vec<String> {
    vec![
        row.tracking_number.to_string(),
        row.status.label().to_string(),
        row.origin.clone(),
        row.destination.clone(),
        short_date(row.created_at),
    ]
}

fn short_date(at: Option<DateTime<Utc>>) -> String {
    at.map(|at| at.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".into())
}

pub fn table(result: &ReportResult) -> TableView {
    match result {
        ReportResult::Overview(report) => TableView {
            title: "Overview".into(),
            cards: vec![
                Card::new("Total Shipments", report.total_shipments),
                Card::new("Total Users", report.total_users),
                Card::new("Total Drivers", report.total_drivers),
                Card::new("Delivered", report.delivered_count),
                Card::new("Pending", report.pending_count),
            ],
            detail: DetailTable::build(&SHIPMENT_COLUMNS, &report.recent_shipments, shipment_row),
        },
        ReportResult::Shipments(report) => {
            let mut cards = vec![Card::new("Total Shipments", report.total)];
            cards.extend(
                report
                    .by_status
                    .iter()
                    .map(|c| Card::new(c.status.label(), c.count)),
            );
            TableView {
                title: "Shipments".into(),
                cards,
                detail: DetailTable::build(&SHIPMENT_COLUMNS, &report.shipments, shipment_row),
            }
        }
        ReportResult::Users(report) => {
            let mut cards = vec![Card::new("Total Users", report.total)];
            cards.extend(report.by_role.iter().map(|c| Card::new(&c.role, c.count)));
            TableView {
                title: "Users".into(),
                cards,
                detail: DetailTable::build(
                    &["Name", "Email", "Role", "Active", "Joined"],
                    &report.users,
                    |u| {
                        vec![
                            u.name.clone(),
                            u.email.clone(),
                            u.role.clone(),
                            if u.active { "yes" } else { "no" }.to_string(),
                            short_date(u.created_at),
                        ]
                    },
                ),
            }
        }
        ReportResult::Drivers(report) => TableView {
            title: "Drivers".into(),
            cards: vec![
                Card::new("Total Drivers", report.total),
                Card::new(
                    "Delivered",
                    report.drivers.iter().map(|d| d.delivered).sum::<u64>(),
                ),
                Card::new(
                    "Pending",
                    report.drivers.iter().map(|d| d.pending).sum::<u64>(),
                ),
                Card::new(
                    "Handovers",
                    report.drivers.iter().map(|d| d.handovers).sum::<u64>(),
                ),
            ],
            detail: DetailTable::build(
                &["Driver", "Assigned", "Delivered", "Pending", "Handovers"],
                &report.drivers,
                |d| {
                    vec![
                        d.name.clone(),
                        d.assigned.to_string(),
                        d.delivered.to_string(),
                        d.pending.to_string(),
                        d.handovers.to_string(),
                    ]
                },
            ),
        },
    }
}
