//! Plain-text rendering of view snapshots.

use std::fmt::Write as _;

use client_core::{
    render::{ChartKind, ChartSpec, Rendering, TableView},
    workflow::{ActionPanel, Listing, WorkflowSnapshot},
    SessionToken,
};
use shared::domain::{Driver, Shipment};

const BAR_WIDTH: u64 = 40;

pub fn session(session: &SessionToken) -> String {
    let mut out = format!("Signed in as {}", session.role);
    if let Some(name) = &session.name {
        let _ = write!(out, " ({name})");
    }
    if let Some(expires_at) = session.expires_at {
        let _ = write!(out, ", expires {}", expires_at.format("%Y-%m-%d %H:%M UTC"));
    }
    out
}

pub fn workflow(snapshot: &WorkflowSnapshot) {
    if let Some(message) = &snapshot.success {
        println!("✔ {message}");
    }
    if let Some(message) = &snapshot.error {
        println!("✖ {message}");
    }
    match &snapshot.listing {
        Listing::Empty => println!("Nothing to show"),
        Listing::Shipments(shipments) => print!("{}", shipment_list(shipments)),
        Listing::Drivers(drivers) => print!("{}", driver_list(drivers)),
    }
    if let Some(shipment) = &snapshot.selected {
        println!();
        print!("{}", detail(shipment, snapshot.action_panel));
    }
}

fn shipment_list(shipments: &[Shipment]) -> String {
    let rows: Vec<Vec<String>> = shipments
        .iter()
        .map(|s| {
            vec![
                s.id.to_string(),
                s.tracking_number.to_string(),
                s.status.label().to_string(),
                format!("{} -> {}", s.origin, s.destination),
                s.recipient.name.clone(),
            ]
        })
        .collect();
    grid(&["Id", "Tracking #", "Status", "Route", "Recipient"], &rows)
}

fn driver_list(drivers: &[Driver]) -> String {
    let rows: Vec<Vec<String>> = drivers
        .iter()
        .map(|d| {
            vec![
                d.name.clone(),
                d.email.clone(),
                d.company.clone().unwrap_or_else(|| "-".into()),
                d.created_at.format("%Y-%m-%d").to_string(),
            ]
        })
        .collect();
    grid(&["Driver", "Email", "Company", "Joined"], &rows)
}

fn detail(shipment: &Shipment, panel: ActionPanel) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Shipment {}", shipment.tracking_number);
    let _ = writeln!(out, "  Status:    {}", shipment.status);
    let _ = writeln!(
        out,
        "  From:      {} ({})",
        shipment.sender.name, shipment.origin
    );
    let _ = writeln!(
        out,
        "  To:        {} ({})",
        shipment.recipient.name, shipment.destination
    );
    if let Some(notes) = &shipment.pickup_notes {
        let _ = writeln!(out, "  Pickup:    {notes}");
    }
    if let Some(notes) = &shipment.handover_notes {
        let _ = writeln!(out, "  Handover:  {notes}");
    }
    if !shipment.tracking_history.is_empty() {
        let _ = writeln!(out, "  History:");
        for event in shipment.tracking_history.iter().rev() {
            let _ = writeln!(
                out,
                "    {}  {:<18} {}",
                event.timestamp.format("%Y-%m-%d %H:%M"),
                event.status.label(),
                event.location
            );
        }
    }
    match panel {
        ActionPanel::Pickup | ActionPanel::Handover => {
            if let Some(action) = panel.action() {
                let _ = writeln!(out, "  Available: {action}");
            }
        }
        ActionPanel::AwaitingConfirmation => {
            let _ = writeln!(out, "  Waiting for admin to confirm the handover");
        }
        ActionPanel::None => {}
    }
    out
}

pub fn rendering(rendering: &Rendering) -> String {
    match rendering {
        Rendering::Chart(spec) => chart(spec),
        Rendering::Table(view) => table(view),
    }
}

fn table(view: &TableView) -> String {
    let mut out = format!("{}\n", view.title);
    for card in &view.cards {
        let _ = writeln!(out, "  {:<20} {}", card.label, card.value);
    }
    out.push('\n');
    let columns: Vec<&str> = view.detail.columns.iter().map(String::as_str).collect();
    out.push_str(&grid(&columns, &view.detail.rows));
    if let Some(notice) = view.detail.notice() {
        let _ = writeln!(out, "{notice}");
    }
    out
}

fn bar(value: u64, max: u64) -> String {
    let len = if max == 0 { 0 } else { value * BAR_WIDTH / max };
    "#".repeat(len as usize)
}

fn chart(spec: &ChartSpec) -> String {
    let mut out = format!("{} ({})\n", spec.title, spec.kind);
    let max = spec
        .datasets
        .iter()
        .flat_map(|d| d.values.iter().copied())
        .max()
        .unwrap_or(0);
    let label_width = spec.labels.iter().map(|l| l.chars().count()).max().unwrap_or(0);

    match spec.kind {
        ChartKind::Pie | ChartKind::Doughnut => {
            let Some(dataset) = spec.datasets.first() else {
                return out;
            };
            let total: u64 = dataset.values.iter().sum();
            for (label, value) in spec.labels.iter().zip(&dataset.values) {
                let share = if total == 0 {
                    0.0
                } else {
                    *value as f64 * 100.0 / total as f64
                };
                let _ = writeln!(
                    out,
                    "  {label:<label_width$} {value:>6} {share:>5.1}% {}",
                    bar(*value, max)
                );
            }
        }
        ChartKind::Line | ChartKind::GroupedBar => {
            let series_width = spec
                .datasets
                .iter()
                .map(|d| d.label.chars().count())
                .max()
                .unwrap_or(0);
            for (i, label) in spec.labels.iter().enumerate() {
                for (j, dataset) in spec.datasets.iter().enumerate() {
                    let value = dataset.values.get(i).copied().unwrap_or(0);
                    let shown = if j == 0 { label.as_str() } else { "" };
                    let _ = writeln!(
                        out,
                        "  {shown:<label_width$} {:<series_width$} {value:>6} {}",
                        dataset.label,
                        bar(value, max)
                    );
                }
            }
        }
    }
    out
}

/// Left-aligned columns sized to their widest cell.
fn grid(columns: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let _ = writeln!(out, "{}", grid_line(columns, &widths));
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let _ = writeln!(out, "{}", grid_line(&rule[..], &widths));
    for row in rows {
        let _ = writeln!(out, "{}", grid_line(&row[..], &widths));
    }
    out
}

fn grid_line<S: AsRef<str>>(cells: &[S], widths: &[usize]) -> String {
    let mut text = String::new();
    for (cell, width) in cells.iter().zip(widths.iter().copied()) {
        let _ = write!(text, "{:<width$}  ", cell.as_ref());
    }
    text.trim_end().to_string()
}
