use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use client_core::{
    contact::{ContactField, ContactForm, SubmitError},
    load_settings,
    render::ViewFormat,
    report_query::ReportQuery,
    workflow::DriverAction,
    ClientError, ShipTrackClient, ShipmentWorkflowView,
};
use shared::{
    domain::ShipmentId,
    report::{ExportFormat, ReportKind, TimeRange},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod print;

#[derive(Parser, Debug)]
#[command(name = "shiptrack", about = "Shipment tracking client")]
struct Cli {
    /// Backend base url, overriding shiptrack.toml and the environment.
    #[arg(long, global = true)]
    api_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store a session token issued by the backend.
    Login { token: String },
    Logout,
    Whoami,
    /// Assigned shipments for drivers, the driver roster for staff.
    Shipments {
        #[arg(long)]
        select: Option<String>,
    },
    Pickup {
        shipment_id: String,
        #[arg(long, default_value = "")]
        note: String,
    },
    Handover {
        shipment_id: String,
        #[arg(long, default_value = "")]
        note: String,
    },
    Report {
        #[command(flatten)]
        params: ReportParams,
        #[arg(long, default_value = "table")]
        view: ViewFormat,
    },
    Export {
        #[command(flatten)]
        params: ReportParams,
        #[arg(long, default_value = "pdf")]
        format: ExportFormat,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    Contact {
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long, default_value = "")]
        email: String,
        #[arg(long, default_value = "")]
        phone: String,
        #[arg(long, default_value = "")]
        subject: String,
        #[arg(long, default_value = "")]
        message: String,
    },
}

#[derive(Args, Debug)]
struct ReportParams {
    /// overview, shipments, users or drivers
    kind: ReportKind,
    /// today, week, month, 3months, 6months, year or custom
    #[arg(long, default_value = "month")]
    range: TimeRange,
    #[arg(long)]
    from: Option<NaiveDate>,
    #[arg(long)]
    to: Option<NaiveDate>,
    /// key=value; unknown keys are passed through
    #[arg(long = "filter", value_parser = parse_filter)]
    filters: Vec<(String, String)>,
}

impl ReportParams {
    fn query(&self) -> Result<ReportQuery> {
        let time_range = match self.range {
            TimeRange::Custom { .. } => TimeRange::Custom {
                start: self.from,
                end: self.to,
            },
            _ if self.from.is_some() || self.to.is_some() => {
                bail!("--from/--to need --range custom")
            }
            other => other,
        };
        let mut query = ReportQuery::new(self.kind).with_time_range(time_range);
        for (key, value) in &self.filters {
            query.filters.set(key, value)?;
        }
        Ok(query)
    }
}

fn parse_filter(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let mut settings = load_settings()?;
    if let Some(api_url) = cli.api_url {
        settings.api_url = api_url;
    }
    let client = ShipTrackClient::from_settings(settings)?;

    match cli.command {
        Command::Login { token } => {
            let session = client.login(&token).context("token rejected")?;
            println!("{}", print::session(&session));
        }
        Command::Logout => {
            client.logout().context("failed to remove the stored token")?;
            println!("Logged out");
        }
        Command::Whoami => {
            let session = client
                .session()
                .map_err(|e| anyhow!(ClientError::from(e).user_message("")))?;
            println!("{}", print::session(&session));
        }
        Command::Shipments { select } => {
            let view = client.shipment_view();
            open(&view).await?;
            if let Some(id) = select {
                view.select(&ShipmentId(id))
                    .await
                    .map_err(|e| anyhow!(e.to_string()))?;
            }
            print::workflow(&view.snapshot().await);
        }
        Command::Pickup { shipment_id, note } => {
            run_action(&client, DriverAction::ConfirmPickup, shipment_id, note).await?
        }
        Command::Handover { shipment_id, note } => {
            run_action(&client, DriverAction::RequestHandover, shipment_id, note).await?
        }
        Command::Report { params, view } => {
            let reports = client.report_view();
            reports.set_query(params.query()?).await;
            reports.set_format(view).await;
            if reports.load().await.is_err() {
                bail!(banner(reports.snapshot().await.error));
            }
            match reports.snapshot().await.rendering() {
                Some(rendering) => print!("{}", print::rendering(&rendering)),
                None => println!("No data for this report"),
            }
        }
        Command::Export {
            params,
            format,
            out,
        } => {
            let reports = client.report_view();
            reports.set_query(params.query()?).await;
            let file = match reports.export(format).await {
                Ok(file) => file,
                Err(_) => bail!(banner(reports.snapshot().await.error)),
            };
            tokio::fs::create_dir_all(&out)
                .await
                .with_context(|| format!("cannot create '{}'", out.display()))?;
            let path = out.join(&file.filename);
            tokio::fs::write(&path, &file.bytes)
                .await
                .with_context(|| format!("cannot write '{}'", path.display()))?;
            info!(path = %path.display(), size = file.bytes.len(), "export saved");
            println!("Saved {} ({} bytes)", path.display(), file.bytes.len());
        }
        Command::Contact {
            name,
            email,
            phone,
            subject,
            message,
        } => {
            let mut form = ContactForm::default();
            form.edit(ContactField::Name, name);
            form.edit(ContactField::Email, email);
            form.edit(ContactField::Phone, phone);
            form.edit(ContactField::Subject, subject);
            form.edit(ContactField::Message, message);
            match form.submit().await {
                Ok(()) => println!("Thank you! Your message has been sent."),
                Err(SubmitError::Invalid(errors)) => {
                    for err in &errors {
                        eprintln!("  {}: {err}", err.field());
                    }
                    bail!("the contact form has {} error(s)", errors.len());
                }
                Err(err) => bail!(err),
            }
        }
    }

    Ok(())
}

fn banner(error: Option<String>) -> String {
    error.unwrap_or_else(|| "request failed".to_string())
}

async fn open(view: &ShipmentWorkflowView) -> Result<()> {
    if view.open().await.is_err() {
        bail!(banner(view.snapshot().await.error));
    }
    Ok(())
}

async fn run_action(
    client: &ShipTrackClient,
    action: DriverAction,
    shipment_id: String,
    note: String,
) -> Result<()> {
    let view = client.shipment_view();
    open(&view).await?;
    let shipment = view
        .select(&ShipmentId(shipment_id))
        .await
        .map_err(|e| anyhow!(e.to_string()))?;

    let outcome = match action {
        DriverAction::ConfirmPickup => {
            view.set_pickup_note(note).await;
            view.confirm_pickup().await
        }
        DriverAction::RequestHandover => {
            view.set_handover_note(note).await;
            view.request_handover().await
        }
    };
    let snapshot = view.snapshot().await;
    match outcome {
        Ok(()) => {
            print::workflow(&snapshot);
            Ok(())
        }
        Err(ClientError::ActionNotAllowed { action, status }) => {
            warn!(tracking = %shipment.tracking_number, %status, "action refused locally");
            bail!("{action} is not available for a shipment that is {status}")
        }
        Err(err) => bail!(snapshot.error.unwrap_or_else(|| err.to_string())),
    }
}
