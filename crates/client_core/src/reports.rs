//! Report parameter state, fetch and export.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use chrono::{DateTime, Local, TimeZone, Utc};
use shared::{
    domain::Role,
    report::{ExportFormat, ReportKind, ReportResult, TimeRange},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{
    api::{ExportedFile, TrackingApi},
    error::ClientError,
    render::{render, Rendering, ViewFormat},
    report_query::ReportQuery,
    session::{SessionError, SessionToken, TokenStore},
    workflow::InFlightGuard,
};

pub const LOAD_FALLBACK: &str = "Failed to load report";
pub const EXPORT_FALLBACK: &str = "Failed to export report";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportEvent {
    Loaded { generation: u64, kind: ReportKind },
    StaleResponseDiscarded { generation: u64 },
    Exported { filename: String, size: usize },
    ErrorShown(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportSnapshot {
    pub query: ReportQuery,
    pub format: ViewFormat,
    pub loading: bool,
    pub exporting: bool,
    pub result: Option<ReportResult>,
    pub error: Option<String>,
}

impl ReportSnapshot {
    pub fn rendering(&self) -> Option<Rendering> {
        self.result
            .as_ref()
            .map(|result| render(result, self.format))
    }
}

struct ReportState {
    query: ReportQuery,
    format: ViewFormat,
    loading: bool,
    result: Option<ReportResult>,
    error: Option<String>,
    latest_load: u64,
}

pub struct ReportView {
    api: Arc<dyn TrackingApi>,
    tokens: Arc<dyn TokenStore>,
    exporting: AtomicBool,
    state: Mutex<ReportState>,
    events: broadcast::Sender<ReportEvent>,
}

impl ReportView {
    pub fn new(api: Arc<dyn TrackingApi>, tokens: Arc<dyn TokenStore>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            api,
            tokens,
            exporting: AtomicBool::new(false),
            state: Mutex::new(ReportState {
                query: ReportQuery::new(ReportKind::Overview),
                format: ViewFormat::default(),
                loading: false,
                result: None,
                error: None,
                latest_load: 0,
            }),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReportEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: ReportEvent) {
        let _ = self.events.send(event);
    }

    /// Replaces the parameters. A load still in flight for the old ones is
    /// discarded when it lands.
    pub async fn set_query(&self, query: ReportQuery) {
        let mut guard = self.state.lock().await;
        if guard.query.kind() != query.kind() {
            guard.result = None;
        }
        guard.query = query;
        guard.latest_load += 1;
        guard.loading = false;
    }

    pub async fn set_kind(&self, kind: ReportKind) {
        let time_range = self.state.lock().await.query.time_range;
        self.set_query(ReportQuery::new(kind).with_time_range(time_range))
            .await;
    }

    pub async fn set_time_range(&self, time_range: TimeRange) {
        let query = self.state.lock().await.query.clone();
        self.set_query(query.with_time_range(time_range)).await;
    }

    pub async fn set_format(&self, format: ViewFormat) {
        self.state.lock().await.format = format;
    }

    pub async fn dismiss_error(&self) {
        self.state.lock().await.error = None;
    }

    pub fn exporting(&self) -> bool {
        self.exporting.load(Ordering::Acquire)
    }

    fn load_session(&self) -> Result<SessionToken, ClientError> {
        let raw = self.tokens.load().ok_or(SessionError::Missing)?;
        let session = SessionToken::decode_at(&raw, Utc::now())?;
        match session.role {
            Role::Admin | Role::SuperAdmin => Ok(session),
            Role::Driver => Err(ClientError::NotPermitted { role: session.role }),
        }
    }

    pub async fn load(&self) -> Result<(), ClientError> {
        self.load_at(&Local::now()).await
    }

    /// Fetches the report for the current parameters with `now` as the range end.
    pub async fn load_at<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Result<(), ClientError>
    where
        Tz::Offset: Send + Sync,
    {
        let prepared = {
            let mut guard = self.state.lock().await;
            guard.latest_load += 1;
            let generation = guard.latest_load;
            let prepared = self
                .load_session()
                .and_then(|session| Ok((session, guard.query.query_pairs(now)?)));
            match prepared {
                Ok((session, pairs)) => {
                    guard.loading = true;
                    Ok((session, pairs, guard.query.kind(), generation))
                }
                Err(err) => {
                    guard.loading = false;
                    guard.result = None;
                    guard.error = Some(err.user_message(LOAD_FALLBACK));
                    Err(err)
                }
            }
        };
        let (session, pairs, kind, generation) = match prepared {
            Ok(prepared) => prepared,
            Err(err) => {
                warn!("report not loaded: {err}");
                self.emit(ReportEvent::ErrorShown(err.user_message(LOAD_FALLBACK)));
                return Err(err);
            }
        };

        debug!(report = %kind, generation, "loading report");
        let result = self.api.fetch_report(&session, kind, &pairs).await;

        let mut guard = self.state.lock().await;
        if generation != guard.latest_load {
            debug!(generation, latest = guard.latest_load, "discarding stale report");
            drop(guard);
            self.emit(ReportEvent::StaleResponseDiscarded { generation });
            return Ok(());
        }
        guard.loading = false;

        match result {
            Ok(report) => {
                guard.result = Some(report);
                guard.error = None;
                drop(guard);
                info!(report = %kind, generation, "report loaded");
                self.emit(ReportEvent::Loaded { generation, kind });
                Ok(())
            }
            Err(err) => {
                let message = err.user_message(LOAD_FALLBACK);
                guard.result = None;
                guard.error = Some(message.clone());
                drop(guard);
                warn!(report = %kind, generation, "report load failed: {err}");
                self.emit(ReportEvent::ErrorShown(message));
                Err(err)
            }
        }
    }

    pub async fn export(&self, format: ExportFormat) -> Result<ExportedFile, ClientError> {
        self.export_at(&Local::now(), format).await
    }

    /// Downloads the current report in `format`. Only one export runs at a time.
    pub async fn export_at<Tz: TimeZone>(
        &self,
        now: &DateTime<Tz>,
        format: ExportFormat,
    ) -> Result<ExportedFile, ClientError>
    where
        Tz::Offset: Send + Sync,
    {
        let _exporting = InFlightGuard::acquire(&self.exporting).ok_or(ClientError::Busy)?;

        let outcome = async {
            let session = self.load_session()?;
            let (kind, pairs) = {
                let guard = self.state.lock().await;
                (guard.query.kind(), guard.query.export_pairs(now, format)?)
            };
            info!(report = %kind, format = format.as_str(), "exporting report");
            self.api.export_report(&session, kind, &pairs, format).await
        }
        .await;

        match outcome {
            Ok(file) => {
                self.emit(ReportEvent::Exported {
                    filename: file.filename.clone(),
                    size: file.bytes.len(),
                });
                Ok(file)
            }
            Err(err) => {
                let message = err.user_message(EXPORT_FALLBACK);
                warn!(format = format.as_str(), "export failed: {err}");
                self.state.lock().await.error = Some(message.clone());
                self.emit(ReportEvent::ErrorShown(message));
                Err(err)
            }
        }
    }

    pub async fn snapshot(&self) -> ReportSnapshot {
        let guard = self.state.lock().await;
        ReportSnapshot {
            query: guard.query.clone(),
            format: guard.format,
            loading: guard.loading,
            exporting: self.exporting(),
            result: guard.result.clone(),
            error: guard.error.clone(),
        }
    }
}

#[cfg(test)]
#[path = "tests/report_tests.rs"]
mod tests;
