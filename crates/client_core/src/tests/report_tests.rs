use std::{collections::VecDeque, time::Duration};

use async_trait::async_trait;
use chrono::TimeZone;
use serde_json::json;
use shared::{
    domain::{Driver, Shipment, ShipmentId, ShipmentStatus},
    error::{ApiErrorBody, ApiException},
    protocol::ActionResponse,
    report::{OverviewReport, ShipmentsReport, StatusCount},
};
use tokio::sync::Notify;

use super::*;
use crate::session::{encode_test_token, MemoryTokenStore};

type Scripted = (Duration, Result<ReportResult, (u16, Option<String>)>);

#[derive(Default)]
struct MockReports {
    responses: Mutex<VecDeque<Scripted>>,
    fetches: Mutex<Vec<(ReportKind, Vec<(String, String)>)>>,
    exports: Mutex<Vec<(ReportKind, Vec<(String, String)>, ExportFormat)>>,
    export_failure: Option<(u16, Option<String>)>,
    export_gate: Option<Arc<Notify>>,
}

impl MockReports {
    fn scripted(responses: Vec<Scripted>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Self::default()
        }
    }
}

fn api_error(status: u16, message: Option<String>) -> ClientError {
    ApiException::new(
        status,
        &ApiErrorBody {
            message,
            error: None,
        },
    )
    .into()
}

#[async_trait]
impl TrackingApi for MockReports {
    async fn list_drivers(&self, _session: &SessionToken) -> Result<Vec<Driver>, ClientError> {
        unreachable!("report view never lists drivers")
    }

    async fn list_driver_shipments(
        &self,
        _session: &SessionToken,
    ) -> Result<Vec<Shipment>, ClientError> {
        unreachable!("report view never lists shipments")
    }

    async fn request_pickup(
        &self,
        _session: &SessionToken,
        _shipment_id: &ShipmentId,
        _notes: &str,
    ) -> Result<ActionResponse, ClientError> {
        unreachable!()
    }

    async fn request_handover(
        &self,
        _session: &SessionToken,
        _shipment_id: &ShipmentId,
        _notes: &str,
        _branch_location: &str,
    ) -> Result<ActionResponse, ClientError> {
        unreachable!()
    }

    async fn fetch_report(
        &self,
        _session: &SessionToken,
        kind: ReportKind,
        query: &[(String, String)],
    ) -> Result<ReportResult, ClientError> {
        self.fetches.lock().await.push((kind, query.to_vec()));
        let (delay, outcome) = self
            .responses
            .lock()
            .await
            .pop_front()
            .expect("unexpected report fetch");
        tokio::time::sleep(delay).await;
        outcome.map_err(|(status, message)| api_error(status, message))
    }

    async fn export_report(
        &self,
        _session: &SessionToken,
        kind: ReportKind,
        query: &[(String, String)],
        format: ExportFormat,
    ) -> Result<ExportedFile, ClientError> {
        if let Some(gate) = &self.export_gate {
            gate.notified().await;
        }
        self.exports
            .lock()
            .await
            .push((kind, query.to_vec(), format));
        if let Some((status, message)) = &self.export_failure {
            return Err(api_error(*status, message.clone()));
        }
        Ok(ExportedFile {
            filename: "shipments.xlsx".into(),
            content_type: Some("application/octet-stream".into()),
            bytes: vec![0x50, 0x4b, 0x03, 0x04],
        })
    }
}

fn tokens_for(role: &str) -> Arc<dyn TokenStore> {
    Arc::new(MemoryTokenStore::with_token(encode_test_token(
        json!({ "id": "user-1", "role": role }),
    )))
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 15, 12, 0, 0).unwrap()
}

fn overview() -> ReportResult {
    ReportResult::Overview(OverviewReport {
        total_shipments: 12,
        ..OverviewReport::default()
    })
}

fn shipments(total: u64) -> ReportResult {
    ReportResult::Shipments(ShipmentsReport {
        total,
        by_status: vec![StatusCount {
            status: ShipmentStatus::Delivered,
            count: total,
        }],
        shipments: Vec::new(),
    })
}

fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
async fn load_sends_derived_range_and_non_empty_filters() {
    let api = Arc::new(MockReports::scripted(vec![(Duration::ZERO, Ok(shipments(3)))]));
    let view = ReportView::new(api.clone(), tokens_for("admin"));

    let mut query = ReportQuery::new(ReportKind::Shipments);
    query.filters.set("origin", "Paris").expect("origin");
    query.filters.set("destination", "").expect("destination");
    query.filters.set("carrier", "acme").expect("extra");
    view.set_query(query).await;

    view.load_at(&now()).await.expect("load");

    let fetches = api.fetches.lock().await;
    assert_eq!(fetches.len(), 1);
    assert_eq!(fetches[0].0, ReportKind::Shipments);
    assert_eq!(
        fetches[0].1,
        pairs(&[
            ("startDate", "2024-04-15T12:00:00.000Z"),
            ("endDate", "2024-05-15T12:00:00.000Z"),
            ("origin", "Paris"),
            ("carrier", "acme"),
        ])
    );

    let snapshot = view.snapshot().await;
    assert!(!snapshot.loading);
    assert_eq!(snapshot.result, Some(shipments(3)));
    assert_eq!(snapshot.error, None);
}

#[tokio::test]
async fn drivers_cannot_load_reports() {
    let api = Arc::new(MockReports::default());
    let view = ReportView::new(api.clone(), tokens_for("driver"));

    let err = view.load_at(&now()).await.expect_err("driver");
    assert!(matches!(err, ClientError::NotPermitted { role: Role::Driver }));
    assert!(api.fetches.lock().await.is_empty());
    assert!(view.snapshot().await.error.is_some());
}

#[tokio::test]
async fn missing_token_asks_for_login() {
    let api = Arc::new(MockReports::default());
    let view = ReportView::new(api.clone(), Arc::new(MemoryTokenStore::default()));

    let err = view.load_at(&now()).await.expect_err("no token");
    assert!(err.requires_reauth());
    assert_eq!(
        view.snapshot().await.error.as_deref(),
        Some(crate::session::RELOGIN_MESSAGE)
    );
}

#[tokio::test]
async fn failure_clears_the_previous_result() {
    let api = Arc::new(MockReports::scripted(vec![
        (Duration::ZERO, Ok(overview())),
        (Duration::ZERO, Err((500, Some("database unavailable".into())))),
        (Duration::ZERO, Err((502, None))),
    ]));
    let view = ReportView::new(api, tokens_for("superAdmin"));

    view.load_at(&now()).await.expect("first load");
    assert_eq!(view.snapshot().await.result, Some(overview()));

    view.load_at(&now()).await.expect_err("server message");
    let snapshot = view.snapshot().await;
    assert_eq!(snapshot.result, None);
    assert_eq!(snapshot.error.as_deref(), Some("database unavailable"));

    view.load_at(&now()).await.expect_err("fallback");
    assert_eq!(
        view.snapshot().await.error.as_deref(),
        Some(LOAD_FALLBACK)
    );
}

#[tokio::test]
async fn incomplete_or_inverted_custom_range_never_fetches() {
    let api = Arc::new(MockReports::scripted(vec![(Duration::ZERO, Ok(overview()))]));
    let view = ReportView::new(api.clone(), tokens_for("admin"));
    view.load_at(&now()).await.expect("load");

    let day = |d| chrono::NaiveDate::from_ymd_opt(2024, 5, d);
    view.set_time_range(TimeRange::Custom {
        start: None,
        end: day(10),
    })
    .await;
    let err = view.load_at(&now()).await.expect_err("missing start");
    assert!(matches!(
        err,
        ClientError::DateRange(crate::date_range::DateRangeError::MissingCustomStart)
    ));
    assert_eq!(view.snapshot().await.result, None);

    view.set_time_range(TimeRange::Custom {
        start: day(12),
        end: day(10),
    })
    .await;
    let err = view.load_at(&now()).await.expect_err("inverted");
    assert!(matches!(
        err,
        ClientError::DateRange(crate::date_range::DateRangeError::InvertedCustomRange { .. })
    ));

    assert_eq!(api.fetches.lock().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn response_for_superseded_parameters_is_discarded() {
    let api = Arc::new(MockReports::scripted(vec![
        (Duration::from_millis(500), Ok(overview())),
        (Duration::from_millis(10), Ok(shipments(7))),
    ]));
    let view = Arc::new(ReportView::new(api, tokens_for("admin")));
    let mut events = view.subscribe();

    let slow = tokio::spawn({
        let view = view.clone();
        async move { view.load_at(&now()).await }
    });
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(view.snapshot().await.loading);

    view.set_kind(ReportKind::Shipments).await;
    view.load_at(&now()).await.expect("fresh load");
    slow.await.expect("join").expect("stale load is not an error");

    let snapshot = view.snapshot().await;
    assert_eq!(snapshot.result, Some(shipments(7)));
    assert!(!snapshot.loading);

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert_eq!(
        seen,
        vec![
            ReportEvent::Loaded {
                generation: 3,
                kind: ReportKind::Shipments
            },
            ReportEvent::StaleResponseDiscarded { generation: 1 },
        ]
    );
}

#[tokio::test]
async fn export_appends_format_and_returns_bytes_untouched() {
    let api = Arc::new(MockReports::default());
    let view = ReportView::new(api.clone(), tokens_for("admin"));
    view.set_kind(ReportKind::Shipments).await;
    view.set_time_range(TimeRange::Week).await;

    let file = view
        .export_at(&now(), ExportFormat::Excel)
        .await
        .expect("export");
    assert_eq!(file.filename, "shipments.xlsx");
    assert_eq!(file.bytes, vec![0x50, 0x4b, 0x03, 0x04]);

    let exports = api.exports.lock().await;
    assert_eq!(exports[0].0, ReportKind::Shipments);
    assert_eq!(exports[0].2, ExportFormat::Excel);
    assert_eq!(
        exports[0].1,
        pairs(&[
            ("startDate", "2024-05-08T12:00:00.000Z"),
            ("endDate", "2024-05-15T12:00:00.000Z"),
            ("format", "excel"),
        ])
    );
    assert!(!view.exporting());
}

#[tokio::test]
async fn concurrent_export_is_rejected_while_one_is_running() {
    let gate = Arc::new(Notify::new());
    let api = Arc::new(MockReports {
        export_gate: Some(gate.clone()),
        ..MockReports::default()
    });
    let view = Arc::new(ReportView::new(api.clone(), tokens_for("admin")));

    let first = tokio::spawn({
        let view = view.clone();
        async move { view.export_at(&now(), ExportFormat::Csv).await }
    });
    while !view.exporting() {
        tokio::task::yield_now().await;
    }

    let err = view
        .export_at(&now(), ExportFormat::Pdf)
        .await
        .expect_err("busy");
    assert!(matches!(err, ClientError::Busy));

    gate.notify_one();
    first.await.expect("join").expect("first export");
    assert!(!view.exporting());
    assert_eq!(api.exports.lock().await.len(), 1);
}

#[tokio::test]
async fn export_failure_keeps_the_displayed_result() {
    let api = Arc::new(MockReports {
        responses: Mutex::new(VecDeque::from([(Duration::ZERO, Ok(overview()))])),
        export_failure: Some((500, None)),
        ..MockReports::default()
    });
    let view = ReportView::new(api, tokens_for("admin"));
    view.load_at(&now()).await.expect("load");

    view.export_at(&now(), ExportFormat::Pdf)
        .await
        .expect_err("export fails");
    let snapshot = view.snapshot().await;
    assert_eq!(snapshot.error.as_deref(), Some(EXPORT_FALLBACK));
    assert_eq!(snapshot.result, Some(overview()));
    assert!(!snapshot.exporting);
}

#[tokio::test]
async fn snapshot_renders_in_the_selected_format() {
    let api = Arc::new(MockReports::scripted(vec![(Duration::ZERO, Ok(shipments(2)))]));
    let view = ReportView::new(api, tokens_for("admin"));
    view.set_kind(ReportKind::Shipments).await;
    view.load_at(&now()).await.expect("load");

    assert!(matches!(
        view.snapshot().await.rendering(),
        Some(Rendering::Chart(_))
    ));
    view.set_format(ViewFormat::Table).await;
    let Some(Rendering::Table(table)) = view.snapshot().await.rendering() else {
        panic!("expected a table");
    };
    assert_eq!(table.detail.total, 0);
    assert_eq!(table.cards[0].value, "2");
}
