//! Role-gated shipment workflow: drivers see their assigned shipments and can
//! confirm pickup or request a branch handover; staff see the driver roster.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use chrono::Utc;
use shared::domain::{Driver, Role, Shipment, ShipmentId, ShipmentStatus};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    api::TrackingApi,
    error::ClientError,
    session::{SessionError, SessionToken, TokenStore, RELOGIN_MESSAGE},
};

pub const DEFAULT_SUCCESS_BANNER_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverAction {
    ConfirmPickup,
    RequestHandover,
}

impl DriverAction {
    fn success_fallback(self) -> &'static str {
        match self {
            DriverAction::ConfirmPickup => "Pickup confirmed successfully",
            DriverAction::RequestHandover => "Handover request sent to branch",
        }
    }

    fn failure_fallback(self) -> &'static str {
        match self {
            DriverAction::ConfirmPickup => "Failed to confirm pickup",
            DriverAction::RequestHandover => "Failed to request handover",
        }
    }
}

impl fmt::Display for DriverAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DriverAction::ConfirmPickup => "Confirm Pickup",
            DriverAction::RequestHandover => "Request Handover to Branch",
        })
    }
}

/// What the detail pane offers for the selected shipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionPanel {
    Pickup,
    Handover,
    AwaitingConfirmation,
    None,
}

impl ActionPanel {
    pub fn action(self) -> Option<DriverAction> {
        match self {
            ActionPanel::Pickup => Some(DriverAction::ConfirmPickup),
            ActionPanel::Handover => Some(DriverAction::RequestHandover),
            ActionPanel::AwaitingConfirmation | ActionPanel::None => None,
        }
    }
}

pub fn action_panel(role: Role, status: ShipmentStatus) -> ActionPanel {
    match role {
        Role::Admin | Role::SuperAdmin => ActionPanel::None,
        Role::Driver => match status {
            ShipmentStatus::InTransit => ActionPanel::Pickup,
            ShipmentStatus::PickedUp => ActionPanel::Handover,
            ShipmentStatus::HandoverRequested => ActionPanel::AwaitingConfirmation,
            ShipmentStatus::Pending
            | ShipmentStatus::Delivered
            | ShipmentStatus::Delayed
            | ShipmentStatus::Cancelled => ActionPanel::None,
        },
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum Listing {
    #[default]
    Empty,
    Shipments(Vec<Shipment>),
    Drivers(Vec<Driver>),
}

impl Listing {
    fn shipment(&self, id: &ShipmentId) -> Option<&Shipment> {
        match self {
            Listing::Shipments(shipments) => shipments.iter().find(|s| &s.id == id),
            Listing::Empty | Listing::Drivers(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Listing::Empty => 0,
            Listing::Shipments(shipments) => shipments.len(),
            Listing::Drivers(drivers) => drivers.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    ListingUpdated { generation: u64, count: usize },
    StaleResponseDiscarded { generation: u64 },
    SelectionChanged(Option<ShipmentId>),
    SuccessShown(String),
    SuccessCleared,
    ErrorShown(String),
}

/// Render-ready copy of the view state.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowSnapshot {
    pub role: Option<Role>,
    pub listing: Listing,
    pub selected: Option<Shipment>,
    pub action_panel: ActionPanel,
    pub pickup_note: String,
    pub handover_note: String,
    pub action_in_flight: bool,
    pub refreshing: bool,
    pub success: Option<String>,
    pub error: Option<String>,
}

#[derive(Default)]
struct WorkflowState {
    session: Option<SessionToken>,
    listing: Listing,
    selected: Option<ShipmentId>,
    pickup_note: String,
    handover_note: String,
    refreshing: bool,
    success: Option<String>,
    error: Option<String>,
    latest_fetch: u64,
    banner_generation: u64,
    banner_timer: Option<JoinHandle<()>>,
}

impl WorkflowState {
    fn selected_shipment(&self) -> Option<&Shipment> {
        self.selected
            .as_ref()
            .and_then(|id| self.listing.shipment(id))
    }
}

/// Holds the single-flight flag for the lifetime of one action.
pub(crate) struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    pub(crate) fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ShipmentWorkflowView {
    api: Arc<dyn TrackingApi>,
    tokens: Arc<dyn TokenStore>,
    banner_delay: Duration,
    action_in_flight: AtomicBool,
    state: Mutex<WorkflowState>,
    events: broadcast::Sender<ViewEvent>,
}

impl ShipmentWorkflowView {
    pub fn new(api: Arc<dyn TrackingApi>, tokens: Arc<dyn TokenStore>) -> Arc<Self> {
        Self::with_banner_delay(api, tokens, DEFAULT_SUCCESS_BANNER_DELAY)
    }

    pub fn with_banner_delay(
        api: Arc<dyn TrackingApi>,
        tokens: Arc<dyn TokenStore>,
        banner_delay: Duration,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            api,
            tokens,
            banner_delay,
            action_in_flight: AtomicBool::new(false),
            state: Mutex::new(WorkflowState::default()),
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ViewEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: ViewEvent) {
        let _ = self.events.send(event);
    }

    /// Decodes the stored session and runs the fetch for its role.
    pub async fn open(&self) -> Result<(), ClientError> {
        let session = match self.load_session() {
            Ok(session) => session,
            Err(err) => {
                warn!("cannot open shipment view: {err}");
                let mut guard = self.state.lock().await;
                guard.session = None;
                guard.listing = Listing::Empty;
                guard.selected = None;
                guard.error = Some(RELOGIN_MESSAGE.to_string());
                drop(guard);
                self.emit(ViewEvent::ErrorShown(RELOGIN_MESSAGE.to_string()));
                return Err(err.into());
            }
        };

        info!(role = %session.role, "opening shipment view");
        self.state.lock().await.session = Some(session);
        self.fetch().await
    }

    fn load_session(&self) -> Result<SessionToken, SessionError> {
        let raw = self.tokens.load().ok_or(SessionError::Missing)?;
        SessionToken::decode_at(&raw, Utc::now())
    }

    /// Re-runs the role's fetch. Opens the view first if needed.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        if self.state.lock().await.session.is_none() {
            return self.open().await;
        }
        self.fetch().await
    }

    async fn fetch(&self) -> Result<(), ClientError> {
        let (session, generation) = {
            let mut guard = self.state.lock().await;
            let session = guard.session.clone().ok_or(SessionError::Missing)?;
            guard.latest_fetch += 1;
            guard.refreshing = true;
            (session, guard.latest_fetch)
        };

        let (result, fallback) = match session.role {
            Role::Driver => (
                self.api
                    .list_driver_shipments(&session)
                    .await
                    .map(Listing::Shipments),
                "Failed to fetch shipments",
            ),
            Role::Admin | Role::SuperAdmin => (
                self.api.list_drivers(&session).await.map(Listing::Drivers),
                "Failed to fetch drivers",
            ),
        };

        let mut guard = self.state.lock().await;
        if generation != guard.latest_fetch {
            debug!(generation, latest = guard.latest_fetch, "discarding stale listing");
            drop(guard);
            self.emit(ViewEvent::StaleResponseDiscarded { generation });
            return Ok(());
        }
        guard.refreshing = false;

        match result {
            Ok(listing) => {
                let count = listing.len();
                guard.listing = listing;
                let lost_selection = guard
                    .selected
                    .as_ref()
                    .is_some_and(|id| guard.listing.shipment(id).is_none());
                if lost_selection {
                    guard.selected = None;
                }
                drop(guard);

                debug!(generation, count, "listing updated");
                self.emit(ViewEvent::ListingUpdated { generation, count });
                if lost_selection {
                    self.emit(ViewEvent::SelectionChanged(None));
                }
                Ok(())
            }
            Err(err) => {
                let message = err.user_message(fallback);
                warn!(generation, "listing fetch failed: {err}");
                guard.error = Some(message.clone());
                drop(guard);
                self.emit(ViewEvent::ErrorShown(message));
                Err(err)
            }
        }
    }

    /// Loads a shipment from the current list into the detail pane.
    pub async fn select(&self, id: &ShipmentId) -> Result<Shipment, ClientError> {
        let mut guard = self.state.lock().await;
        let shipment = guard
            .listing
            .shipment(id)
            .cloned()
            .ok_or_else(|| ClientError::UnknownShipment(id.clone()))?;
        if !shipment.history_is_consistent() {
            warn!(
                tracking = %shipment.tracking_number,
                status = %shipment.status,
                "shipment status differs from its newest tracking event"
            );
        }
        guard.selected = Some(id.clone());
        drop(guard);
        self.emit(ViewEvent::SelectionChanged(Some(id.clone())));
        Ok(shipment)
    }

    pub async fn clear_selection(&self) {
        self.state.lock().await.selected = None;
        self.emit(ViewEvent::SelectionChanged(None));
    }

    pub async fn set_pickup_note(&self, note: impl Into<String>) {
        self.state.lock().await.pickup_note = note.into();
    }

    pub async fn set_handover_note(&self, note: impl Into<String>) {
        self.state.lock().await.handover_note = note.into();
    }

    pub async fn dismiss_error(&self) {
        self.state.lock().await.error = None;
    }

    pub fn action_in_flight(&self) -> bool {
        self.action_in_flight.load(Ordering::Acquire)
    }

    pub async fn confirm_pickup(self: &Arc<Self>) -> Result<(), ClientError> {
        self.run_action(DriverAction::ConfirmPickup).await
    }

    pub async fn request_handover(self: &Arc<Self>) -> Result<(), ClientError> {
        self.run_action(DriverAction::RequestHandover).await
    }

    async fn run_action(self: &Arc<Self>, action: DriverAction) -> Result<(), ClientError> {
        let _in_flight =
            InFlightGuard::acquire(&self.action_in_flight).ok_or(ClientError::Busy)?;

        let (session, shipment, notes) = {
            let mut guard = self.state.lock().await;
            let session = guard.session.clone().ok_or(SessionError::Missing)?;
            if session.role != Role::Driver {
                return Err(ClientError::NotPermitted { role: session.role });
            }
            let shipment = guard
                .selected_shipment()
                .cloned()
                .ok_or(ClientError::NoSelection)?;
            if action_panel(session.role, shipment.status).action() != Some(action) {
                return Err(ClientError::ActionNotAllowed {
                    action,
                    status: shipment.status,
                });
            }
            guard.error = None;
            let notes = match action {
                DriverAction::ConfirmPickup => guard.pickup_note.clone(),
                DriverAction::RequestHandover => guard.handover_note.clone(),
            };
            (session, shipment, notes)
        };

        info!(
            %action,
            tracking = %shipment.tracking_number,
            has_note = !notes.trim().is_empty(),
            "submitting driver action"
        );
        let outcome = match action {
            DriverAction::ConfirmPickup => {
                self.api
                    .request_pickup(&session, &shipment.id, &notes)
                    .await
            }
            DriverAction::RequestHandover => {
                self.api
                    .request_handover(&session, &shipment.id, &notes, &shipment.destination)
                    .await
            }
        };

        match outcome {
            Ok(response) => {
                {
                    let mut guard = self.state.lock().await;
                    match action {
                        DriverAction::ConfirmPickup => guard.pickup_note.clear(),
                        DriverAction::RequestHandover => guard.handover_note.clear(),
                    }
                }
                let message = response
                    .message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| action.success_fallback().to_string());
                self.show_success(message).await;

                // The new status is only visible after a fresh listing.
                if let Err(err) = self.fetch().await {
                    warn!(%action, "refetch after action failed: {err}");
                }
                Ok(())
            }
            Err(err) => {
                let message = err.user_message(action.failure_fallback());
                warn!(%action, tracking = %shipment.tracking_number, "driver action failed: {err}");
                self.state.lock().await.error = Some(message.clone());
                self.emit(ViewEvent::ErrorShown(message));
                Err(err)
            }
        }
    }

    async fn show_success(self: &Arc<Self>, message: String) {
        let mut guard = self.state.lock().await;
        guard.success = Some(message.clone());
        guard.banner_generation += 1;
        let generation = guard.banner_generation;
        if let Some(previous) = guard.banner_timer.take() {
            previous.abort();
        }

        let view: Weak<Self> = Arc::downgrade(self);
        let delay = self.banner_delay;
        guard.banner_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(view) = view.upgrade() {
                view.clear_success(generation).await;
            }
        }));
        drop(guard);
        self.emit(ViewEvent::SuccessShown(message));
    }

    async fn clear_success(&self, generation: u64) {
        let mut guard = self.state.lock().await;
        if guard.banner_generation != generation {
            return;
        }
        guard.success = None;
        guard.banner_timer = None;
        drop(guard);
        self.emit(ViewEvent::SuccessCleared);
    }

    pub async fn snapshot(&self) -> WorkflowSnapshot {
        let guard = self.state.lock().await;
        let role = guard.session.as_ref().map(|session| session.role);
        let selected = guard.selected_shipment().cloned();
        let action_panel = match (role, &selected) {
            (Some(role), Some(shipment)) => action_panel(role, shipment.status),
            _ => ActionPanel::None,
        };
        WorkflowSnapshot {
            role,
            listing: guard.listing.clone(),
            selected,
            action_panel,
            pickup_note: guard.pickup_note.clone(),
            handover_note: guard.handover_note.clone(),
            action_in_flight: self.action_in_flight(),
            refreshing: guard.refreshing,
            success: guard.success.clone(),
            error: guard.error.clone(),
        }
    }
}

impl Drop for ShipmentWorkflowView {
    fn drop(&mut self) {
        if let Some(timer) = self.state.get_mut().banner_timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
#[path = "tests/workflow_tests.rs"]
mod tests;
