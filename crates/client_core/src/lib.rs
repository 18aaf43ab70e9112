//! Client side of the shipment tracker: session handling, the backend API,
//! and the view controllers the front ends drive.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use tracing::info;

pub mod api;
pub mod config;
pub mod contact;
pub mod date_range;
pub mod error;
pub mod render;
pub mod report_query;
pub mod reports;
pub mod session;
pub mod workflow;

pub use api::{ApiClient, ExportedFile, TrackingApi};
pub use config::{load_settings, Settings};
pub use error::{ClientError, ErrorCategory};
pub use reports::ReportView;
pub use session::{FileTokenStore, MemoryTokenStore, SessionError, SessionToken, TokenStore};
pub use workflow::ShipmentWorkflowView;

/// Shared handles for one front end: the API, the token store and settings.
#[derive(Clone)]
pub struct ShipTrackClient {
    settings: Settings,
    api: Arc<dyn TrackingApi>,
    tokens: Arc<dyn TokenStore>,
}

impl ShipTrackClient {
    pub fn from_settings(settings: Settings) -> anyhow::Result<Self> {
        let api = ApiClient::new(settings.base_url()?, settings.request_timeout())
            .context("failed to build http client")?;
        let tokens = FileTokenStore::new(settings.token_path.clone());
        Ok(Self::with_parts(settings, Arc::new(api), Arc::new(tokens)))
    }

    pub fn with_parts(
        settings: Settings,
        api: Arc<dyn TrackingApi>,
        tokens: Arc<dyn TokenStore>,
    ) -> Self {
        Self {
            settings,
            api,
            tokens,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Stores a token issued elsewhere once it decodes to a known role.
    pub fn login(&self, raw: &str) -> Result<SessionToken, ClientError> {
        let session = SessionToken::decode_at(raw.trim(), Utc::now())?;
        self.tokens
            .save(session.raw())
            .map_err(|e| SessionError::InvalidPayload(format!("cannot store token: {e}")))?;
        info!(role = %session.role, "session stored");
        Ok(session)
    }

    pub fn logout(&self) -> std::io::Result<()> {
        self.tokens.clear()
    }

    pub fn session(&self) -> Result<SessionToken, SessionError> {
        let raw = self.tokens.load().ok_or(SessionError::Missing)?;
        SessionToken::decode_at(&raw, Utc::now())
    }

    pub fn shipment_view(&self) -> Arc<ShipmentWorkflowView> {
        ShipmentWorkflowView::with_banner_delay(
            self.api.clone(),
            self.tokens.clone(),
            self.settings.success_banner_delay(),
        )
    }

    pub fn report_view(&self) -> ReportView {
        ReportView::new(self.api.clone(), self.tokens.clone())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::session::encode_test_token;

    fn offline_client(tokens: Arc<dyn TokenStore>) -> ShipTrackClient {
        let settings = Settings {
            api_url: "http://127.0.0.1:9".into(),
            ..Settings::default()
        };
        let api = ApiClient::new(
            settings.base_url().expect("url"),
            settings.request_timeout(),
        )
        .expect("client");
        ShipTrackClient::with_parts(settings, Arc::new(api), tokens)
    }

    #[test]
    fn login_stores_only_decodable_tokens() {
        let tokens = Arc::new(MemoryTokenStore::default());
        let client = offline_client(tokens.clone());

        let err = client.login("not-a-token").expect_err("malformed");
        assert!(err.requires_reauth());
        assert_eq!(tokens.load(), None);

        let raw = encode_test_token(json!({ "id": "u-9", "role": "superAdmin" }));
        let session = client.login(&format!("  {raw}\n")).expect("login");
        assert_eq!(session.role, shared::domain::Role::SuperAdmin);
        assert_eq!(tokens.load().as_deref(), Some(raw.as_str()));
        assert_eq!(client.session().expect("session").user_id, session.user_id);

        client.logout().expect("logout");
        assert!(matches!(client.session(), Err(SessionError::Missing)));
    }

    #[test]
    fn unknown_roles_are_refused_at_login() {
        let client = offline_client(Arc::new(MemoryTokenStore::default()));
        let raw = encode_test_token(json!({ "role": "dispatcher" }));
        let err = client.login(&raw).expect_err("unknown role");
        assert!(matches!(
            err,
            ClientError::Session(SessionError::UnknownRole(_))
        ));
    }
}
