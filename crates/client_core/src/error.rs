//! Error type shared by the API client and the view controllers.

use shared::{
    domain::{Role, ShipmentId, ShipmentStatus},
    error::{ApiException, ErrorCode},
};
use thiserror::Error;

use crate::{
    date_range::DateRangeError,
    session::{SessionError, RELOGIN_MESSAGE},
    workflow::DriverAction,
};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Api(#[from] ApiException),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    DateRange(#[from] DateRangeError),
    #[error("base url '{0}' cannot carry api paths")]
    InvalidBaseUrl(String),
    #[error("another request is already in progress")]
    Busy,
    #[error("no shipment selected")]
    NoSelection,
    #[error("shipment {0} is not in the current list")]
    UnknownShipment(ShipmentId),
    #[error("role '{role}' cannot perform this operation")]
    NotPermitted { role: Role },
    #[error("{action} is not available while the shipment is '{status}'")]
    ActionNotAllowed {
        action: DriverAction,
        status: ShipmentStatus,
    },
}

/// Coarse grouping used to pick the banner text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Auth,
    Api,
    Validation,
    Transport,
}

impl ClientError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ClientError::Session(_) => ErrorCategory::Auth,
            ClientError::Api(err) if err.code == ErrorCode::Unauthorized => ErrorCategory::Auth,
            ClientError::Api(_) | ClientError::Decode(_) => ErrorCategory::Api,
            ClientError::Transport(_) | ClientError::InvalidBaseUrl(_) => ErrorCategory::Transport,
            ClientError::DateRange(_)
            | ClientError::Busy
            | ClientError::NoSelection
            | ClientError::UnknownShipment(_)
            | ClientError::NotPermitted { .. }
            | ClientError::ActionNotAllowed { .. } => ErrorCategory::Validation,
        }
    }

    pub fn requires_reauth(&self) -> bool {
        self.category() == ErrorCategory::Auth
    }

    /// Banner text: the fixed re-login message for session problems, the
    /// server's message when it sent one, otherwise `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ClientError::Session(_) => RELOGIN_MESSAGE.to_string(),
            ClientError::Api(err) => match &err.message {
                Some(message) => message.clone(),
                None if err.code == ErrorCode::Unauthorized => RELOGIN_MESSAGE.to_string(),
                None => fallback.to_string(),
            },
            ClientError::Transport(_) | ClientError::Decode(_) | ClientError::InvalidBaseUrl(_) => {
                fallback.to_string()
            }
            other => other.to_string(),
        }
    }
}
