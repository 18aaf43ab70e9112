use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    RateLimited,
    Internal,
}

impl ErrorCode {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => ErrorCode::Unauthorized,
            403 => ErrorCode::Forbidden,
            404 => ErrorCode::NotFound,
            400 | 409 | 422 => ErrorCode::Validation,
            429 => ErrorCode::RateLimited,
            _ => ErrorCode::Internal,
        }
    }
}

/// Error body returned by the backend. Handlers use either `message` or `error`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiErrorBody {
    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn server_message(&self) -> Option<&str> {
        [self.message.as_deref(), self.error.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|m| !m.is_empty())
    }
}

#[derive(Debug, Clone, Error)]
#[error("{code:?} ({status}): {}", .message.as_deref().unwrap_or("no message"))]
pub struct ApiException {
    pub code: ErrorCode,
    pub status: u16,
    pub message: Option<String>,
}

impl ApiException {
    pub fn new(status: u16, body: &ApiErrorBody) -> Self {
        Self {
            code: ErrorCode::from_status(status),
            status,
            message: body.server_message().map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_message_prefers_message_then_error() {
        let body: ApiErrorBody =
            serde_json::from_str(r#"{"message":"  ","error":"Shipment not found"}"#)
                .expect("decode");
        assert_eq!(body.server_message(), Some("Shipment not found"));

        let body = ApiErrorBody::with_message("Not assigned to you");
        assert_eq!(body.server_message(), Some("Not assigned to you"));

        assert_eq!(ApiErrorBody::default().server_message(), None);
    }

    #[test]
    fn maps_http_status_to_code() {
        let err = ApiException::new(403, &ApiErrorBody::default());
        assert_eq!(err.code, ErrorCode::Forbidden);
        assert_eq!(err.message, None);
        assert_eq!(ErrorCode::from_status(502), ErrorCode::Internal);
    }
}
