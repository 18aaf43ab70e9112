//! Session token decoding and storage.
//!
//! The token is a three-segment, dot-separated string whose middle segment is
//! base64-encoded JSON. Only the payload is read here; the signature is the
//! server's concern.

use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Mutex,
};

use base64::{
    engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD},
    Engine as _,
};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use shared::domain::{Role, UnknownRole, UserId};
use thiserror::Error;
use tracing::warn;

pub const RELOGIN_MESSAGE: &str = "Session expired or invalid, please login again";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("no session token stored")]
    Missing,
    #[error("session token must have three dot-separated segments")]
    Malformed,
    #[error("session token payload is invalid: {0}")]
    InvalidPayload(String),
    #[error(transparent)]
    UnknownRole(#[from] UnknownRole),
    #[error("session token expired at {0}")]
    Expired(DateTime<Utc>),
}

const ID_CLAIMS: [&str; 3] = ["id", "userId", "_id"];

/// Payload claims, with identity optionally nested under `user`.
struct Claims<'a> {
    top: &'a Map<String, Value>,
    user: Option<&'a Map<String, Value>>,
}

impl<'a> Claims<'a> {
    fn new(top: &'a Map<String, Value>) -> Self {
        Self {
            top,
            user: top.get("user").and_then(Value::as_object),
        }
    }

    /// First non-null value for `key`, top level before `user`.
    fn get(&self, key: &str) -> Option<&'a Value> {
        let present = |map: &'a Map<String, Value>| map.get(key).filter(|v| !v.is_null());
        present(self.top).or_else(|| self.user.and_then(present))
    }

    fn role(&self) -> Result<Role, SessionError> {
        match self.get("role") {
            Some(Value::String(role)) => Ok(role.parse()?),
            Some(other) => Err(SessionError::InvalidPayload(format!(
                "role claim must be a string, got {other}"
            ))),
            None => Err(SessionError::InvalidPayload("missing role claim".into())),
        }
    }

    /// Ids may be strings or numbers; the first usable one wins.
    fn user_id(&self) -> Option<UserId> {
        let usable = |map: &'a Map<String, Value>| {
            ID_CLAIMS.iter().find_map(|key| match map.get(*key)? {
                Value::String(id) if !id.trim().is_empty() => Some(id.trim().to_string()),
                Value::Number(id) => Some(id.to_string()),
                _ => None,
            })
        };
        usable(self.top)
            .or_else(|| self.user.and_then(usable))
            .map(UserId)
    }

    fn name(&self) -> Option<String> {
        self.get("name").and_then(Value::as_str).map(str::to_string)
    }

    fn expires_at(&self) -> Result<Option<DateTime<Utc>>, SessionError> {
        let Some(Value::Number(exp)) = self.get("exp") else {
            return Ok(None);
        };
        let seconds = exp
            .as_i64()
            .or_else(|| exp.as_f64().map(|secs| secs as i64));
        seconds
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .map(Some)
            .ok_or_else(|| SessionError::InvalidPayload(format!("bad exp {exp}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    raw: String,
    pub role: Role,
    pub user_id: Option<UserId>,
    pub name: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl SessionToken {
    pub fn decode(raw: &str) -> Result<Self, SessionError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(SessionError::Missing);
        }

        let segments: Vec<&str> = raw.split('.').collect();
        let [_, payload, _] = segments.as_slice() else {
            return Err(SessionError::Malformed);
        };
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(SessionError::Malformed);
        }

        let bytes = decode_segment(payload)?;
        let payload: Value = serde_json::from_slice(&bytes)
            .map_err(|e| SessionError::InvalidPayload(e.to_string()))?;
        let Some(object) = payload.as_object() else {
            return Err(SessionError::InvalidPayload(
                "payload is not a JSON object".into(),
            ));
        };

        let claims = Claims::new(object);
        let role = claims.role()?;
        let user_id = claims.user_id();
        let name = claims.name();
        let expires_at = claims.expires_at()?;

        Ok(Self {
            raw: raw.to_string(),
            role,
            user_id,
            name,
            expires_at,
        })
    }

    /// Decodes and rejects tokens whose `exp` is not after `now`.
    pub fn decode_at(raw: &str, now: DateTime<Utc>) -> Result<Self, SessionError> {
        let token = Self::decode(raw)?;
        match token.expires_at {
            Some(expires_at) if expires_at <= now => Err(SessionError::Expired(expires_at)),
            _ => Ok(token),
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }
}

fn decode_segment(segment: &str) -> Result<Vec<u8>, SessionError> {
    let unpadded = segment.trim_end_matches('=');
    URL_SAFE_NO_PAD
        .decode(unpadded)
        .or_else(|_| STANDARD_NO_PAD.decode(unpadded))
        .map_err(|e| SessionError::InvalidPayload(format!("payload is not base64: {e}")))
}

/// Where the session token lives between runs.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Option<String>;
    fn save(&self, token: &str) -> io::Result<()>;
    fn clear(&self) -> io::Result<()>;
}

pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Option<String> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => {
                let token = raw.trim();
                (!token.is_empty()).then(|| token.to_string())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => {
                warn!(path = %self.path.display(), "failed to read session token: {err}");
                None
            }
        }
    }

    fn save(&self, token: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, token.trim())
    }

    fn clear(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<String> {
        self.token.lock().ok().and_then(|guard| guard.clone())
    }

    fn save(&self, token: &str) -> io::Result<()> {
        if let Ok(mut guard) = self.token.lock() {
            *guard = Some(token.to_string());
        }
        Ok(())
    }

    fn clear(&self) -> io::Result<()> {
        if let Ok(mut guard) = self.token.lock() {
            *guard = None;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn encode_test_token(payload: serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{body}.c2lnbmF0dXJl")
}
