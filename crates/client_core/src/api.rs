//! HTTP access to the shipment-tracking backend.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::{header, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{Driver, ShipmentId, Shipment},
    error::{ApiErrorBody, ApiException},
    protocol::{ActionResponse, DriverList, HandoverRequest, PickupRequest, ShipmentList},
    report::{ExportFormat, ReportKind, ReportResult},
};
use tracing::{debug, warn};
use url::Url;

use crate::{error::ClientError, session::SessionToken};

pub const AUTH_HEADER: &str = "x-auth-token";

/// Export payload handed to the caller untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait TrackingApi: Send + Sync {
    async fn list_drivers(&self, session: &SessionToken) -> Result<Vec<Driver>, ClientError>;
    async fn list_driver_shipments(
        &self,
        session: &SessionToken,
    ) -> Result<Vec<Shipment>, ClientError>;
    async fn request_pickup(
        &self,
        session: &SessionToken,
        shipment_id: &ShipmentId,
        notes: &str,
    ) -> Result<ActionResponse, ClientError>;
    async fn request_handover(
        &self,
        session: &SessionToken,
        shipment_id: &ShipmentId,
        notes: &str,
        branch_location: &str,
    ) -> Result<ActionResponse, ClientError>;
    async fn fetch_report(
        &self,
        session: &SessionToken,
        kind: ReportKind,
        query: &[(String, String)],
    ) -> Result<ReportResult, ClientError>;
    async fn export_report(
        &self,
        session: &SessionToken,
        kind: ReportKind,
        query: &[(String, String)],
        format: ExportFormat,
    ) -> Result<ExportedFile, ClientError>;
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, ClientError> {
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidBaseUrl(base_url.to_string()));
        }
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Appends `segments` to the base path, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authed(&self, builder: RequestBuilder, session: &SessionToken) -> RequestBuilder {
        builder.header(AUTH_HEADER, session.raw())
    }

    async fn checked(builder: RequestBuilder) -> Result<Response, ClientError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.bytes().await.unwrap_or_default();
        let body: ApiErrorBody = serde_json::from_slice(&body).unwrap_or_default();
        let err = ApiException::new(status.as_u16(), &body);
        warn!(status = status.as_u16(), code = ?err.code, "api request failed: {err}");
        Err(err.into())
    }

    async fn json<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, ClientError> {
        let bytes = Self::checked(builder).await?.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Like `json`, but an empty 2xx body is the default value.
    async fn json_or_default<T: DeserializeOwned + Default>(
        builder: RequestBuilder,
    ) -> Result<T, ClientError> {
        let bytes = Self::checked(builder).await?.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(T::default());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl TrackingApi for ApiClient {
    async fn list_drivers(&self, session: &SessionToken) -> Result<Vec<Driver>, ClientError> {
        let url = self.endpoint(&["api", "users", "drivers"])?;
        let drivers: DriverList = Self::json(self.authed(self.http.get(url), session)).await?;
        Ok(drivers.into_vec())
    }

    async fn list_driver_shipments(
        &self,
        session: &SessionToken,
    ) -> Result<Vec<Shipment>, ClientError> {
        let url = self.endpoint(&["api", "shipments", "driver"])?;
        let shipments: ShipmentList = Self::json(self.authed(self.http.get(url), session)).await?;
        Ok(shipments.into_vec())
    }

    async fn request_pickup(
        &self,
        session: &SessionToken,
        shipment_id: &ShipmentId,
        notes: &str,
    ) -> Result<ActionResponse, ClientError> {
        let url = self.endpoint(&[
            "api",
            "shipments",
            "driver",
            shipment_id.as_str(),
            "request-pickup",
        ])?;
        let body = PickupRequest {
            notes: notes.to_string(),
        };
        Self::json_or_default(self.authed(self.http.put(url).json(&body), session)).await
    }

    async fn request_handover(
        &self,
        session: &SessionToken,
        shipment_id: &ShipmentId,
        notes: &str,
        branch_location: &str,
    ) -> Result<ActionResponse, ClientError> {
        let url = self.endpoint(&[
            "api",
            "shipments",
            "driver",
            shipment_id.as_str(),
            "request-handover",
        ])?;
        let body = HandoverRequest {
            notes: notes.to_string(),
            branch_location: branch_location.to_string(),
        };
        Self::json_or_default(self.authed(self.http.put(url).json(&body), session)).await
    }

    async fn fetch_report(
        &self,
        session: &SessionToken,
        kind: ReportKind,
        query: &[(String, String)],
    ) -> Result<ReportResult, ClientError> {
        let url = self.endpoint(&["api", "reports", kind.path_segment()])?;
        debug!(report = %kind, params = query.len(), "fetching report");
        let body: serde_json::Value =
            Self::json(self.authed(self.http.get(url).query(query), session)).await?;
        // Some handlers wrap the aggregate as `{ "success": .., "data": {..} }`.
        let body = match body {
            serde_json::Value::Object(mut map)
                if map.get("data").is_some_and(serde_json::Value::is_object) =>
            {
                map.remove("data").unwrap_or_default()
            }
            other => other,
        };
        Ok(ReportResult::decode(kind, body)?)
    }

    async fn export_report(
        &self,
        session: &SessionToken,
        kind: ReportKind,
        query: &[(String, String)],
        format: ExportFormat,
    ) -> Result<ExportedFile, ClientError> {
        let url = self.endpoint(&["api", "reports", kind.path_segment(), "export"])?;
        let response = Self::checked(self.authed(self.http.get(url).query(query), session)).await?;

        let header_text = |name: header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        let content_type = header_text(header::CONTENT_TYPE);
        let filename = header_text(header::CONTENT_DISPOSITION)
            .as_deref()
            .and_then(filename_from_disposition)
            .unwrap_or_else(|| fallback_filename(kind, format, Utc::now().date_naive()));

        let bytes = response.bytes().await?.to_vec();
        debug!(report = %kind, %filename, size = bytes.len(), "export downloaded");
        Ok(ExportedFile {
            filename,
            content_type,
            bytes,
        })
    }
}

/// `attachment; filename="report.csv"` -> `report.csv`. Path components are stripped.
pub fn filename_from_disposition(value: &str) -> Option<String> {
    let raw = value.split(';').map(str::trim).find_map(|part| {
        let (key, val) = part.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("filename")
            .then(|| val.trim().trim_matches('"'))
    })?;
    let name = raw.rsplit(['/', '\\']).next().unwrap_or(raw).trim();
    (!name.is_empty() && name != "." && name != "..").then(|| name.to_string())
}

pub fn fallback_filename(kind: ReportKind, format: ExportFormat, day: NaiveDate) -> String {
    format!(
        "{}-report-{}.{}",
        kind.path_segment(),
        day.format("%Y-%m-%d"),
        format.extension()
    )
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
