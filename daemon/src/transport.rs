/// Outbound status update call.
///
/// One best-effort `POST` per decided payload: no retries, no queueing.
/// Preconditions (endpoint and key) are checked when the [`StatusUpdate`] is
/// built, so a misconfigured target never reaches the network.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use serde::Serialize;
use thiserror::Error;

use crate::config::SyncConfig;

pub const AUTH_HEADER: &str = "X-Character-Key";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no endpoint configured")]
    MissingEndpoint,
    #[error("invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("no authentication key configured")]
    MissingKey,
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("server answered {0}")]
    Status(u16),
}

/// A validated, ready-to-send update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    endpoint: Url,
    auth_key: String,
    payload: String,
}

#[derive(Serialize)]
struct StatusBody<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    data: MacStatus<'a>,
}

#[derive(Serialize)]
struct MacStatus<'a> {
    mac: &'a str,
}

impl StatusUpdate {
    pub fn new(config: &SyncConfig, payload: impl Into<String>) -> Result<Self, TransportError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or(TransportError::MissingEndpoint)?;
        let auth_key = config
            .auth_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(TransportError::MissingKey)?;

        let url = Url::parse(endpoint).map_err(|e| TransportError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TransportError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: format!("unsupported scheme {:?}", url.scheme()),
            });
        }

        Ok(Self {
            endpoint: url,
            auth_key: auth_key.to_string(),
            payload: payload.into(),
        })
    }

    #[cfg(test)]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    fn body(&self) -> StatusBody<'_> {
        StatusBody {
            kind: "mac",
            data: MacStatus { mac: &self.payload },
        }
    }
}

/// Performs one update call. `Ok` carries the (2xx) status code.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, update: &StatusUpdate) -> Result<u16, TransportError>;
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self::from_client(client))
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, update: &StatusUpdate) -> Result<u16, TransportError> {
        let resp = self
            .client
            .post(update.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(AUTH_HEADER, &update.auth_key)
            .json(&update.body())
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        Ok(status.as_u16())
    }
}
