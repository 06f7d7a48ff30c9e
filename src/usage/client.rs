//! HTTP client for the Claude usage endpoint.
//!
//! Two calls are used:
//!
//! - `GET api/organizations` lists the organizations visible to a session
//!   key. It doubles as session key validation.
//! - `GET api/organizations/{org_id}/usage` returns the current quota
//!   windows.
//!
//! Both authenticate with a `Cookie: sessionKey=...` header.

use super::error::UsageError;
use super::fetcher::UsageFetcher;
use super::types::{UsageMetric, UsageSnapshot};
use crate::config::ApiConfig;
use crate::credentials::{CredentialStore, session_cookie};
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://claude.ai";

const EMPTY_BODY_MESSAGE: &str = "Empty response body";

/// An organization the session key can see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub uuid: String,
    #[serde(default)]
    pub name: String,
}

/// Usage endpoint client.
pub struct ClaudeUsageClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Arc<dyn CredentialStore>,
}

impl ClaudeUsageClient {
    /// Build a client from API settings.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Http`] if the underlying client cannot be built.
    pub fn new(config: &ApiConfig, credentials: Arc<dyn CredentialStore>) -> Result<Self> {
        let connect = Duration::from_secs(config.connect_timeout_secs);
        let read = Duration::from_secs(config.read_timeout_secs);
        let http = reqwest::Client::builder()
            .connect_timeout(connect)
            .read_timeout(read)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| SyncError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            credentials,
        })
    }

    /// Point the client at a different API root (used by tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// List organizations visible to `session_key`.
    pub async fn fetch_organizations(
        &self,
        session_key: &str,
    ) -> std::result::Result<Vec<Organization>, UsageError> {
        let url = format!("{}/api/organizations", self.base_url);
        tracing::debug!("GET {url}");
        let response = self
            .http
            .get(&url)
            .header(reqwest::header::COOKIE, session_cookie(session_key))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;
        read_json(response).await
    }

    /// Check a session key against the server.
    ///
    /// Succeeds with the organizations the key can see.
    pub async fn validate_session_key(
        &self,
        session_key: &str,
    ) -> std::result::Result<Vec<Organization>, UsageError> {
        self.fetch_organizations(session_key).await
    }
}

#[async_trait]
impl UsageFetcher for ClaudeUsageClient {
    async fn fetch_usage(&self) -> std::result::Result<UsageSnapshot, UsageError> {
        let Some(creds) = self.credentials.load() else {
            return Err(UsageError::NoCredentials);
        };
        let url = format!(
            "{}/api/organizations/{}/usage",
            self.base_url, creds.org_id
        );
        tracing::debug!("GET {url}");
        let response = self
            .http
            .get(&url)
            .header(reqwest::header::COOKIE, creds.cookie())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;
        let body: UsageResponse = read_json(response).await?;
        Ok(body.into_snapshot(Utc::now()))
    }
}

// ── Helpers ────────────────────────────────────────────────────

fn classify_transport_error(err: &reqwest::Error) -> UsageError {
    if err.is_decode() {
        UsageError::Unknown(format!("decode error: {err}"))
    } else {
        tracing::debug!("transport error: {err}");
        UsageError::NetworkError
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> std::result::Result<T, UsageError> {
    let status = response.status();
    let code = status.as_u16();
    if !status.is_success() {
        let reason = status.canonical_reason().map(str::to_owned);
        return Err(UsageError::from_status(code, reason));
    }
    let text = response
        .text()
        .await
        .map_err(|e| classify_transport_error(&e))?;
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Err(UsageError::ServerError {
            code,
            message: Some(EMPTY_BODY_MESSAGE.to_owned()),
        });
    }
    serde_json::from_str(trimmed).map_err(|e| UsageError::Unknown(format!("bad response: {e}")))
}

// ── Wire format ────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct UsageResponse {
    #[serde(default)]
    five_hour: Option<MetricDto>,
    #[serde(default)]
    seven_day: Option<MetricDto>,
    #[serde(default)]
    seven_day_opus: Option<MetricDto>,
    #[serde(default)]
    seven_day_sonnet: Option<MetricDto>,
}

impl UsageResponse {
    fn into_snapshot(self, fetched_at: DateTime<Utc>) -> UsageSnapshot {
        UsageSnapshot {
            five_hour: self.five_hour.map(MetricDto::into_metric),
            seven_day: self.seven_day.map(MetricDto::into_metric),
            seven_day_opus: self.seven_day_opus.map(MetricDto::into_metric),
            seven_day_sonnet: self.seven_day_sonnet.map(MetricDto::into_metric),
            fetched_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MetricDto {
    #[serde(default, deserialize_with = "deserialize_utilization")]
    utilization: f64,
    #[serde(default)]
    resets_at: Option<String>,
}

impl MetricDto {
    fn into_metric(self) -> UsageMetric {
        let resets_at = self.resets_at.as_deref().and_then(parse_timestamp);
        UsageMetric::new(self.utilization, resets_at)
    }
}

/// Utilization arrives as a number, a numeric string, or null.
fn deserialize_utilization<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(parsed.filter(|v| v.is_finite()).unwrap_or(0.0))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(raw.trim()) {
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(e) => {
            tracing::debug!("ignoring unparseable resets_at {raw:?}: {e}");
            None
        }
    }
}
