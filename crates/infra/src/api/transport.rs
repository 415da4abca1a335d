//! One HTTP call against the platform, with multi-host failover.
//!
//! The transport walks the store's candidate base URLs in order. Transient
//! failures (5xx, timeouts, refused connections) are retried on the same
//! host with backoff by the underlying [`HttpClient`], then the next host is
//! tried after a fixed pause. Client errors (4xx) are terminal: they come
//! back immediately with no retry and no failover. The transport never
//! touches the store database.

use std::time::Duration;

use cashlink_domain::{CashlinkError, GeneralConfig, Result};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};

use crate::http::HttpClient;

/// Identification headers applied to every request. Caller-supplied headers
/// with these names are dropped, not honored.
const POS_VERSION_HEADER: &str = "pos-version";
const BACKEND_VERSION_HEADER: &str = "backend-version";

/// What one transport call produced.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportOutcome {
    /// Some host answered. 2xx and 4xx both land here; 4xx is terminal by
    /// contract and was returned by the first host that produced it.
    Response { status: u16, body: Value },
    /// Every configured host was exhausted without an HTTP response the
    /// caller could act on. Carries a synthetic unavailable-service status.
    Unavailable { message: String },
}

impl TransportOutcome {
    /// Synthetic unavailable-service status when no host answered.
    pub fn status(&self) -> u16 {
        match self {
            Self::Response { status, .. } => *status,
            Self::Unavailable { .. } => 503,
        }
    }
}

/// Stateless HTTP executor with host failover and protected headers.
pub struct Transport {
    http: HttpClient,
    username: String,
    password: String,
    pos_version: String,
    backend_version: String,
    inter_host_pause: Duration,
}

impl Transport {
    /// Build a transport from the general configuration.
    pub fn new(general: &GeneralConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(general.http_timeout_secs))
            .max_attempts(general.retries_per_host)
            .build()?;

        Ok(Self::from_parts(
            http,
            &general.username,
            &general.password,
            &general.pos_version,
            &general.backend_version,
            Duration::from_millis(general.inter_host_pause_ms),
        ))
    }

    /// Assemble a transport from explicit parts (tests use short pauses).
    pub fn from_parts(
        http: HttpClient,
        username: &str,
        password: &str,
        pos_version: &str,
        backend_version: &str,
        inter_host_pause: Duration,
    ) -> Self {
        Self {
            http,
            username: username.to_string(),
            password: password.to_string(),
            pos_version: pos_version.to_string(),
            backend_version: backend_version.to_string(),
            inter_host_pause,
        }
    }

    /// Execute one call with failover across `base_urls`.
    ///
    /// # Errors
    /// `CashlinkError::Config` when no base URL is configured at all — a
    /// configuration fault, reported distinctly from a runtime transport
    /// failure (which is an `Ok(TransportOutcome::Unavailable)`).
    pub async fn execute(
        &self,
        base_urls: &[String],
        path: &str,
        method: Method,
        body: Option<&Value>,
        extra_headers: &[(String, String)],
    ) -> Result<TransportOutcome> {
        let hosts: Vec<&str> =
            base_urls.iter().map(|url| url.trim()).filter(|url| !url.is_empty()).collect();
        if hosts.is_empty() {
            return Err(CashlinkError::Config("no base URLs configured".into()));
        }

        let headers = filter_protected_headers(extra_headers);
        let mut last_failure = String::new();

        for (index, host) in hosts.iter().enumerate() {
            let final_url = join_url(host, path);
            debug!(host = %host, url = %final_url, "trying host");

            let mut builder = self
                .http
                .request(method.clone(), &final_url)
                .basic_auth(&self.username, Some(&self.password))
                .header(POS_VERSION_HEADER, self.pos_version.as_str())
                .header(BACKEND_VERSION_HEADER, self.backend_version.as_str());
            for (name, value) in &headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some(body) = body {
                builder = builder.json(body);
            }

            match self.http.send(builder).await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_server_error() {
                        // Retries on this host are already spent.
                        last_failure = format!("HTTP {} from {}", status.as_u16(), host);
                        warn!(host = %host, status = status.as_u16(), "host kept failing");
                    } else {
                        let status = status.as_u16();
                        let body = read_body(response).await;
                        return Ok(TransportOutcome::Response { status, body });
                    }
                }
                Err(CashlinkError::Network(message)) => {
                    last_failure = format!("{message} ({host})");
                    warn!(host = %host, error = %message, "host unreachable");
                }
                Err(other) => return Err(other),
            }

            if index + 1 < hosts.len() && !self.inter_host_pause.is_zero() {
                tokio::time::sleep(self.inter_host_pause).await;
            }
        }

        Ok(TransportOutcome::Unavailable {
            message: format!("all configured hosts failed: {last_failure}"),
        })
    }
}

/// Join a base URL and a path with exactly one separating slash.
fn join_url(base: &str, path: &str) -> String {
    let base = base.trim().trim_end_matches('/');
    let path = path.trim().trim_start_matches('/');
    format!("{base}/{path}")
}

/// Drop caller headers that would shadow the identification headers.
fn filter_protected_headers(extra: &[(String, String)]) -> Vec<(String, String)> {
    extra
        .iter()
        .filter(|(name, _)| {
            let protected = name.eq_ignore_ascii_case(POS_VERSION_HEADER)
                || name.eq_ignore_ascii_case(BACKEND_VERSION_HEADER);
            if protected {
                warn!(header = %name, "dropping attempt to override identification header");
            }
            !protected
        })
        .cloned()
        .collect()
}

async fn read_body(response: reqwest::Response) -> Value {
    match response.text().await {
        Ok(text) if text.is_empty() => Value::Null,
        Ok(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        Err(err) => {
            warn!(error = %err, "failed to read response body");
            Value::Null
        }
    }
}
