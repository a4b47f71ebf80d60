//! Gateway health probing.
//!
//! A probe distinguishes three states: the gateway answered 2xx from its
//! health endpoint (healthy, with whatever report fields it sent), answered
//! with an error status (degraded), or produced no HTTP answer at all
//! (unreachable). Degraded is not unreachable: the process is up but
//! reporting trouble.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

/// Fields the gateway reports from its health endpoint.
///
/// Parsed leniently: a 2xx answer with an unparseable body yields an empty
/// report rather than a failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HealthReport {
    /// Self-reported status string (e.g. "ok").
    #[serde(default)]
    pub status: Option<String>,
    /// Whether the PII firewall is active.
    #[serde(default)]
    pub pii_firewall_enabled: Option<bool>,
    /// PII firewall mode (e.g. "mask").
    #[serde(default)]
    pub pii_firewall_mode: Option<String>,
}

/// Outcome of a health probe.
#[derive(Debug, Clone)]
pub enum HealthStatus {
    /// The health endpoint answered 2xx.
    Healthy(HealthReport),
    /// The health endpoint answered with this non-2xx status code.
    Degraded(u16),
    /// No HTTP answer (connection refused, timeout, DNS failure).
    Unreachable(String),
}

impl HealthStatus {
    /// Returns `true` for [`HealthStatus::Healthy`].
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy(_))
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy(report) => match &report.status {
                Some(status) => write!(f, "healthy ({status})"),
                None => write!(f, "healthy"),
            },
            Self::Degraded(code) => write!(f, "degraded (HTTP {code})"),
            Self::Unreachable(reason) => write!(f, "unreachable: {reason}"),
        }
    }
}

/// Probes the gateway's health endpoint.
#[derive(Debug, Clone)]
pub struct HealthProbe {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HealthProbe {
    /// Create a probe against a gateway base URL.
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self {
            client,
            base_url,
            timeout,
        }
    }

    /// Probe `{base}/health` once.
    ///
    /// Never fails: transport problems come back as
    /// [`HealthStatus::Unreachable`].
    pub async fn check(&self) -> HealthStatus {
        let url = format!("{}/health", self.base_url);
        let resp = match self.client.get(&url).timeout(self.timeout).send().await {
            Ok(resp) => resp,
            Err(e) => {
                debug!(%url, error = %e, "health probe got no answer");
                return classify_send_error(&e);
            }
        };

        let status = resp.status();
        if !status.is_success() {
            return HealthStatus::Degraded(status.as_u16());
        }

        match resp.json::<HealthReport>().await {
            Ok(report) => HealthStatus::Healthy(report),
            Err(e) => {
                debug!(%url, error = %e, "health body did not parse, treating as healthy");
                HealthStatus::Healthy(HealthReport::default())
            }
        }
    }
}

/// Describe a failed send as an unreachable reason.
fn classify_send_error(err: &reqwest::Error) -> HealthStatus {
    let reason = if err.is_timeout() {
        "timed out".to_owned()
    } else if err.is_connect() {
        "connection refused".to_owned()
    } else {
        err.to_string()
    };
    HealthStatus::Unreachable(reason)
}
