//! Health endpoint probing.
//!
//! The service exposes `GET /health` returning
//! `{"status": "...", "model_loaded": bool}`. Missing or unknown
//! fields default rather than error; transport failures and non-200
//! responses collapse to [`Probe::Unreachable`].

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

/// Health endpoint payload, validated at the boundary with defaults
/// for anything the service omits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HealthReport {
    pub status: String,
    pub model_loaded: bool,
}

impl Default for HealthReport {
    fn default() -> Self {
        Self {
            status: "unknown".into(),
            model_loaded: false,
        }
    }
}

/// Outcome of a single health probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// HTTP 200 from the endpoint.
    Ok(HealthReport),
    /// Timeout, connection failure, or a non-200 response.
    Unreachable,
}

impl Probe {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    pub fn model_loaded(&self) -> bool {
        matches!(self, Self::Ok(report) if report.model_loaded)
    }
}

/// Collaborator seam over the health endpoint, so the supervisor can
/// be exercised against a fake in tests.
pub trait HealthProbe {
    fn check(&self, timeout: Duration) -> impl std::future::Future<Output = Probe> + Send;
}

pub struct HttpHealthProbe {
    client: Client,
    url: String,
}

impl HttpHealthProbe {
    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(500))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            url: format!("{}/health", base_url.trim_end_matches('/')),
        }
    }
}

impl HealthProbe for HttpHealthProbe {
    async fn check(&self, timeout: Duration) -> Probe {
        let resp = match self.client.get(&self.url).timeout(timeout).send().await {
            Ok(resp) => resp,
            Err(_) => return Probe::Unreachable,
        };

        if !resp.status().is_success() {
            return Probe::Unreachable;
        }

        // A 200 with an unparseable body still counts as reachable.
        let report = resp.json::<HealthReport>().await.unwrap_or_default();
        Probe::Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_parses_known_fields() {
        let report: HealthReport =
            serde_json::from_str(r#"{"status":"healthy","model_loaded":true}"#).unwrap();
        assert_eq!(report.status, "healthy");
        assert!(report.model_loaded);
    }

    #[test]
    fn report_defaults_missing_fields() {
        let report: HealthReport = serde_json::from_str("{}").unwrap();
        assert_eq!(report.status, "unknown");
        assert!(!report.model_loaded);
    }

    #[test]
    fn report_ignores_unknown_fields() {
        let report: HealthReport =
            serde_json::from_str(r#"{"status":"healthy","uptime_s":12,"model_loaded":false}"#)
                .unwrap();
        assert_eq!(report.status, "healthy");
        assert!(!report.model_loaded);
    }

    #[test]
    fn probe_model_loaded_requires_flag() {
        assert!(!Probe::Unreachable.model_loaded());
        assert!(!Probe::Ok(HealthReport::default()).model_loaded());
        assert!(Probe::Ok(HealthReport {
            status: "healthy".into(),
            model_loaded: true,
        })
        .model_loaded());
    }
}
