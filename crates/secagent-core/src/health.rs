//! Post-deploy health check against the Function App's `/api/health` route.

use crate::error::{DeployError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub fn default_health_url(app: &str) -> String {
    format!("https://{app}.azurewebsites.net/api/health")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub url: String,
    pub status: String,
    /// Per-dependency statuses reported by the service (`cosmos_db`, ...).
    #[serde(default)]
    pub components: BTreeMap<String, String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// GET the health endpoint. Non-2xx and transport errors are failures; a
/// 2xx body reporting anything but `healthy` is returned for the caller to
/// surface as a warning.
pub fn check(url: &str, timeout: Duration) -> Result<HealthReport> {
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()?;
    let resp = client.get(url).send()?;
    let status = resp.status();
    let body = resp.text()?;
    if !status.is_success() {
        return Err(DeployError::HttpStatus {
            method: "GET".into(),
            url: url.to_string(),
            status: status.as_u16(),
            body,
        });
    }

    let doc: serde_json::Value = serde_json::from_str(&body).unwrap_or_default();
    let mut components = BTreeMap::new();
    let mut reported = String::from("unknown");
    if let Some(obj) = doc.as_object() {
        for (k, v) in obj {
            let Some(s) = v.as_str() else { continue };
            match k.as_str() {
                "status" => reported = s.to_string(),
                "timestamp" | "service" => {}
                _ => {
                    components.insert(k.clone(), s.to_string());
                }
            }
        }
    }

    tracing::info!(url, status = %reported, "health check finished");
    Ok(HealthReport {
        url: url.to_string(),
        status: reported,
        components,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn healthy_service() {
        let mut server = mockito::Server::new();
        let m = server
            .mock("GET", "/api/health")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"status":"healthy","cosmos_db":"healthy","azure_openai":"healthy","service":"security-incident-processor"}"#,
            )
            .create();

        let report = check(&format!("{}/api/health", server.url()), TIMEOUT).unwrap();
        m.assert();
        assert!(report.is_healthy());
        assert_eq!(report.components.len(), 2);
        assert_eq!(report.components["cosmos_db"], "healthy");
    }

    #[test]
    fn degraded_service_is_not_an_error() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/api/health")
            .with_status(200)
            .with_body(
                r#"{"status":"degraded","cosmos_db":"unhealthy: timeout","azure_openai":"healthy"}"#,
            )
            .create();

        let report = check(&format!("{}/api/health", server.url()), TIMEOUT).unwrap();
        assert!(!report.is_healthy());
        assert_eq!(report.status, "degraded");
        assert_eq!(report.components["cosmos_db"], "unhealthy: timeout");
    }

    #[test]
    fn server_error_carries_body() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/api/health")
            .with_status(500)
            .with_body(r#"{"status":"unhealthy","error":"boom"}"#)
            .create();

        let err = check(&format!("{}/api/health", server.url()), TIMEOUT).unwrap_err();
        match err {
            DeployError::HttpStatus { status, body, .. } => {
                assert_eq!(status, 500);
                assert!(body.contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn default_url_uses_app_host() {
        assert_eq!(
            default_health_url("func-secagent"),
            "https://func-secagent.azurewebsites.net/api/health"
        );
    }
}
