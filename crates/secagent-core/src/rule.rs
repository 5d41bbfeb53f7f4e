//! Sentinel automation rule submission.
//!
//! A rule is authored locally as JSON, upserted through the management API,
//! then fetched back once after a fixed delay to confirm the display name was
//! persisted. A mismatch on that read-back is reported, not raised: the PUT
//! already succeeded and is authoritative.

use crate::az::{self, AzRunner};
use crate::error::{DeployError, Result};
use crate::paths::validate_name;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";
pub const DEFAULT_API_VERSION: &str = "2023-02-01";
pub const DEFAULT_VALIDATE_DELAY_SECS: u64 = 5;
const MAX_ORDER: u32 = 1000;

// ---------------------------------------------------------------------------
// AutomationRule
// ---------------------------------------------------------------------------

/// The recognised fields of a local rule file. Anything else in the file is
/// dropped when the payload is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationRule {
    pub display_name: String,
    pub order: u32,
    pub triggering_logic: Value,
    pub actions: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl AutomationRule {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(DeployError::RuleFileNotFound(path.display().to_string()));
        }
        let data = std::fs::read_to_string(path)?;
        let rule: AutomationRule =
            serde_json::from_str(&data).map_err(|source| DeployError::RuleParse {
                path: path.display().to_string(),
                source,
            })?;
        rule.validate()?;
        Ok(rule)
    }

    pub fn validate(&self) -> Result<()> {
        if self.display_name.trim().is_empty() {
            return Err(DeployError::InvalidRule("displayName is empty".into()));
        }
        if self.order == 0 || self.order > MAX_ORDER {
            return Err(DeployError::InvalidRule(format!(
                "order {} is outside 1..={MAX_ORDER}",
                self.order
            )));
        }
        if self.actions.is_empty() {
            return Err(DeployError::InvalidRule("actions is empty".into()));
        }
        Ok(())
    }

    /// `{"properties": {...}}` as the management API expects.
    pub fn payload(&self) -> Value {
        let mut props = json!({
            "displayName": self.display_name,
            "order": self.order,
            "triggeringLogic": self.triggering_logic,
            "actions": self.actions,
        });
        if let Some(desc) = &self.description {
            props["description"] = Value::String(desc.clone());
        }
        json!({ "properties": props })
    }
}

// ---------------------------------------------------------------------------
// RuleTarget
// ---------------------------------------------------------------------------

/// Where a rule lives: subscription, resource group, workspace and rule id.
#[derive(Debug, Clone)]
pub struct RuleTarget {
    pub endpoint: String,
    pub subscription_id: String,
    pub resource_group: String,
    pub workspace: String,
    pub rule_id: String,
    pub api_version: String,
}

impl RuleTarget {
    pub fn url(&self) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.OperationalInsights/workspaces/{}/providers/Microsoft.SecurityInsights/automationRules/{}?api-version={}",
            self.endpoint.trim_end_matches('/'),
            self.subscription_id,
            self.resource_group,
            self.workspace,
            self.rule_id,
            self.api_version,
        )
    }
}

/// A caller-supplied rule id, or a fresh UUID.
pub fn rule_id_or_generate(explicit: Option<&str>) -> Result<String> {
    match explicit {
        Some(id) => {
            validate_name(id)?;
            Ok(id.to_string())
        }
        None => Ok(uuid::Uuid::new_v4().to_string()),
    }
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

pub trait TokenSource {
    fn token(&self) -> Result<String>;
}

/// A token handed in by the caller (flag or environment).
pub struct StaticToken(pub String);

impl TokenSource for StaticToken {
    fn token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Borrow the signed-in `az` session's token for `resource`.
pub struct AzCliToken<'a> {
    pub runner: &'a dyn AzRunner,
    pub resource: String,
}

impl TokenSource for AzCliToken<'_> {
    fn token(&self) -> Result<String> {
        let args = az::args([
            "account",
            "get-access-token",
            "--resource",
            self.resource.as_str(),
            "--query",
            "accessToken",
            "--output",
            "tsv",
        ]);
        let stdout = az::run_checked(self.runner, &args)?;
        let token = stdout.trim().to_string();
        if token.is_empty() {
            return Err(DeployError::AzOutput {
                command: az::display_args(&args),
                message: "empty access token".into(),
            });
        }
        Ok(token)
    }
}

// ---------------------------------------------------------------------------
// RuleClient
// ---------------------------------------------------------------------------

pub struct RuleClient {
    http: reqwest::blocking::Client,
    target: RuleTarget,
}

impl RuleClient {
    pub fn new(target: RuleTarget) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self { http, target })
    }

    pub fn target(&self) -> &RuleTarget {
        &self.target
    }

    pub fn put(&self, token: &str, payload: &Value) -> Result<Value> {
        let url = self.target.url();
        let resp = self.http.put(&url).bearer_auth(token).json(payload).send()?;
        read_json("PUT", &url, resp)
    }

    pub fn get(&self, token: &str) -> Result<Value> {
        let url = self.target.url();
        let resp = self.http.get(&url).bearer_auth(token).send()?;
        read_json("GET", &url, resp)
    }
}

fn read_json(method: &str, url: &str, resp: reqwest::blocking::Response) -> Result<Value> {
    let status = resp.status();
    let body = resp.text()?;
    if !status.is_success() {
        return Err(DeployError::HttpStatus {
            method: method.to_string(),
            url: strip_query(url).to_string(),
            status: status.as_u16(),
            body,
        });
    }
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&body)?)
}

fn strip_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

// ---------------------------------------------------------------------------
// deploy_rule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDeployment {
    pub rule_id: String,
    pub display_name: String,
    pub submitted_at: DateTime<Utc>,
    /// Display name read back after the delay, if the response carried one.
    pub persisted_display_name: Option<String>,
    pub confirmed: bool,
}

impl RuleDeployment {
    pub fn mismatch_warning(&self) -> Option<String> {
        if self.confirmed {
            return None;
        }
        Some(format!(
            "rule '{}' was submitted as '{}' but reads back as '{}'",
            self.rule_id,
            self.display_name,
            self.persisted_display_name.as_deref().unwrap_or("<missing>")
        ))
    }
}

/// Token, PUT, wait, GET, compare. Any failure before the comparison is an
/// error; the comparison itself only sets `confirmed`.
pub fn deploy_rule(
    client: &RuleClient,
    tokens: &dyn TokenSource,
    rule: &AutomationRule,
    delay: Duration,
) -> Result<RuleDeployment> {
    let token = tokens.token()?;
    let rule_id = client.target().rule_id.clone();

    tracing::info!(
        rule_id = %rule_id,
        display_name = %rule.display_name,
        "submitting automation rule"
    );
    client.put(&token, &rule.payload())?;
    let submitted_at = Utc::now();

    if !delay.is_zero() {
        tracing::debug!(delay_ms = delay.as_millis() as u64, "waiting before read-back");
        std::thread::sleep(delay);
    }

    let fetched = client.get(&token)?;
    let persisted_display_name = fetched
        .pointer("/properties/displayName")
        .and_then(Value::as_str)
        .map(str::to_string);
    let confirmed = persisted_display_name.as_deref() == Some(rule.display_name.as_str());
    if confirmed {
        tracing::info!(rule_id = %rule_id, "automation rule confirmed");
    } else {
        tracing::warn!(
            rule_id = %rule_id,
            expected = %rule.display_name,
            actual = ?persisted_display_name,
            "automation rule display name mismatch"
        );
    }

    Ok(RuleDeployment {
        rule_id,
        display_name: rule.display_name.clone(),
        submitted_at,
        persisted_display_name,
        confirmed,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
