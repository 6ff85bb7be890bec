use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

use crate::errors::{CortexError, Result};
use crate::transport::{endpoint_url, execute_cancellable, TenantTransport};

/// Parsed alertmanager configuration
///
/// Only the routing tree and receiver names are modelled; integration
/// settings, the `global` block and unknown keys at any level of the routing
/// tree or inhibit rules are kept verbatim, so a parsed configuration
/// serializes back to an equivalent document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertmanagerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global: Option<serde_yaml::Mapping>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<Route>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inhibit_rules: Vec<InhibitRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub receivers: Vec<Receiver>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub templates: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl AlertmanagerConfig {
    /// Parse and validate a configuration document
    ///
    /// # Errors
    ///
    /// Returns [`CortexError::InvalidAlertmanagerConfig`] if the document does
    /// not parse or fails [`validate`](Self::validate).
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| CortexError::InvalidAlertmanagerConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration back to YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(CortexError::SerializeYaml)
    }

    /// Check what the alertmanager requires before it loads a configuration:
    /// a root route with a default receiver, and unique receiver names.
    pub fn validate(&self) -> Result<()> {
        let route = self
            .route
            .as_ref()
            .ok_or_else(|| CortexError::InvalidAlertmanagerConfig("no routes provided".into()))?;

        if route.receiver.as_deref().unwrap_or_default().is_empty() {
            return Err(CortexError::InvalidAlertmanagerConfig(
                "root route must specify a default receiver".into(),
            ));
        }

        let mut names = BTreeSet::new();
        for receiver in &self.receivers {
            if !names.insert(receiver.name.as_str()) {
                return Err(CortexError::InvalidAlertmanagerConfig(format!(
                    "notification config name {:?} is not unique",
                    receiver.name
                )));
            }
        }

        Ok(())
    }
}

/// Node of the routing tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_by: Vec<String>,
    #[serde(default, rename = "match", skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_re: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matchers: Vec<String>,
    #[serde(default, rename = "continue", skip_serializing_if = "std::ops::Not::not")]
    pub continue_matching: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_wait: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_interval: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_interval: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mute_time_intervals: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,
    /// Route settings not modelled above, e.g. `active_time_intervals`
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// Named notification target
///
/// Integration blocks (`email_configs`, `webhook_configs`, ...) are kept as raw YAML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Receiver {
    pub name: String,
    #[serde(flatten)]
    pub integrations: BTreeMap<String, serde_yaml::Value>,
}

/// Rule muting target alerts while matching source alerts fire
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InhibitRule {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub source_match: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub source_match_re: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_matchers: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub target_match: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub target_match_re: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_matchers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub equal: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// Per-tenant configuration as stored by the alertmanager
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertmanagerUserConfig {
    /// Template file name to template content
    #[serde(default)]
    pub template_files: BTreeMap<String, String>,
    /// Raw alertmanager configuration document
    pub alertmanager_config: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    data: StatusData,
}

#[derive(Debug, Deserialize)]
struct StatusData {
    #[serde(rename = "configYAML")]
    config_yaml: String,
}

/// Client for the alertmanager's per-tenant configuration API
///
/// Requests carry no internal deadline: every call takes a
/// [`CancellationToken`] and stops as soon as it fires.
#[derive(Clone)]
pub struct AlertmanagerClient {
    transport: TenantTransport,
    base_url: Url,
}

impl AlertmanagerClient {
    /// Create an alertmanager client over a shared transport
    pub fn new(transport: TenantTransport, base_url: Url) -> Self {
        Self {
            transport,
            base_url,
        }
    }

    /// Get the tenant's current configuration
    ///
    /// Returns `Ok(None)` when the tenant has no configuration yet.
    #[instrument(name = "AlertmanagerClient::get_config", skip_all)]
    pub async fn get_config(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<AlertmanagerConfig>> {
        let url = endpoint_url(&self.base_url, &["api", "prom", "api", "v1", "status"])?;

        debug!(url = %url, "Fetching alertmanager config");

        let response =
            execute_cancellable(self.transport.untimed(Method::GET, url), cancel).await?;

        if response.status == StatusCode::NOT_FOUND {
            debug!("Tenant has no alertmanager config");
            return Ok(None);
        }

        if !response.status.is_success() {
            return Err(response.unexpected());
        }

        let status: StatusResponse =
            serde_json::from_slice(&response.body).map_err(|source| CortexError::DecodeJson {
                operation: "get_alertmanager_config",
                status: response.status.as_u16(),
                body: response.text(),
                source,
            })?;

        let config: AlertmanagerConfig = serde_yaml::from_str(&status.data.config_yaml)
            .map_err(|source| CortexError::DecodeYaml {
                operation: "get_alertmanager_config",
                status: response.status.as_u16(),
                body: status.data.config_yaml.clone(),
                source,
            })?;
        config.validate()?;

        Ok(Some(config))
    }

    /// Store a configuration and its templates for the tenant
    ///
    /// Succeeds only on `201 Created`; `404` maps to [`CortexError::NotFound`].
    #[instrument(
        name = "AlertmanagerClient::set_config",
        skip_all,
        fields(template_count = templates.len())
    )]
    pub async fn set_config(
        &self,
        cancel: &CancellationToken,
        config: &str,
        templates: BTreeMap<String, String>,
    ) -> Result<()> {
        let body = serde_yaml::to_string(&AlertmanagerUserConfig {
            template_files: templates,
            alertmanager_config: config.to_string(),
        })
        .map_err(CortexError::SerializeYaml)?;

        let url = endpoint_url(&self.base_url, &["api", "v1", "alerts"])?;

        debug!(url = %url, "Storing alertmanager config");

        let request = self
            .transport
            .untimed(Method::POST, url)
            .header(CONTENT_TYPE, "application/yaml")
            .body(body);

        let response = execute_cancellable(request, cancel).await?;

        match response.status {
            StatusCode::CREATED => {
                debug!("Alertmanager config stored");
                Ok(())
            }
            StatusCode::NOT_FOUND => Err(CortexError::NotFound),
            _ => Err(response.unexpected()),
        }
    }

    /// Delete the tenant's configuration
    ///
    /// Succeeds only on `200 OK`; `404` maps to [`CortexError::NotFound`].
    #[instrument(name = "AlertmanagerClient::delete_config", skip_all)]
    pub async fn delete_config(&self, cancel: &CancellationToken) -> Result<()> {
        let url = endpoint_url(&self.base_url, &["api", "v1", "alerts"])?;

        debug!(url = %url, "Deleting alertmanager config");

        let response =
            execute_cancellable(self.transport.untimed(Method::DELETE, url), cancel).await?;

        match response.status {
            StatusCode::OK => {
                debug!("Alertmanager config deleted");
                Ok(())
            }
            StatusCode::NOT_FOUND => Err(CortexError::NotFound),
            _ => Err(response.unexpected()),
        }
    }

    /// Get the base alertmanager URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}
