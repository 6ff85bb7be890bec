use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, instrument};
use url::Url;

use crate::errors::{CortexError, Result};
use crate::transport::{endpoint_url, execute, RawResponse, TenantTransport};

const RULES_PATH: [&str; 3] = ["api", "prom", "rules"];

/// Rule groups stored by the ruler, keyed by namespace
pub type RuleNamespaces = BTreeMap<String, Vec<RuleGroup>>;

/// A named set of rules evaluated together
///
/// # Example
///
/// ```rust
/// use cortex_e2e_client::{Rule, RuleGroup};
///
/// let group = RuleGroup::new("example")
///     .with_interval("1m")
///     .with_rule(Rule::recording("job:up:sum", "sum by (job) (up)"))
///     .with_rule(Rule::alerting("InstanceDown", "up == 0").with_for("5m"));
///
/// assert!(group.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleGroup {
    pub name: String,
    /// Evaluation interval, e.g. `1m`; the ruler default applies when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(default)]
    pub rules: Vec<Rule>,
    /// Group settings not modelled above, e.g. `limit`
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl RuleGroup {
    /// Create an empty group
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            interval: None,
            rules: Vec::new(),
            extra: BTreeMap::new(),
        }
    }

    /// Set the evaluation interval
    pub fn with_interval(mut self, interval: &str) -> Self {
        self.interval = Some(interval.to_string());
        self
    }

    /// Append a rule
    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Check the group the way the rule file loader does
    ///
    /// Returns every problem found, not just the first.
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.name.is_empty() {
            errors.push("rule group name must not be empty".to_string());
        }

        for (idx, rule) in self.rules.iter().enumerate() {
            let at = format!("group {:?}, rule {}", self.name, idx + 1);

            match (&rule.record, &rule.alert) {
                (Some(_), Some(_)) => {
                    errors.push(format!("{at}: only one of 'record' and 'alert' must be set"))
                }
                (None, None) => {
                    errors.push(format!("{at}: one of 'record' or 'alert' must be set"))
                }
                (Some(record), None) => {
                    if record.is_empty() {
                        errors.push(format!("{at}: 'record' must not be empty"));
                    }
                    if rule.r#for.is_some() {
                        errors.push(format!("{at}: invalid field 'for' in recording rule"));
                    }
                    if !rule.annotations.is_empty() {
                        errors.push(format!("{at}: invalid field 'annotations' in recording rule"));
                    }
                }
                (None, Some(alert)) => {
                    if alert.is_empty() {
                        errors.push(format!("{at}: 'alert' must not be empty"));
                    }
                }
            }

            if rule.expr.is_empty() {
                errors.push(format!("{at}: field 'expr' must be set in rule"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// A recording or alerting rule
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<String>,
    pub expr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#for: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Rule settings not modelled above, e.g. `keep_firing_for`
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl Rule {
    /// Create a recording rule
    pub fn recording(record: &str, expr: &str) -> Self {
        Self {
            record: Some(record.to_string()),
            expr: expr.to_string(),
            ..Self::default()
        }
    }

    /// Create an alerting rule
    pub fn alerting(alert: &str, expr: &str) -> Self {
        Self {
            alert: Some(alert.to_string()),
            expr: expr.to_string(),
            ..Self::default()
        }
    }

    /// Set how long an alert must be pending before it fires
    pub fn with_for(mut self, duration: &str) -> Self {
        self.r#for = Some(duration.to_string());
        self
    }

    /// Add a label attached to the rule's output
    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    /// Add an annotation
    pub fn with_annotation(mut self, key: &str, value: &str) -> Self {
        self.annotations.insert(key.to_string(), value.to_string());
        self
    }
}

/// Client for the ruler's rule group storage API
#[derive(Clone)]
pub struct RulerClient {
    transport: TenantTransport,
    base_url: Url,
    strict_status: bool,
}

impl RulerClient {
    /// Create a ruler client over a shared transport
    ///
    /// With `strict_status` off, any completed round trip counts as success.
    pub fn new(transport: TenantTransport, base_url: Url, strict_status: bool) -> Self {
        Self {
            transport,
            base_url,
            strict_status,
        }
    }

    fn rules_url(&self, path: &[&str]) -> Result<Url> {
        let segments: Vec<&str> = RULES_PATH.iter().chain(path).copied().collect();
        endpoint_url(&self.base_url, &segments)
    }

    fn check_status(&self, response: &RawResponse) -> Result<()> {
        if self.strict_status && !response.status.is_success() {
            return Err(response.unexpected());
        }
        Ok(())
    }

    /// Get every rule group of the tenant
    #[instrument(name = "RulerClient::get_rule_groups", skip_all)]
    pub async fn get_rule_groups(&self) -> Result<RuleNamespaces> {
        let url = self.rules_url(&[])?;

        debug!(url = %url, "Fetching rule groups");

        let response = execute(self.transport.timed(Method::GET, url)).await?;

        if self.strict_status {
            if response.status == StatusCode::NOT_FOUND {
                debug!("Tenant has no rule groups");
                return Ok(RuleNamespaces::new());
            }
            self.check_status(&response)?;
        }

        if response.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(RuleNamespaces::new());
        }

        serde_yaml::from_slice(&response.body).map_err(|source| CortexError::DecodeYaml {
            operation: "get_rule_groups",
            status: response.status.as_u16(),
            body: response.text(),
            source,
        })
    }

    /// Create or replace a rule group in a namespace
    #[instrument(
        name = "RulerClient::set_rule_group",
        skip_all,
        fields(namespace = %namespace, group = %group.name)
    )]
    pub async fn set_rule_group(&self, group: &RuleGroup, namespace: &str) -> Result<()> {
        let body = serde_yaml::to_string(group).map_err(CortexError::SerializeYaml)?;
        let url = self.rules_url(&[namespace])?;

        debug!(url = %url, "Storing rule group");

        let request = self
            .transport
            .timed(Method::POST, url)
            .header(CONTENT_TYPE, "application/yaml")
            .body(body);

        let response = execute(request).await?;
        self.check_status(&response)?;

        debug!(status = response.status.as_u16(), "Rule group stored");
        Ok(())
    }

    /// Delete a rule group
    #[instrument(
        name = "RulerClient::delete_rule_group",
        skip_all,
        fields(namespace = %namespace, group = %group_name)
    )]
    pub async fn delete_rule_group(&self, namespace: &str, group_name: &str) -> Result<()> {
        let url = self.rules_url(&[namespace, group_name])?;

        debug!(url = %url, "Deleting rule group");

        let response = execute(self.transport.timed(Method::DELETE, url)).await?;
        self.check_status(&response)?;

        debug!(status = response.status.as_u16(), "Rule group deleted");
        Ok(())
    }

    /// Get the base ruler URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(mock_server: &MockServer, strict_status: bool) -> RulerClient {
        let transport = TenantTransport::new("user-1", Duration::from_secs(5)).unwrap();
        RulerClient::new(
            transport,
            Url::parse(&mock_server.uri()).unwrap(),
            strict_status,
        )
    }

    fn sample_group() -> RuleGroup {
        RuleGroup::new("group/one")
            .with_interval("1m")
            .with_rule(Rule::recording("job:up:sum", "sum by (job) (up)"))
            .with_rule(
                Rule::alerting("InstanceDown", "up == 0")
                    .with_for("5m")
                    .with_label("severity", "page")
                    .with_annotation("summary", "instance down"),
            )
    }

    #[test]
    fn test_rule_group_yaml_round_trip() {
        let group = sample_group();
        let yaml = serde_yaml::to_string(&group).unwrap();
        assert!(yaml.contains("for: 5m"));
        assert!(!yaml.contains("annotations: {}"));

        let parsed: RuleGroup = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, group);
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let group = RuleGroup::new("")
            .with_rule(Rule {
                record: Some("a".to_string()),
                alert: Some("b".to_string()),
                expr: "up".to_string(),
                ..Rule::default()
            })
            .with_rule(Rule::recording("c", "").with_for("1m"));

        let errors = group.validate().unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors[0].contains("name must not be empty"));
        assert!(errors[1].contains("only one of"));
        assert!(errors[2].contains("'for'"));
        assert!(errors[3].contains("'expr'"));
    }

    #[test]
    fn test_validate_accepts_sample_group() {
        assert!(sample_group().validate().is_ok());
    }

    #[tokio::test]
    async fn test_get_rule_groups_decodes_namespaces() {
        let mock_server = MockServer::start().await;

        let body = "\
ns1:
  - name: group1
    interval: 30s
    rules:
      - record: job:up:sum
        expr: sum by (job) (up)
ns2:
  - name: group2
    rules:
      - alert: Down
        expr: up == 0
        for: 1m
";

        Mock::given(method("GET"))
            .and(path("/api/prom/rules"))
            .and(header("X-Scope-OrgID", "user-1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(&mock_server)
            .await;

        let namespaces = client(&mock_server, true).get_rule_groups().await.unwrap();

        assert_eq!(namespaces.len(), 2);
        assert_eq!(namespaces["ns1"][0].interval.as_deref(), Some("30s"));
        assert_eq!(namespaces["ns2"][0].rules[0].r#for.as_deref(), Some("1m"));
    }

    #[tokio::test]
    async fn test_get_rule_groups_not_found_is_empty() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/prom/rules"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no rule groups found"))
            .mount(&mock_server)
            .await;

        let namespaces = client(&mock_server, true).get_rule_groups().await.unwrap();
        assert!(namespaces.is_empty());
    }

    #[tokio::test]
    async fn test_get_rule_groups_malformed_is_decode_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/prom/rules"))
            .respond_with(ResponseTemplate::new(200).set_body_string("- just\n- a list\n"))
            .mount(&mock_server)
            .await;

        let err = client(&mock_server, true).get_rule_groups().await.unwrap_err();
        assert!(matches!(
            err,
            CortexError::DecodeYaml {
                operation: "get_rule_groups",
                status: 200,
                ..
            }
        ));
    }

    #[test]
    fn test_unmodelled_keys_survive_round_trip() {
        let yaml = "\
name: group1
limit: 10
rules:
  - alert: Down
    expr: up == 0
    keep_firing_for: 5m
";
        let group: RuleGroup = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(group.extra["limit"].as_u64(), Some(10));
        assert!(group.rules[0].extra.contains_key("keep_firing_for"));

        let original: serde_yaml::Value = serde_yaml::from_str(yaml).unwrap();
        let round_trip: serde_yaml::Value =
            serde_yaml::from_str(&serde_yaml::to_string(&group).unwrap()).unwrap();
        assert_eq!(round_trip, original);
    }

    #[tokio::test]
    async fn test_get_rule_groups_lenient_decodes_any_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/prom/rules"))
            .respond_with(ResponseTemplate::new(200).set_body_string("  \n"))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/prom/rules"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no rule groups found"))
            .mount(&mock_server)
            .await;

        let client = client(&mock_server, false);

        assert!(client.get_rule_groups().await.unwrap().is_empty());

        let err = client.get_rule_groups().await.unwrap_err();
        assert!(matches!(
            err,
            CortexError::DecodeYaml {
                operation: "get_rule_groups",
                status: 404,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_dot_names_rejected_without_request() {
        let mock_server = MockServer::start().await;

        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(202))
            .expect(0)
            .mount(&mock_server)
            .await;

        let client = client(&mock_server, true);

        let err = client.delete_rule_group("ns", "..").await.unwrap_err();
        assert!(matches!(err, CortexError::InvalidPathSegment(ref s) if s == ".."));

        let err = client
            .set_rule_group(&RuleGroup::new("g"), ".")
            .await
            .unwrap_err();
        assert!(matches!(err, CortexError::InvalidPathSegment(ref s) if s == "."));

        assert!(mock_server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_rule_group_escapes_namespace() {
        let mock_server = MockServer::start().await;
        let group = sample_group();

        Mock::given(method("POST"))
            .and(path("/api/prom/rules/test%2Fns"))
            .and(header("Content-Type", "application/yaml"))
            .and(header("X-Scope-OrgID", "user-1"))
            .and(body_string(serde_yaml::to_string(&group).unwrap()))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&mock_server)
            .await;

        client(&mock_server, true)
            .set_rule_group(&group, "test/ns")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_set_rule_group_strict_rejects_error_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid rules"))
            .mount(&mock_server)
            .await;

        let err = client(&mock_server, true)
            .set_rule_group(&sample_group(), "ns")
            .await
            .unwrap_err();

        match err {
            CortexError::UnexpectedStatus { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, "invalid rules");
            }
            other => panic!("Expected unexpected status, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_set_rule_group_lenient_accepts_error_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let result = client(&mock_server, false)
            .set_rule_group(&sample_group(), "ns")
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_delete_rule_group_path() {
        let mock_server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/api/prom/rules/test%2Fns/group%2Fone"))
            .and(header("X-Scope-OrgID", "user-1"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&mock_server)
            .await;

        client(&mock_server, true)
            .delete_rule_group("test/ns", "group/one")
            .await
            .unwrap();
    }
}
