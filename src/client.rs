use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::alertmanager::{AlertmanagerClient, AlertmanagerConfig};
use crate::config::ClientConfig;
use crate::errors::{CortexError, Result};
use crate::push::DistributorClient;
use crate::query::QuerierClient;
use crate::rules::{RuleGroup, RuleNamespaces, RulerClient};
use crate::transport::{RawResponse, TenantTransport};
use crate::types::{QueryResult, TimeSeries};

/// Client for driving a Cortex cluster from integration tests
///
/// One instance is scoped to one tenant and one set of endpoints. All role
/// clients share a single connection pool.
///
/// # Example
///
/// ```rust,no_run
/// use cortex_e2e_client::{ClientConfig, CortexClient, Endpoints, TimeSeries};
/// use chrono::Utc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let endpoints = Endpoints::from_addresses(
///         "localhost:8080",
///         "localhost:8080",
///         "localhost:8080",
///         None,
///     )?;
///     let client = CortexClient::new(ClientConfig::new(endpoints, "user-1"))?;
///
///     let now = Utc::now();
///     let series = TimeSeries::new("series_1").with_sample_at(now, 1.0);
///     let response = client.push(&[series.clone()]).await?;
///     assert!(response.status.is_success());
///
///     let result = client.query(&series.selector(), now).await?;
///     println!("{result:?}");
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct CortexClient {
    distributor: DistributorClient,
    querier: QuerierClient,
    ruler: RulerClient,
    alertmanager: Option<AlertmanagerClient>,
    tenant_id: String,
}

impl CortexClient {
    /// Create a client from its configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the tenant id is invalid.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = TenantTransport::new(&config.tenant_id, config.timeout)?;
        Ok(Self::with_transport(config, transport))
    }

    /// Create a client over a caller-provided reqwest client
    ///
    /// The reqwest client should not set its own timeout, or it will also
    /// bound alertmanager calls.
    pub fn with_http_client(config: ClientConfig, client: reqwest::Client) -> Result<Self> {
        let transport = TenantTransport::with_client(client, &config.tenant_id, config.timeout)?;
        Ok(Self::with_transport(config, transport))
    }

    fn with_transport(config: ClientConfig, transport: TenantTransport) -> Self {
        let endpoints = config.endpoints;

        Self {
            distributor: DistributorClient::new(transport.clone(), endpoints.distributor),
            querier: QuerierClient::new(transport.clone(), endpoints.querier),
            ruler: RulerClient::new(
                transport.clone(),
                endpoints.ruler,
                config.strict_rule_status,
            ),
            alertmanager: endpoints
                .alertmanager
                .map(|url| AlertmanagerClient::new(transport, url)),
            tenant_id: config.tenant_id,
        }
    }

    /// Tenant every request is scoped to
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Distributor (write path) client
    pub fn distributor(&self) -> &DistributorClient {
        &self.distributor
    }

    /// Querier (read path) client
    pub fn querier(&self) -> &QuerierClient {
        &self.querier
    }

    /// Ruler client
    pub fn ruler(&self) -> &RulerClient {
        &self.ruler
    }

    /// Alertmanager client
    ///
    /// # Errors
    ///
    /// Returns [`CortexError::AlertmanagerNotConfigured`] if no alertmanager
    /// address was configured.
    pub fn alertmanager(&self) -> Result<&AlertmanagerClient> {
        self.alertmanager
            .as_ref()
            .ok_or(CortexError::AlertmanagerNotConfigured)
    }

    /// Push series to the distributor
    pub async fn push(&self, timeseries: &[TimeSeries]) -> Result<RawResponse> {
        self.distributor.push(timeseries).await
    }

    /// Run an instant query
    pub async fn query(&self, query: &str, time: DateTime<Utc>) -> Result<QueryResult> {
        self.querier.query(query, time).await
    }

    /// Run a range query
    pub async fn query_range(
        &self,
        query: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> Result<QueryResult> {
        self.querier.query_range(query, start, end, step).await
    }

    /// Run an instant query and return the raw response
    pub async fn query_raw(&self, query: &str) -> Result<RawResponse> {
        self.querier.query_raw(query).await
    }

    /// List the values of a label
    pub async fn label_values(&self, label: &str) -> Result<Vec<String>> {
        self.querier.label_values(label).await
    }

    /// List every label name
    pub async fn label_names(&self) -> Result<Vec<String>> {
        self.querier.label_names().await
    }

    /// Get every rule group, keyed by namespace
    pub async fn get_rule_groups(&self) -> Result<RuleNamespaces> {
        self.ruler.get_rule_groups().await
    }

    /// Create or replace a rule group
    pub async fn set_rule_group(&self, group: &RuleGroup, namespace: &str) -> Result<()> {
        self.ruler.set_rule_group(group, namespace).await
    }

    /// Delete a rule group
    pub async fn delete_rule_group(&self, namespace: &str, group_name: &str) -> Result<()> {
        self.ruler.delete_rule_group(namespace, group_name).await
    }

    /// Get the tenant's alertmanager configuration, `None` if it has none
    pub async fn get_alertmanager_config(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<AlertmanagerConfig>> {
        self.alertmanager()?.get_config(cancel).await
    }

    /// Store the tenant's alertmanager configuration and templates
    pub async fn set_alertmanager_config(
        &self,
        cancel: &CancellationToken,
        config: &str,
        templates: BTreeMap<String, String>,
    ) -> Result<()> {
        self.alertmanager()?
            .set_config(cancel, config, templates)
            .await
    }

    /// Delete the tenant's alertmanager configuration
    pub async fn delete_alertmanager_config(&self, cancel: &CancellationToken) -> Result<()> {
        self.alertmanager()?.delete_config(cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Endpoints;
    use crate::types::Sample;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use url::Url;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    fn config(mock_server: &MockServer, with_alertmanager: bool) -> ClientConfig {
        let url = Url::parse(&mock_server.uri()).unwrap();
        let mut endpoints = Endpoints::new(url.clone(), url.clone(), url.clone()).unwrap();
        if with_alertmanager {
            endpoints = endpoints.with_alertmanager(url).unwrap();
        }
        ClientConfig::new(endpoints, "user-1")
    }

    /// Alertmanager config store that behaves like the real endpoint
    #[derive(Clone, Default)]
    struct ConfigStore {
        stored: Arc<AtomicBool>,
    }

    impl Respond for ConfigStore {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            match (request.method.as_str(), request.url.path()) {
                ("POST", "/api/v1/alerts") => {
                    self.stored.store(true, Ordering::SeqCst);
                    ResponseTemplate::new(201)
                }
                ("DELETE", "/api/v1/alerts") => {
                    if self.stored.swap(false, Ordering::SeqCst) {
                        ResponseTemplate::new(200)
                    } else {
                        ResponseTemplate::new(404)
                    }
                }
                ("GET", "/api/prom/api/v1/status") if self.stored.load(Ordering::SeqCst) => {
                    ResponseTemplate::new(200).set_body_json(serde_json::json!({
                        "status": "success",
                        "data": { "configYAML": "route:\n  receiver: 'default'\n" }
                    }))
                }
                _ => ResponseTemplate::new(404),
            }
        }
    }

    #[tokio::test]
    async fn test_missing_alertmanager_fails_at_call_time() {
        let mock_server = MockServer::start().await;
        let client = CortexClient::new(config(&mock_server, false)).unwrap();

        let err = client
            .get_alertmanager_config(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CortexError::AlertmanagerNotConfigured));
        assert!(client.alertmanager().is_err());
    }

    #[tokio::test]
    async fn test_invalid_tenant_fails_at_construction() {
        let mock_server = MockServer::start().await;
        let mut config = config(&mock_server, false);
        config.tenant_id = String::new();

        assert!(matches!(
            CortexClient::new(config),
            Err(CortexError::InvalidTenant(_))
        ));
    }

    #[tokio::test]
    async fn test_alertmanager_config_lifecycle() {
        let mock_server = MockServer::start().await;

        Mock::given(header("X-Scope-OrgID", "user-1"))
            .respond_with(ConfigStore::default())
            .mount(&mock_server)
            .await;

        let client = CortexClient::new(config(&mock_server, true)).unwrap();
        let cancel = CancellationToken::new();

        assert!(client.get_alertmanager_config(&cancel).await.unwrap().is_none());
        assert!(client
            .delete_alertmanager_config(&cancel)
            .await
            .unwrap_err()
            .is_not_found());

        client
            .set_alertmanager_config(&cancel, "route:\n  receiver: 'default'\n", BTreeMap::new())
            .await
            .unwrap();

        let stored = client.get_alertmanager_config(&cancel).await.unwrap().unwrap();
        assert_eq!(stored.route.unwrap().receiver.as_deref(), Some("default"));

        client.delete_alertmanager_config(&cancel).await.unwrap();
        assert!(client.get_alertmanager_config(&cancel).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_push_then_query_shares_tenant() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/prom/push"))
            .and(header("X-Scope-OrgID", "user-1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/prom/api/v1/query"))
            .and(query_param("query", "series_1{job=\"test\"}"))
            .and(header("X-Scope-OrgID", "user-1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"status":"success","data":{"resultType":"vector","result":[
                    {"metric":{"__name__":"series_1","job":"test"},"value":[1600000000,"5"]}
                ]}}"#,
            ))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = CortexClient::new(config(&mock_server, false)).unwrap();
        assert_eq!(client.tenant_id(), "user-1");

        let series = TimeSeries::new("series_1")
            .with_label("job", "test")
            .with_sample(1_600_000_000_000, 5.0);

        let response = client.push(&[series.clone()]).await.unwrap();
        assert!(response.status.is_success());

        let time = DateTime::from_timestamp(1_600_000_000, 0).unwrap();
        match client.query(&series.selector(), time).await.unwrap() {
            QueryResult::Vector(samples) => {
                assert_eq!(samples[0].metric, series.labels);
                assert_eq!(samples[0].sample, Sample::new(1_600_000_000_000, 5.0));
            }
            other => panic!("Expected vector, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rule_group_round_trip_through_facade() {
        let mock_server = MockServer::start().await;
        let group = RuleGroup::new("group1")
            .with_rule(crate::rules::Rule::recording("job:up:sum", "sum(up)"));

        Mock::given(method("POST"))
            .and(path("/api/prom/rules/test%2Fns"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&mock_server)
            .await;

        let listing = format!(
            "test/ns:\n{}",
            serde_yaml::to_string(&vec![group.clone()]).unwrap()
        );
        Mock::given(method("GET"))
            .and(path("/api/prom/rules"))
            .respond_with(ResponseTemplate::new(200).set_body_string(listing))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = CortexClient::new(config(&mock_server, false)).unwrap();
        client.set_rule_group(&group, "test/ns").await.unwrap();

        let namespaces = client.get_rule_groups().await.unwrap();
        assert_eq!(namespaces["test/ns"], vec![group]);
    }
}
