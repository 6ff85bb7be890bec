use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::de::{DeserializeOwned, Error as _};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::errors::{CortexError, Result};
use crate::transport::{endpoint_url, execute, RawResponse, TenantTransport};
use crate::types::QueryResult;

const API_PREFIX: [&str; 4] = ["api", "prom", "api", "v1"];

/// Standard query API envelope
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse<T> {
    status: String,
    data: Option<T>,
    error_type: Option<String>,
    error: Option<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

fn decode_api_response<T: DeserializeOwned>(
    operation: &'static str,
    response: RawResponse,
) -> Result<T> {
    let status = response.status.as_u16();
    let decode_error = |source: serde_json::Error| CortexError::DecodeJson {
        operation,
        status,
        body: response.text(),
        source,
    };

    let envelope: ApiResponse<T> = match serde_json::from_slice(&response.body) {
        Ok(envelope) => envelope,
        Err(source) if response.status.is_success() => return Err(decode_error(source)),
        Err(_) => return Err(response.unexpected()),
    };

    for warning in &envelope.warnings {
        warn!(operation, warning = %warning, "Query API returned a warning");
    }

    if envelope.status != "success" {
        return Err(CortexError::Query {
            status,
            error_type: envelope.error_type.unwrap_or_default(),
            message: envelope.error.unwrap_or_default(),
        });
    }

    if !response.status.is_success() {
        return Err(response.unexpected());
    }

    envelope
        .data
        .ok_or_else(|| decode_error(serde_json::Error::missing_field("data")))
}

/// Format a timestamp the way the query API expects: fractional Unix seconds
fn format_time(time: DateTime<Utc>) -> String {
    format!("{:.3}", time.timestamp_millis() as f64 / 1000.0)
}

/// Client for the querier's Prometheus-compatible read API
///
/// Label enumeration takes no time range: the querier ignores one, so the
/// client offers no way to pass it.
#[derive(Clone)]
pub struct QuerierClient {
    transport: TenantTransport,
    base_url: Url,
}

impl QuerierClient {
    /// Create a querier client over a shared transport
    pub fn new(transport: TenantTransport, base_url: Url) -> Self {
        Self {
            transport,
            base_url,
        }
    }

    fn api_url(&self, path: &[&str]) -> Result<Url> {
        let segments: Vec<&str> = API_PREFIX.iter().chain(path).copied().collect();
        endpoint_url(&self.base_url, &segments)
    }

    /// Evaluate an instant query at `time`
    #[instrument(name = "QuerierClient::query", skip_all, fields(query = %query))]
    pub async fn query(&self, query: &str, time: DateTime<Utc>) -> Result<QueryResult> {
        let url = self.api_url(&["query"])?;
        let time = format_time(time);

        debug!(url = %url, time = %time, "Running instant query");

        let request = self
            .transport
            .timed(Method::GET, url)
            .query(&[("query", query), ("time", time.as_str())]);

        let result: QueryResult = decode_api_response("query", execute(request).await?)?;
        debug!(result_type = result.result_type(), "Instant query finished");
        Ok(result)
    }

    /// Evaluate a range query
    #[instrument(name = "QuerierClient::query_range", skip_all, fields(query = %query))]
    pub async fn query_range(
        &self,
        query: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> Result<QueryResult> {
        let url = self.api_url(&["query_range"])?;
        let (start, end) = (format_time(start), format_time(end));
        let step = step.as_secs_f64().to_string();

        debug!(url = %url, start = %start, end = %end, step = %step, "Running range query");

        let request = self.transport.timed(Method::GET, url).query(&[
            ("query", query),
            ("start", start.as_str()),
            ("end", end.as_str()),
            ("step", step.as_str()),
        ]);

        decode_api_response("query_range", execute(request).await?)
    }

    /// Run an instant query and return the response untouched
    #[instrument(name = "QuerierClient::query_raw", skip_all, fields(query = %query))]
    pub async fn query_raw(&self, query: &str) -> Result<RawResponse> {
        let mut url = self.api_url(&["query"])?;
        url.query_pairs_mut().append_pair("query", query);

        debug!(url = %url, "Running raw query");
        execute(self.transport.timed(Method::GET, url)).await
    }

    /// List the values of a label
    #[instrument(name = "QuerierClient::label_values", skip_all, fields(label = %label))]
    pub async fn label_values(&self, label: &str) -> Result<Vec<String>> {
        let url = self.api_url(&["label", label, "values"])?;

        debug!(url = %url, "Listing label values");
        decode_api_response(
            "label_values",
            execute(self.transport.timed(Method::GET, url)).await?,
        )
    }

    /// List every label name
    #[instrument(name = "QuerierClient::label_names", skip_all)]
    pub async fn label_names(&self) -> Result<Vec<String>> {
        let url = self.api_url(&["labels"])?;

        debug!(url = %url, "Listing label names");
        decode_api_response(
            "label_names",
            execute(self.transport.timed(Method::GET, url)).await?,
        )
    }

    /// Get the base querier URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}
