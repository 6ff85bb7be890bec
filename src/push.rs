use prost::Message;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::Method;
use tracing::{debug, instrument};
use url::Url;

use crate::errors::{CortexError, Result};
use crate::prompb;
use crate::transport::{endpoint_url, execute, RawResponse, TenantTransport};
use crate::types::TimeSeries;

/// Header announcing the remote-write protocol version
pub const REMOTE_WRITE_VERSION_HEADER: &str = "X-Prometheus-Remote-Write-Version";
/// Remote-write protocol version sent with every push
pub const REMOTE_WRITE_VERSION: &str = "0.1.0";

impl From<&TimeSeries> for prompb::TimeSeries {
    fn from(series: &TimeSeries) -> Self {
        prompb::TimeSeries {
            labels: series
                .labels
                .iter()
                .map(|(name, value)| prompb::Label {
                    name: name.clone(),
                    value: value.clone(),
                })
                .collect(),
            samples: series
                .samples
                .iter()
                .map(|sample| prompb::Sample {
                    value: sample.value,
                    timestamp: sample.timestamp,
                })
                .collect(),
        }
    }
}

/// Encode a batch of series as a snappy-compressed remote-write request body
///
/// # Errors
///
/// Returns an error if compression fails.
pub fn encode_write_request(timeseries: &[TimeSeries]) -> Result<Vec<u8>> {
    let request = prompb::WriteRequest {
        timeseries: timeseries.iter().map(prompb::TimeSeries::from).collect(),
    };

    snap::raw::Encoder::new()
        .compress_vec(&request.encode_to_vec())
        .map_err(CortexError::Compress)
}

/// Client for the distributor's remote-write endpoint
#[derive(Clone)]
pub struct DistributorClient {
    transport: TenantTransport,
    base_url: Url,
}

impl DistributorClient {
    /// Create a distributor client over a shared transport
    pub fn new(transport: TenantTransport, base_url: Url) -> Self {
        Self {
            transport,
            base_url,
        }
    }

    /// Push a batch of series
    ///
    /// The response is returned as-is: only transport failures (connection
    /// errors, the per-call timeout) are reported as errors.
    #[instrument(
        name = "DistributorClient::push",
        skip_all,
        fields(series_count = timeseries.len())
    )]
    pub async fn push(&self, timeseries: &[TimeSeries]) -> Result<RawResponse> {
        let body = encode_write_request(timeseries)?;
        let url = endpoint_url(&self.base_url, &["api", "prom", "push"])?;

        debug!(url = %url, body_len = body.len(), "Pushing series to distributor");

        let request = self
            .transport
            .timed(Method::POST, url)
            .header(CONTENT_ENCODING, "snappy")
            .header(CONTENT_TYPE, "application/x-protobuf")
            .header(REMOTE_WRITE_VERSION_HEADER, REMOTE_WRITE_VERSION)
            .body(body);

        execute(request).await
    }

    /// Get the base distributor URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}
