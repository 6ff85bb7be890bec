use bytes::Bytes;
use http::{Extensions, HeaderName, HeaderValue};
use reqwest::{Client, Method, Request, Response, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, Middleware, Next, RequestBuilder};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::errors::{CortexError, Result};

/// Header carrying the tenant identifier on every request
pub const ORG_ID_HEADER: HeaderName = HeaderName::from_static("x-scope-orgid");

/// Middleware that scopes every outgoing request to one tenant
///
/// Any `X-Scope-OrgID` value already present on the request is overwritten.
#[derive(Debug, Clone)]
pub struct TenantHeader {
    org_id: HeaderValue,
}

impl TenantHeader {
    /// Create the middleware for a tenant
    ///
    /// # Errors
    ///
    /// Returns an error if the tenant id is empty or not a valid header value.
    pub fn new(tenant_id: &str) -> Result<Self> {
        if tenant_id.is_empty() {
            return Err(CortexError::InvalidTenant(tenant_id.to_string()));
        }

        let org_id = HeaderValue::from_str(tenant_id)
            .map_err(|_| CortexError::InvalidTenant(tenant_id.to_string()))?;

        Ok(Self { org_id })
    }
}

#[async_trait::async_trait]
impl Middleware for TenantHeader {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        req.headers_mut().insert(ORG_ID_HEADER, self.org_id.clone());
        next.run(req, extensions).await
    }
}

/// A response whose body has been read to the end
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Full response body
    pub body: Bytes,
}

impl RawResponse {
    /// Response body as text, replacing invalid UTF-8
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub(crate) fn unexpected(&self) -> CortexError {
        CortexError::UnexpectedStatus {
            status: self.status.as_u16(),
            body: self.text(),
        }
    }
}

/// Tenant-scoped HTTP transport shared by every role client
///
/// The underlying connection pool is built once and cloned by reference.
#[derive(Clone)]
pub struct TenantTransport {
    client: ClientWithMiddleware,
    timeout: Duration,
}

impl TenantTransport {
    /// Build a transport over a fresh reqwest client
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the tenant id is invalid.
    pub fn new(tenant_id: &str, timeout: Duration) -> Result<Self> {
        // No client-wide timeout: alertmanager calls are bounded by the caller.
        let client = Client::builder()
            .build()
            .map_err(CortexError::BuildHttpClient)?;

        Self::with_client(client, tenant_id, timeout)
    }

    /// Build a transport over a caller-provided reqwest client
    pub fn with_client(client: Client, tenant_id: &str, timeout: Duration) -> Result<Self> {
        let client = ClientBuilder::new(client)
            .with(TenantHeader::new(tenant_id)?)
            .build();

        Ok(Self { client, timeout })
    }

    /// Per-call deadline applied by [`timed`](Self::timed)
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) fn timed(&self, method: Method, url: Url) -> RequestBuilder {
        self.client.request(method, url).timeout(self.timeout)
    }

    pub(crate) fn untimed(&self, method: Method, url: Url) -> RequestBuilder {
        self.client.request(method, url)
    }
}

/// Send a request and drain its body
pub(crate) async fn execute(request: RequestBuilder) -> Result<RawResponse> {
    let response = request.send().await.map_err(CortexError::Request)?;
    let status = response.status();
    let body = response.bytes().await.map_err(CortexError::ReadBody)?;

    debug!(status = status.as_u16(), body_len = body.len(), "Received response");
    Ok(RawResponse { status, body })
}

/// Like [`execute`], but gives up as soon as `cancel` fires
///
/// The in-flight request is dropped on cancellation, which closes its connection.
pub(crate) async fn execute_cancellable(
    request: RequestBuilder,
    cancel: &CancellationToken,
) -> Result<RawResponse> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!("Request cancelled by caller");
            Err(CortexError::Cancelled)
        }
        response = execute(request) => response,
    }
}

/// Append path segments to a base URL, percent-encoding each segment
///
/// Empty, `.` and `..` segments are rejected: URL normalization would drop
/// them, and even percent-encoded dots are resolved as dot segments.
pub(crate) fn endpoint_url(base: &Url, segments: &[&str]) -> Result<Url> {
    if let Some(segment) = segments
        .iter()
        .find(|s| matches!(**s, "" | "." | ".."))
    {
        return Err(CortexError::InvalidPathSegment(segment.to_string()));
    }

    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| CortexError::InvalidEndpoint(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
