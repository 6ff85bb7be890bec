use std::time::Duration;
use url::Url;

use crate::errors::{CortexError, Result};

/// Per-call deadline applied to push, query and ruler operations
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Network addresses of the cluster roles the client talks to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Write-path ingestion endpoint
    pub distributor: Url,
    /// Read-path query endpoint
    pub querier: Url,
    /// Rule storage endpoint
    pub ruler: Url,
    /// Alert routing endpoint, absent when the cluster runs without one
    pub alertmanager: Option<Url>,
}

impl Endpoints {
    /// Create an endpoint set without an alertmanager
    ///
    /// # Errors
    ///
    /// Returns an error if any URL cannot carry a path (e.g. `mailto:`).
    pub fn new(distributor: Url, querier: Url, ruler: Url) -> Result<Self> {
        for url in [&distributor, &querier, &ruler] {
            ensure_base(url)?;
        }

        Ok(Self {
            distributor,
            querier,
            ruler,
            alertmanager: None,
        })
    }

    /// Attach an alertmanager endpoint
    pub fn with_alertmanager(mut self, alertmanager: Url) -> Result<Self> {
        ensure_base(&alertmanager)?;
        self.alertmanager = Some(alertmanager);
        Ok(self)
    }

    /// Build an endpoint set from bare `host:port` addresses
    ///
    /// Addresses are reached over plain HTTP. An empty or missing alertmanager
    /// address leaves the alertmanager endpoint unset.
    pub fn from_addresses(
        distributor: &str,
        querier: &str,
        ruler: &str,
        alertmanager: Option<&str>,
    ) -> Result<Self> {
        let endpoints = Self::new(
            parse_address(distributor)?,
            parse_address(querier)?,
            parse_address(ruler)?,
        )?;

        match alertmanager.filter(|addr| !addr.is_empty()) {
            Some(addr) => endpoints.with_alertmanager(parse_address(addr)?),
            None => Ok(endpoints),
        }
    }
}

fn parse_address(address: &str) -> Result<Url> {
    Url::parse(&format!("http://{address}"))
        .map_err(|e| CortexError::InvalidEndpoint(format!("{address}: {e}")))
}

fn ensure_base(url: &Url) -> Result<()> {
    if url.cannot_be_a_base() {
        return Err(CortexError::InvalidEndpoint(url.to_string()));
    }
    Ok(())
}

/// Everything needed to build a [`CortexClient`](crate::CortexClient)
///
/// # Example
///
/// ```rust
/// use cortex_e2e_client::{ClientConfig, Endpoints};
/// use std::time::Duration;
///
/// let endpoints = Endpoints::from_addresses(
///     "distributor:8080",
///     "querier:8080",
///     "ruler:8080",
///     Some("alertmanager:8080"),
/// )
/// .unwrap();
///
/// let config = ClientConfig::new(endpoints, "user-1").with_timeout(Duration::from_secs(2));
/// assert_eq!(config.tenant_id, "user-1");
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Cluster addresses
    pub endpoints: Endpoints,
    /// Value sent in the tenant scoping header
    pub tenant_id: String,
    /// Deadline for push, query and ruler calls
    pub timeout: Duration,
    /// Whether ruler writes must answer with a 2xx status
    pub strict_rule_status: bool,
}

impl ClientConfig {
    /// Create a configuration with the default timeout and strict ruler status checks
    pub fn new(endpoints: Endpoints, tenant_id: impl Into<String>) -> Self {
        Self {
            endpoints,
            tenant_id: tenant_id.into(),
            timeout: DEFAULT_TIMEOUT,
            strict_rule_status: true,
        }
    }

    /// Override the per-call deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Treat any completed ruler round trip as success, whatever its status
    pub fn with_lenient_rule_status(mut self) -> Self {
        self.strict_rule_status = false;
        self
    }
}
