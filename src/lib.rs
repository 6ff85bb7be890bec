//! # Cortex E2E Client
//!
//! A Rust client for exercising a multi-tenant [Cortex](https://cortexmetrics.io/)
//! cluster from integration tests.
//!
//! ## Features
//!
//! - Push series through the distributor's snappy-compressed remote-write endpoint
//! - Instant and range queries, label name and label value enumeration
//! - Rule group management against the ruler
//! - Per-tenant alertmanager configuration, with "not configured" kept apart
//!   from failures
//! - Every request scoped to one tenant via `X-Scope-OrgID`
//!
//! ## Example
//!
//! ```rust,no_run
//! use cortex_e2e_client::{CancellationToken, ClientConfig, CortexClient, Endpoints, Rule, RuleGroup};
//! use std::collections::BTreeMap;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let endpoints = Endpoints::from_addresses(
//!         "distributor:8080",
//!         "querier:8080",
//!         "ruler:8080",
//!         Some("alertmanager:8080"),
//!     )?;
//!     let client = CortexClient::new(ClientConfig::new(endpoints, "user-1"))?;
//!
//!     let group = RuleGroup::new("example")
//!         .with_rule(Rule::alerting("InstanceDown", "up == 0").with_for("5m"));
//!     client.set_rule_group(&group, "test/ns").await?;
//!
//!     let cancel = CancellationToken::new();
//!     if client.get_alertmanager_config(&cancel).await?.is_none() {
//!         client
//!             .set_alertmanager_config(&cancel, "route:\n  receiver: 'default'\n", BTreeMap::new())
//!             .await?;
//!     }
//!     Ok(())
//! }
//! ```

mod alertmanager;
mod client;
mod config;
mod errors;
mod prompb;
mod push;
mod query;
mod rules;
mod transport;
mod types;

pub use alertmanager::{
    AlertmanagerClient, AlertmanagerConfig, AlertmanagerUserConfig, InhibitRule, Receiver, Route,
};
pub use client::CortexClient;
pub use config::{ClientConfig, Endpoints, DEFAULT_TIMEOUT};
pub use errors::{CortexError, Result};
pub use push::{
    encode_write_request, DistributorClient, REMOTE_WRITE_VERSION, REMOTE_WRITE_VERSION_HEADER,
};
pub use query::QuerierClient;
pub use rules::{Rule, RuleGroup, RuleNamespaces, RulerClient};
pub use transport::{RawResponse, TenantHeader, TenantTransport, ORG_ID_HEADER};
pub use types::{
    Metric, QueryResult, Sample, SeriesSamples, StringSample, TimeSeries, VectorSample,
    METRIC_NAME_LABEL,
};

pub use tokio_util::sync::CancellationToken;
