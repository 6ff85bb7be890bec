use thiserror::Error;

/// Result type alias for Cortex client operations
pub type Result<T> = std::result::Result<T, CortexError>;

/// Errors that can occur when talking to a Cortex cluster
#[derive(Debug, Error)]
pub enum CortexError {
    /// Failed to build HTTP client
    #[error("Failed to build HTTP client: {0}")]
    BuildHttpClient(#[source] reqwest::Error),

    /// An endpoint address cannot be used as a request base
    #[error("Invalid endpoint address: {0}")]
    InvalidEndpoint(String),

    /// A name cannot be sent as a single URL path segment
    #[error("Invalid path segment {0:?}")]
    InvalidPathSegment(String),

    /// The tenant identifier cannot be sent as a header value
    #[error("Invalid tenant id {0:?}")]
    InvalidTenant(String),

    /// No alertmanager address was supplied when the client was built
    #[error("Alertmanager endpoint is not configured")]
    AlertmanagerNotConfigured,

    /// HTTP request failed before a response arrived
    #[error("HTTP request failed: {0}")]
    Request(#[source] reqwest_middleware::Error),

    /// Reading the response body failed
    #[error("Failed to read response body: {0}")]
    ReadBody(#[source] reqwest::Error),

    /// The caller cancelled the operation before a response arrived
    #[error("Request cancelled")]
    Cancelled,

    /// Failed to compress a write request
    #[error("Failed to compress write request: {0}")]
    Compress(#[source] snap::Error),

    /// Failed to serialize a YAML request body
    #[error("Failed to serialize YAML body: {0}")]
    SerializeYaml(#[source] serde_yaml::Error),

    /// A JSON response body did not match the expected schema
    #[error("Failed to decode {operation} response (HTTP {status}): {source}")]
    DecodeJson {
        /// Operation that received the body
        operation: &'static str,
        /// HTTP status code
        status: u16,
        /// Raw response body
        body: String,
        #[source]
        source: serde_json::Error,
    },

    /// A YAML response body did not match the expected schema
    #[error("Failed to decode {operation} response (HTTP {status}): {source}")]
    DecodeYaml {
        /// Operation that received the body
        operation: &'static str,
        /// HTTP status code
        status: u16,
        /// Raw response body
        body: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// The alertmanager configuration parsed but is not usable
    #[error("Invalid alertmanager configuration: {0}")]
    InvalidAlertmanagerConfig(String),

    /// The query API answered with an error envelope
    #[error("Query API error: HTTP {status} - {error_type}: {message}")]
    Query {
        /// HTTP status code
        status: u16,
        /// `errorType` reported by the querier
        error_type: String,
        /// `error` message reported by the querier
        message: String,
    },

    /// The alertmanager has no configuration for this tenant
    #[error("not found")]
    NotFound,

    /// The endpoint answered with a status code the operation does not accept
    #[error("Unexpected response: HTTP {status} - {body}")]
    UnexpectedStatus {
        /// HTTP status code
        status: u16,
        /// Response body, verbatim
        body: String,
    },
}

impl CortexError {
    /// Check if the error happened before any response was received
    ///
    /// Returns `true` for connection failures, timeouts, body read failures
    /// and caller cancellation.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Request(_) | Self::ReadBody(_) | Self::Cancelled
        )
    }

    /// Check if the error is the per-call deadline expiring
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Request(reqwest_middleware::Error::Reqwest(err)) => err.is_timeout(),
            Self::ReadBody(err) => err.is_timeout(),
            _ => false,
        }
    }

    /// Check if the error is the distinguished "not found" outcome
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Check if a response arrived but its body could not be decoded
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            Self::DecodeJson { .. } | Self::DecodeYaml { .. } | Self::InvalidAlertmanagerConfig(_)
        )
    }
}
