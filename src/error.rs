//! Error types for metadata fetching.

use thiserror::Error;

/// Errors that can occur while fetching and normalizing instance metadata.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// Every attempt against a metadata endpoint failed.
    #[error("fetching {url} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    /// A response could not be interpreted as the expected value.
    #[error("could not parse {value:?} as {what}: {reason}")]
    Parse {
        what: String,
        value: String,
        reason: String,
    },

    /// JSON document could not be decoded.
    #[error("json in {key}: {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Response was not valid UTF-8.
    #[error("invalid utf-8 in {key}")]
    Utf8 { key: String },

    /// A key the provider must serve was absent.
    #[error("metadata key {0} is missing")]
    MissingKey(String),

    /// Non-retryable HTTP status other than 404.
    #[error("http {0}")]
    Http(u16),

    /// Response exceeds maximum allowed size.
    #[error("response too large: {0} bytes exceeds limit of {1} bytes")]
    TooLarge(usize, usize),

    /// No provider is registered under the requested name.
    #[error("unknown provider")]
    UnknownProvider(String),

    /// HTTP client could not be built or a header was invalid.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

impl MetadataError {
    /// Create a parse error for `value` interpreted as `what`.
    pub fn parse(
        what: impl Into<String>,
        value: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Self::Parse {
            what: what.into(),
            value: value.into(),
            reason: reason.to_string(),
        }
    }
}

/// Cause of a single failed attempt; retried by the client.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection, timeout or body-read failure.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Server-side (5xx) status.
    #[error("server returned http {0}")]
    Status(u16),
}
