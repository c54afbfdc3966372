//! Per-provider metadata fetchers.
//!
//! Each provider fetches its keys through a [`RetryClient`] in sequence and
//! fails on the first fatal error; no partial [`Metadata`](crate::Metadata)
//! is ever returned.

pub mod digitalocean;
pub mod ec2;
pub mod gce;
pub mod openstack;

use std::net::IpAddr;

use crate::client::RetryClient;
use crate::error::MetadataError;
use crate::instance::parse_ip;

/// Decode a response body as UTF-8 text.
pub(crate) fn into_text(key: &str, body: Vec<u8>) -> Result<String, MetadataError> {
    String::from_utf8(body).map_err(|_| MetadataError::Utf8 {
        key: key.to_string(),
    })
}

/// Fetch `path` as text; 404 is `None`, an empty 200 body is `Some("")`.
pub(crate) async fn fetch_text(
    client: &RetryClient,
    path: &str,
) -> Result<Option<String>, MetadataError> {
    client
        .fetch(path)
        .await?
        .map(|body| into_text(path, body))
        .transpose()
}

/// Parse an optional scalar as an IP literal.
pub(crate) fn optional_ip(
    key: &str,
    value: Option<String>,
) -> Result<Option<IpAddr>, MetadataError> {
    value.map(|value| parse_ip(key, &value)).transpose()
}
