//! Google Compute Engine metadata.
//!
//! The GCE metadata server answers 200 with an empty body for keys that have
//! no value, so an empty body is treated as absent here.

use reqwest::header::HeaderMap;

use super::{fetch_text, optional_ip};
use crate::client::{static_header, RetryClient};
use crate::error::MetadataError;
use crate::instance::{Attributes, Metadata};
use crate::ssh_keys;

/// Metadata server base URL.
pub const DEFAULT_BASE_URL: &str = "http://metadata.google.internal";

/// Metadata API path prefix.
const API_PATH: &str = "/computeMetadata/v1";

/// Required header for GCE metadata requests.
const METADATA_FLAVOR_HEADER: &str = "metadata-flavor";

/// Required header value for GCE metadata requests.
const METADATA_FLAVOR_VALUE: &str = "Google";

/// Headers every GCE metadata request must carry.
pub fn headers() -> HeaderMap {
    static_header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR_VALUE)
}

async fn fetch_string(client: &RetryClient, key: &str) -> Result<Option<String>, MetadataError> {
    Ok(fetch_text(client, &format!("{API_PATH}/{key}"))
        .await?
        .filter(|value| !value.is_empty()))
}

/// Fetch and normalize GCE metadata.
pub async fn fetch_metadata(client: &RetryClient) -> Result<Metadata, MetadataError> {
    let external_key = "instance/network-interfaces/0/access-configs/0/external-ip";
    let public = optional_ip(external_key, fetch_string(client, external_key).await?)?;
    let local_key = "instance/network-interfaces/0/ip";
    let local = optional_ip(local_key, fetch_string(client, local_key).await?)?;
    let hostname = fetch_string(client, "instance/hostname").await?;
    let ssh_keys = fetch_all_ssh_keys(client).await?;

    let mut attributes = Attributes::new();
    attributes.set_opt("GCE_IP_LOCAL_0", local.map(|ip| ip.to_string()));
    attributes.set_opt("GCE_IP_EXTERNAL_0", public.map(|ip| ip.to_string()));
    attributes.set_opt("GCE_HOSTNAME", hostname.clone());

    Ok(Metadata {
        attributes: attributes.into_inner(),
        hostname: hostname.unwrap_or_default(),
        ssh_keys,
        network: Vec::new(),
    })
}

/// Instance keys plus project keys, unless project keys are blocked.
///
/// The deprecated instance-level `sshKeys` attribute replaces everything
/// else when present.
async fn fetch_all_ssh_keys(client: &RetryClient) -> Result<Vec<String>, MetadataError> {
    if let Some(keys) = fetch_ssh_keys(client, "instance/attributes/sshKeys").await? {
        return Ok(keys);
    }

    let mut keys = fetch_ssh_keys(client, "instance/attributes/ssh-keys")
        .await?
        .unwrap_or_default();

    let block_project_keys = fetch_string(client, "instance/attributes/block-project-ssh-keys")
        .await?
        .is_some_and(|value| parse_bool(&value));
    if block_project_keys {
        return Ok(keys);
    }

    if let Some(project_keys) = fetch_ssh_keys(client, "project/attributes/sshKeys").await? {
        keys.extend(project_keys);
    }
    Ok(keys)
}

async fn fetch_ssh_keys(
    client: &RetryClient,
    key: &str,
) -> Result<Option<Vec<String>>, MetadataError> {
    fetch_string(client, key)
        .await?
        .map(|listing| ssh_keys::parse_colon_keys(&listing))
        .transpose()
}

fn parse_bool(value: &str) -> bool {
    matches!(value, "1" | "t" | "T" | "true" | "TRUE" | "True")
}
