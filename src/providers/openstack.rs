//! OpenStack EC2-compatible metadata.

use super::{fetch_text, optional_ip};
use crate::client::RetryClient;
use crate::error::MetadataError;
use crate::instance::{Attributes, Metadata};
use crate::ssh_keys;

/// Metadata API path prefix.
const API_PATH: &str = "/latest/meta-data";

/// Fetch `key`, treating an empty value as absent.
async fn fetch_string(client: &RetryClient, key: &str) -> Result<Option<String>, MetadataError> {
    Ok(fetch_text(client, &format!("{API_PATH}/{key}"))
        .await?
        .filter(|value| !value.is_empty()))
}

/// Fetch `key` and parse it as an IP literal.
async fn fetch_ip(client: &RetryClient, key: &str) -> Result<Option<String>, MetadataError> {
    let ip = optional_ip(key, fetch_string(client, key).await?)?;
    Ok(ip.map(|ip| ip.to_string()))
}

/// Fetch and normalize OpenStack metadata.
pub async fn fetch_metadata(client: &RetryClient) -> Result<Metadata, MetadataError> {
    let instance_id = fetch_string(client, "instance-id").await?;
    let local = fetch_ip(client, "local-ipv4").await?;
    let public = fetch_ip(client, "public-ipv4").await?;
    let hostname = fetch_string(client, "hostname").await?;

    let mut attributes = Attributes::new();
    attributes.set_opt("OPENSTACK_INSTANCE_ID", instance_id);
    attributes.set_opt("OPENSTACK_IPV4_LOCAL", local);
    attributes.set_opt("OPENSTACK_IPV4_PUBLIC", public);
    attributes.set_opt("OPENSTACK_HOSTNAME", hostname.clone());

    let ssh_keys = fetch_ssh_keys(client).await?;

    Ok(Metadata {
        attributes: attributes.into_inner(),
        hostname: hostname.unwrap_or_default(),
        ssh_keys,
        network: Vec::new(),
    })
}

/// Only the first listed key is served through this metadata path.
async fn fetch_ssh_keys(client: &RetryClient) -> Result<Vec<String>, MetadataError> {
    let Some(listing) = fetch_string(client, "public-keys").await? else {
        return Ok(Vec::new());
    };
    let Some(index) = ssh_keys::first_key_index(&listing)? else {
        return Ok(Vec::new());
    };

    let key = format!("public-keys/{index}/openssh-key");
    match fetch_string(client, &key).await? {
        Some(body) => Ok(vec![body]),
        None => Err(MetadataError::MissingKey(key)),
    }
}
