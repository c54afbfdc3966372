//! EC2 instance metadata.

use serde::Deserialize;
use tracing::{debug, warn};

use super::{fetch_text, optional_ip};
use crate::client::RetryClient;
use crate::error::MetadataError;
use crate::instance::{Attributes, Metadata};
use crate::ssh_keys;

/// Metadata API version prefix.
const API_PATH: &str = "/2009-04-04";

/// Instance identity document path.
const IDENTITY_DOCUMENT_KEY: &str = "dynamic/instance-identity/document";

/// Public key listing path.
const PUBLIC_KEYS_KEY: &str = "meta-data/public-keys";

/// Fields of the instance identity document that are used.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityDocument {
    #[serde(default)]
    region: Option<String>,
}

async fn fetch_string(client: &RetryClient, key: &str) -> Result<Option<String>, MetadataError> {
    fetch_text(client, &format!("{API_PATH}/{key}")).await
}

/// Fetch and normalize EC2 metadata.
pub async fn fetch_metadata(client: &RetryClient) -> Result<Metadata, MetadataError> {
    let instance_id = fetch_string(client, "meta-data/instance-id").await?;
    let public = optional_ip(
        "meta-data/public-ipv4",
        fetch_string(client, "meta-data/public-ipv4").await?,
    )?;
    let local = optional_ip(
        "meta-data/local-ipv4",
        fetch_string(client, "meta-data/local-ipv4").await?,
    )?;
    let hostname = fetch_string(client, "meta-data/hostname").await?;
    let availability_zone = fetch_string(client, "meta-data/placement/availability-zone").await?;
    let region = fetch_region(client).await?;
    let ssh_keys = fetch_ssh_keys(client).await?;

    let mut attributes = Attributes::new();
    attributes.set_opt("EC2_INSTANCE_ID", instance_id);
    attributes.set_opt("EC2_IPV4_LOCAL", local.map(|ip| ip.to_string()));
    attributes.set_opt("EC2_IPV4_PUBLIC", public.map(|ip| ip.to_string()));
    attributes.set_opt("EC2_HOSTNAME", hostname.clone());
    attributes.set_opt("EC2_AVAILABILITY_ZONE", availability_zone);
    attributes.set_opt("EC2_REGION", region);

    Ok(Metadata {
        attributes: attributes.into_inner(),
        hostname: hostname.unwrap_or_default(),
        ssh_keys,
        network: Vec::new(),
    })
}

async fn fetch_region(client: &RetryClient) -> Result<Option<String>, MetadataError> {
    let Some(blob) = fetch_string(client, IDENTITY_DOCUMENT_KEY).await? else {
        return Ok(None);
    };
    let document: IdentityDocument =
        serde_json::from_str(&blob).map_err(|source| MetadataError::Json {
            key: IDENTITY_DOCUMENT_KEY.to_string(),
            source,
        })?;
    Ok(document.region.filter(|region| !region.is_empty()))
}

async fn fetch_ssh_keys(client: &RetryClient) -> Result<Vec<String>, MetadataError> {
    let Some(listing) = fetch_string(client, PUBLIC_KEYS_KEY).await? else {
        return Ok(Vec::new());
    };

    let indices = ssh_keys::deduplicated_key_indices(&listing)?;
    debug!(count = indices.len(), "fetching EC2 public keys");

    let mut keys = Vec::with_capacity(indices.len());
    for index in indices {
        let key = format!("{PUBLIC_KEYS_KEY}/{index}/openssh-key");
        match fetch_string(client, &key).await? {
            Some(body) => keys.push(body),
            None => warn!(%index, "public key listed but not served"),
        }
    }
    Ok(keys)
}
