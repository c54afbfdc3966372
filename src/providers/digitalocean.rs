//! DigitalOcean droplet metadata.
//!
//! The whole document is served as one JSON object, including structured
//! per-interface network data that is fed to [`network::synthesize`].

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::debug;

use super::into_text;
use crate::client::RetryClient;
use crate::error::MetadataError;
use crate::instance::{parse_ip, Attributes, Metadata};
use crate::network::{self, null_as_default, InterfaceDescription};

/// Droplet metadata document path.
const METADATA_PATH: &str = "/metadata/v1.json";

#[derive(Debug, Default, Deserialize)]
struct Droplet {
    #[serde(default, deserialize_with = "null_as_default")]
    hostname: String,
    #[serde(default, deserialize_with = "null_as_default")]
    region: String,
    #[serde(default)]
    interfaces: Interfaces,
    #[serde(default)]
    public_keys: Option<Vec<String>>,
    #[serde(default)]
    dns: Dns,
}

#[derive(Debug, Default, Deserialize)]
struct Interfaces {
    #[serde(default)]
    public: Option<Vec<InterfaceDescription>>,
    #[serde(default)]
    private: Option<Vec<InterfaceDescription>>,
}

#[derive(Debug, Default, Deserialize)]
struct Dns {
    #[serde(default)]
    nameservers: Option<Vec<String>>,
}

/// Fetch and normalize DigitalOcean metadata.
pub async fn fetch_metadata(client: &RetryClient) -> Result<Metadata, MetadataError> {
    let body = client
        .fetch(METADATA_PATH)
        .await?
        .ok_or_else(|| MetadataError::MissingKey(METADATA_PATH.to_string()))?;
    let droplet = parse_droplet(&into_text(METADATA_PATH, body)?)?;
    into_metadata(droplet)
}

fn parse_droplet(document: &str) -> Result<Droplet, MetadataError> {
    serde_json::from_str(document).map_err(|source| MetadataError::Json {
        key: METADATA_PATH.to_string(),
        source,
    })
}

fn into_metadata(droplet: Droplet) -> Result<Metadata, MetadataError> {
    let public = droplet.interfaces.public.unwrap_or_default();
    let private = droplet.interfaces.private.unwrap_or_default();
    let nameservers = droplet.dns.nameservers.unwrap_or_default();

    let attributes = parse_attributes(&droplet.hostname, &droplet.region, &public, &private)?;
    let network = network::synthesize(&private, &public, &nameservers)?;
    debug!(interfaces = network.len(), "synthesized DigitalOcean network");

    Ok(Metadata {
        attributes,
        hostname: droplet.hostname,
        ssh_keys: droplet.public_keys.unwrap_or_default(),
        network,
    })
}

fn parse_attributes(
    hostname: &str,
    region: &str,
    public: &[InterfaceDescription],
    private: &[InterfaceDescription],
) -> Result<BTreeMap<String, String>, MetadataError> {
    let mut attributes = Attributes::new();
    attributes.set_opt("DIGITALOCEAN_HOSTNAME", Some(hostname).filter(|h| !h.is_empty()));
    attributes.set_opt("DIGITALOCEAN_REGION", Some(region).filter(|r| !r.is_empty()));

    for (i, iface) in public.iter().enumerate() {
        set_ip(&mut attributes, &format!("DIGITALOCEAN_IPV4_PUBLIC_{i}"), &iface.ipv4)?;
        set_ip(&mut attributes, &format!("DIGITALOCEAN_IPV6_PUBLIC_{i}"), &iface.ipv6)?;
        set_ip(
            &mut attributes,
            &format!("DIGITALOCEAN_IPV4_ANCHOR_{i}"),
            &iface.anchor_ipv4,
        )?;
    }
    for (i, iface) in private.iter().enumerate() {
        set_ip(&mut attributes, &format!("DIGITALOCEAN_IPV4_PRIVATE_{i}"), &iface.ipv4)?;
        set_ip(&mut attributes, &format!("DIGITALOCEAN_IPV6_PRIVATE_{i}"), &iface.ipv6)?;
    }

    Ok(attributes.into_inner())
}

fn set_ip(
    attributes: &mut Attributes,
    key: &str,
    address: &Option<network::AddressDescription>,
) -> Result<(), MetadataError> {
    if let Some(address) = address {
        let ip = parse_ip(key, &address.ip_address)?;
        attributes.set(key, ip.to_string());
    }
    Ok(())
}
