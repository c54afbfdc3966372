//! Normalized instance metadata records.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnetwork::{IpNetwork, IpNetworkError, Ipv4Network, Ipv6Network};
use mac_address::MacAddress;
use serde::{Serialize, Serializer};

use crate::error::MetadataError;

/// Instance metadata normalized across providers.
///
/// Built once per fetch and returned only when fully populated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    /// Provider-specific environment variable name to value.
    pub attributes: BTreeMap<String, String>,
    /// May be empty when the provider reports none.
    pub hostname: String,
    /// Public keys in provider-reported order.
    pub ssh_keys: Vec<String>,
    /// One entry per distinct hardware address; order is not significant.
    pub network: Vec<NetworkInterface>,
}

/// Addresses and routes attached to one hardware address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkInterface {
    #[serde(serialize_with = "serialize_mac")]
    pub hardware_address: MacAddress,
    pub nameservers: Vec<IpAddr>,
    pub ip_addresses: Vec<IpNetwork>,
    pub routes: Vec<NetworkRoute>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NetworkRoute {
    pub destination: IpNetwork,
    pub gateway: IpAddr,
}

impl NetworkRoute {
    /// Route matching every destination of the gateway's address family.
    pub fn default_via(gateway: IpAddr) -> Result<Self, MetadataError> {
        let destination = unspecified_network(gateway)
            .map_err(|e| MetadataError::parse("default route", gateway.to_string(), e))?;
        Ok(Self {
            destination,
            gateway,
        })
    }

    /// `0.0.0.0/0` or `::/0`.
    pub fn is_default(&self) -> bool {
        self.destination.prefix() == 0 && self.destination.ip().is_unspecified()
    }
}

/// `0.0.0.0/0` or `::/0`, matching the family of `ip`.
fn unspecified_network(ip: IpAddr) -> Result<IpNetwork, IpNetworkError> {
    match ip {
        IpAddr::V4(_) => Ipv4Network::new(Ipv4Addr::UNSPECIFIED, 0).map(IpNetwork::V4),
        IpAddr::V6(_) => Ipv6Network::new(Ipv6Addr::UNSPECIFIED, 0).map(IpNetwork::V6),
    }
}

fn serialize_mac<S: Serializer>(mac: &MacAddress, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(mac)
}

/// Accumulates attributes, dropping values the provider did not report.
#[derive(Debug, Default)]
pub struct Attributes(BTreeMap<String, String>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Insert `value` unless it is absent.
    pub fn set_opt(&mut self, key: impl Into<String>, value: Option<impl Into<String>>) {
        if let Some(value) = value {
            self.set(key, value);
        }
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }
}

/// Parse `value` as an IP literal, naming `key` on failure.
pub fn parse_ip(key: &str, value: &str) -> Result<IpAddr, MetadataError> {
    value
        .trim()
        .parse()
        .map_err(|e| MetadataError::parse(format!("IP address ({key})"), value, e))
}
