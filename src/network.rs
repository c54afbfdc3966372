//! Synthesis of canonical network interfaces from provider interface listings.
//!
//! Providers that expose structured per-interface data (public and private
//! interface lists with IPv4, IPv6 and anchor addresses) are folded into one
//! [`NetworkInterface`] per hardware address. Entries sharing a MAC are merged
//! by appending their addresses and routes, never by replacing or
//! deduplicating them.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnetwork::IpNetwork;
use mac_address::MacAddress;
use serde::{Deserialize, Deserializer};

use crate::error::MetadataError;
use crate::instance::{NetworkInterface, NetworkRoute};

/// Provider-native address entry.
///
/// IPv4 entries carry a dotted `netmask`, IPv6 entries a `cidr` prefix length.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AddressDescription {
    #[serde(default, deserialize_with = "null_as_default")]
    pub ip_address: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub netmask: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cidr: u8,
    #[serde(default, deserialize_with = "null_as_default")]
    pub gateway: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceKind {
    Public,
    #[default]
    Private,
    #[serde(other)]
    Other,
}

/// Provider-native interface entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct InterfaceDescription {
    pub ipv4: Option<AddressDescription>,
    pub ipv6: Option<AddressDescription>,
    pub anchor_ipv4: Option<AddressDescription>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub mac: String,
    #[serde(rename = "type", default)]
    pub kind: InterfaceKind,
}

impl InterfaceDescription {
    pub fn is_public(&self) -> bool {
        self.kind == InterfaceKind::Public
    }
}

/// Decode a JSON `null` as the type's default value.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Build the canonical interface set.
///
/// Private interfaces are processed before public ones. Any unparseable
/// nameserver, MAC, address, mask or gateway aborts the whole synthesis.
pub fn synthesize(
    private: &[InterfaceDescription],
    public: &[InterfaceDescription],
    nameservers: &[String],
) -> Result<Vec<NetworkInterface>, MetadataError> {
    let nameservers = parse_nameservers(nameservers)?;

    let merged = private
        .iter()
        .chain(public)
        .try_fold(InterfaceMap::default(), |mut map, iface| {
            let mac = parse_mac(&iface.mac)?;
            let (addresses, routes) = parse_interface(iface)?;
            map.append(mac, addresses, routes);
            Ok::<_, MetadataError>(map)
        })?;

    Ok(merged.into_interfaces(&nameservers))
}

/// Per-MAC accumulator that keeps first-seen order.
#[derive(Debug, Default)]
struct InterfaceMap {
    index: HashMap<[u8; 6], usize>,
    entries: Vec<(MacAddress, Vec<IpNetwork>, Vec<NetworkRoute>)>,
}

impl InterfaceMap {
    fn append(&mut self, mac: MacAddress, addresses: Vec<IpNetwork>, routes: Vec<NetworkRoute>) {
        match self.index.get(&mac.bytes()) {
            Some(&i) => {
                let (_, existing_addresses, existing_routes) = &mut self.entries[i];
                existing_addresses.extend(addresses);
                existing_routes.extend(routes);
            }
            None => {
                self.index.insert(mac.bytes(), self.entries.len());
                self.entries.push((mac, addresses, routes));
            }
        }
    }

    /// MACs that never acquired an address are dropped.
    fn into_interfaces(self, nameservers: &[IpAddr]) -> Vec<NetworkInterface> {
        self.entries
            .into_iter()
            .filter(|(_, addresses, _)| !addresses.is_empty())
            .map(|(mac, ip_addresses, routes)| NetworkInterface {
                hardware_address: mac,
                nameservers: nameservers.to_vec(),
                ip_addresses,
                routes,
            })
            .collect()
    }
}

fn parse_interface(
    iface: &InterfaceDescription,
) -> Result<(Vec<IpNetwork>, Vec<NetworkRoute>), MetadataError> {
    let public = iface.is_public();
    let mut addresses = Vec::new();
    let mut routes = Vec::new();

    if let Some(ipv4) = &iface.ipv4 {
        let address = parse_ipv4_address(ipv4)?;
        let route = parse_route(&ipv4.gateway, address)?;
        addresses.push(address);
        routes.push(route);
        if public {
            routes.push(NetworkRoute::default_via(route.gateway)?);
        }
    }
    if let Some(ipv6) = &iface.ipv6 {
        let address = parse_ipv6_address(ipv6)?;
        let route = parse_route(&ipv6.gateway, address)?;
        addresses.push(address);
        routes.push(route);
        if public {
            routes.push(NetworkRoute::default_via(route.gateway)?);
        }
    }
    // Anchor addresses never get a default route.
    if let Some(anchor) = &iface.anchor_ipv4 {
        let address = parse_ipv4_address(anchor)?;
        let route = parse_route(&anchor.gateway, address)?;
        addresses.push(address);
        routes.push(route);
    }

    Ok((addresses, routes))
}

fn parse_mac(mac: &str) -> Result<MacAddress, MetadataError> {
    mac.parse()
        .map_err(|e| MetadataError::parse("MAC address", mac, e))
}

fn parse_nameservers(servers: &[String]) -> Result<Vec<IpAddr>, MetadataError> {
    servers
        .iter()
        .map(|server| {
            server
                .parse()
                .map_err(|e| MetadataError::parse("nameserver address", server.as_str(), e))
        })
        .collect()
}

/// Parse an address and dotted netmask into an address/prefix pair.
pub fn parse_ipv4_address(address: &AddressDescription) -> Result<IpNetwork, MetadataError> {
    let ip: Ipv4Addr = address
        .ip_address
        .parse()
        .map_err(|e| MetadataError::parse("IPv4 address", address.ip_address.as_str(), e))?;
    let mask: Ipv4Addr = address
        .netmask
        .parse()
        .map_err(|e| MetadataError::parse("IPv4 mask", address.netmask.as_str(), e))?;
    let prefix = ipnetwork::ipv4_mask_to_prefix(mask)
        .map_err(|e| MetadataError::parse("IPv4 mask", address.netmask.as_str(), e))?;

    IpNetwork::new(IpAddr::V4(ip), prefix)
        .map_err(|e| MetadataError::parse("IPv4 network", address.ip_address.as_str(), e))
}

/// Parse an address and CIDR prefix length into an address/prefix pair.
pub fn parse_ipv6_address(address: &AddressDescription) -> Result<IpNetwork, MetadataError> {
    let ip: Ipv6Addr = address
        .ip_address
        .parse()
        .map_err(|e| MetadataError::parse("IPv6 address", address.ip_address.as_str(), e))?;

    IpNetwork::new(IpAddr::V6(ip), address.cidr).map_err(|e| {
        MetadataError::parse(
            "IPv6 prefix length",
            format!("{}/{}", address.ip_address, address.cidr),
            e,
        )
    })
}

fn parse_route(gateway: &str, destination: IpNetwork) -> Result<NetworkRoute, MetadataError> {
    let gateway = gateway
        .parse()
        .map_err(|e| MetadataError::parse("gateway address", gateway, e))?;
    Ok(NetworkRoute {
        destination,
        gateway,
    })
}
