//! Cloud provider enumeration.

use std::fmt;
use std::str::FromStr;

use crate::error::MetadataError;

/// Supported cloud providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloudProvider {
    /// Amazon EC2
    Ec2,
    /// Google Compute Engine
    Gce,
    /// OpenStack EC2-compatible metadata service
    OpenStack,
    /// DigitalOcean droplet metadata
    DigitalOcean,
}

impl CloudProvider {
    /// All providers, in lookup order.
    pub const ALL: [CloudProvider; 4] = [
        CloudProvider::Ec2,
        CloudProvider::Gce,
        CloudProvider::OpenStack,
        CloudProvider::DigitalOcean,
    ];

    /// Name used to select the provider.
    pub fn name(&self) -> &'static str {
        match self {
            CloudProvider::Ec2 => "ec2",
            CloudProvider::Gce => "gce",
            CloudProvider::OpenStack => "openstack-metadata",
            CloudProvider::DigitalOcean => "digitalocean",
        }
    }
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloudProvider::Ec2 => write!(f, "EC2"),
            CloudProvider::Gce => write!(f, "GCE"),
            CloudProvider::OpenStack => write!(f, "OpenStack"),
            CloudProvider::DigitalOcean => write!(f, "DigitalOcean"),
        }
    }
}

impl FromStr for CloudProvider {
    type Err = MetadataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CloudProvider::ALL
            .into_iter()
            .find(|provider| provider.name() == s)
            .ok_or_else(|| MetadataError::UnknownProvider(s.to_string()))
    }
}
