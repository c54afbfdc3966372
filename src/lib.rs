//! Boot-time instance metadata for EC2, GCE, OpenStack, and DigitalOcean.
//!
//! This crate queries a cloud provider's instance-metadata service and
//! normalizes the answer into one [`Metadata`] record: environment-style
//! attributes, the hostname, SSH public keys, and network interfaces with
//! their addresses and routes.
//!
//! # Features
//!
//! - Bounded exponential backoff on connection errors and 5xx responses
//! - 404 (and, on GCE, an empty body) means "absent", never an error
//! - Structured per-interface network data folded into one interface per MAC
//! - All-or-nothing: any fatal sub-fetch aborts the whole fetch
//!
//! # Example
//!
//! ```ignore
//! use cloud_boot_metadata::{CloudMetadata, CloudProvider, MetadataError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), MetadataError> {
//!     let metadata = CloudMetadata::new(CloudProvider::Ec2)?
//!         .fetch_metadata()
//!         .await?;
//!
//!     for (key, value) in &metadata.attributes {
//!         println!("{key}={value}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Provider-Specific Behavior
//!
//! | Provider | Name | Source | SSH keys |
//! |----------|------|--------|----------|
//! | EC2 | `ec2` | one key per request | `index=name` list, deduplicated by name |
//! | GCE | `gce` | one key per request, empty body = absent | `user:key` lines |
//! | OpenStack | `openstack-metadata` | one key per request | first `index=name` entry |
//! | DigitalOcean | `digitalocean` | single JSON document | JSON array |

pub mod client;
mod error;
mod instance;
mod metadata;
pub mod network;
mod provider;
mod providers;
pub mod ssh_keys;

pub use client::{RetryClient, RetryConfig};
pub use error::{MetadataError, TransportError};
pub use instance::{Metadata, NetworkInterface, NetworkRoute};
pub use metadata::{default_base_url, CloudMetadata};
pub use provider::CloudProvider;
