//! CloudMetadata struct and core implementation.

use tracing::info;

use crate::client::{RetryClient, RetryConfig, LINK_LOCAL_BASE_URL};
use crate::error::MetadataError;
use crate::instance::Metadata;
use crate::provider::CloudProvider;
use crate::providers::{digitalocean, ec2, gce, openstack};

/// Entry point for fetching normalized instance metadata.
///
/// # Example
///
/// ```ignore
/// use cloud_boot_metadata::{CloudMetadata, CloudProvider, MetadataError};
///
/// #[tokio::main]
/// async fn main() -> Result<(), MetadataError> {
///     let provider: CloudProvider = "digitalocean".parse()?;
///     let metadata = CloudMetadata::new(provider)?.fetch_metadata().await?;
///     println!("{}", metadata.hostname);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CloudMetadata {
    provider: CloudProvider,
    client: RetryClient,
}

impl CloudMetadata {
    /// Create a fetcher for `provider` against its well-known endpoint.
    pub fn new(provider: CloudProvider) -> Result<Self, MetadataError> {
        Self::with_config(provider, default_base_url(provider), RetryConfig::default())
    }

    /// Create a fetcher with a custom base URL.
    ///
    /// This is primarily useful for testing with mock servers.
    pub fn with_base_url(provider: CloudProvider, base_url: &str) -> Result<Self, MetadataError> {
        Self::with_config(provider, base_url, RetryConfig::default())
    }

    /// Create a fetcher with custom retry settings.
    pub fn with_config(
        provider: CloudProvider,
        base_url: &str,
        config: RetryConfig,
    ) -> Result<Self, MetadataError> {
        let headers = match provider {
            CloudProvider::Gce => gce::headers(),
            _ => Default::default(),
        };
        let client = RetryClient::new(config, base_url, headers)?;
        Ok(Self { provider, client })
    }

    /// Get the selected cloud provider.
    pub fn provider(&self) -> CloudProvider {
        self.provider
    }

    /// Get the underlying retry client.
    pub fn client(&self) -> &RetryClient {
        &self.client
    }

    /// Fetch and normalize the instance metadata.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error from any sub-fetch: exhausted retries,
    /// an unparseable value, or a non-retryable HTTP status.
    pub async fn fetch_metadata(&self) -> Result<Metadata, MetadataError> {
        info!(provider = %self.provider, base_url = self.client.base_url(), "fetching metadata");
        let metadata = match self.provider {
            CloudProvider::Ec2 => ec2::fetch_metadata(&self.client).await,
            CloudProvider::Gce => gce::fetch_metadata(&self.client).await,
            CloudProvider::OpenStack => openstack::fetch_metadata(&self.client).await,
            CloudProvider::DigitalOcean => digitalocean::fetch_metadata(&self.client).await,
        }?;
        info!(
            provider = %self.provider,
            attributes = metadata.attributes.len(),
            ssh_keys = metadata.ssh_keys.len(),
            interfaces = metadata.network.len(),
            "fetched metadata"
        );
        Ok(metadata)
    }
}

/// Well-known metadata endpoint for `provider`.
pub fn default_base_url(provider: CloudProvider) -> &'static str {
    match provider {
        CloudProvider::Gce => gce::DEFAULT_BASE_URL,
        CloudProvider::Ec2 | CloudProvider::OpenStack | CloudProvider::DigitalOcean => {
            LINK_LOCAL_BASE_URL
        }
    }
}
