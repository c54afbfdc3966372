//! Integration tests using wiremock to simulate cloud metadata services.

use std::time::Duration;

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cloud_boot_metadata::{
    CloudMetadata, CloudProvider, MetadataError, RetryClient, RetryConfig, TransportError,
};

/// Retry settings that keep failing tests fast.
fn fast_config() -> RetryConfig {
    RetryConfig::default()
        .with_initial_backoff(Duration::from_millis(1))
        .with_max_backoff(Duration::from_millis(5))
        .with_max_attempts(3)
}

fn fast_client(server: &MockServer) -> RetryClient {
    RetryClient::new(fast_config(), &server.uri(), Default::default()).unwrap()
}

async fn mount_text(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

// =============================================================================
// Retry Client Tests
// =============================================================================

mod retry_client {
    use super::*;

    #[tokio::test]
    async fn test_present_body() {
        let server = MockServer::start().await;
        mount_text(&server, "/key", "value").await;

        let body = fast_client(&server).fetch("/key").await.unwrap();
        assert_eq!(body, Some(b"value".to_vec()));
    }

    #[tokio::test]
    async fn test_empty_body_is_present() {
        let server = MockServer::start().await;
        mount_text(&server, "/empty", "").await;

        let body = fast_client(&server).fetch("/empty").await.unwrap();
        assert_eq!(body, Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_not_found_is_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let body = fast_client(&server).fetch("/missing").await.unwrap();
        assert_eq!(body, None);
    }

    #[tokio::test]
    async fn test_server_error_exhausts_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let result = fast_client(&server).fetch("/flaky").await;
        match result {
            Err(MetadataError::RetriesExhausted {
                attempts, source, ..
            }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(source, TransportError::Status(503)));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_recovers_after_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        mount_text(&server, "/flaky", "finally").await;

        let body = fast_client(&server).fetch("/flaky").await.unwrap();
        assert_eq!(body, Some(b"finally".to_vec()));
    }

    #[tokio::test]
    async fn test_connection_error_exhausts_attempts() {
        let client = RetryClient::new(fast_config(), "http://127.0.0.1:1", Default::default())
            .unwrap();

        let result = client.fetch("/key").await;
        match result {
            Err(MetadataError::RetriesExhausted {
                attempts, source, ..
            }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(source, TransportError::Request(_)));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_schedule_sleeps_between_ten_attempts() {
        let client = RetryClient::new(
            RetryConfig::default(),
            "http://127.0.0.1:1",
            Default::default(),
        )
        .unwrap();

        let start = tokio::time::Instant::now();
        let result = client.fetch("/key").await;
        let elapsed = start.elapsed();

        // 1 + 2 + 4 + 5 * 6 seconds of backoff between ten attempts.
        assert!(elapsed >= Duration::from_secs(41), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_secs(42), "elapsed {elapsed:?}");
        match result {
            Err(MetadataError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 10),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/forbidden"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let result = fast_client(&server).fetch("/forbidden").await;
        assert!(matches!(result, Err(MetadataError::Http(403))));
    }

    #[tokio::test]
    async fn test_body_size_limit() {
        let server = MockServer::start().await;
        mount_text(&server, "/big", &"x".repeat(1024)).await;

        let config = fast_config().with_max_body_size(100);
        let client = RetryClient::new(config, &server.uri(), Default::default()).unwrap();
        let result = client.fetch("/big").await;
        assert!(matches!(result, Err(MetadataError::TooLarge(_, 100))));
    }
}

// =============================================================================
// EC2 Tests
// =============================================================================

mod ec2 {
    use super::*;

    async fn setup_ec2_mock(server: &MockServer) {
        let prefix = "/2009-04-04";
        mount_text(server, &format!("{prefix}/meta-data/instance-id"), "i-0123456789").await;
        mount_text(server, &format!("{prefix}/meta-data/local-ipv4"), "172.31.10.20").await;
        mount_text(
            server,
            &format!("{prefix}/meta-data/hostname"),
            "ip-172-31-10-20.us-west-2.compute.internal",
        )
        .await;
        mount_text(
            server,
            &format!("{prefix}/meta-data/placement/availability-zone"),
            "us-west-2a",
        )
        .await;
        mount_text(
            server,
            &format!("{prefix}/dynamic/instance-identity/document"),
            r#"{"instanceId": "i-0123456789", "region": "us-west-2"}"#,
        )
        .await;
        mount_text(
            server,
            &format!("{prefix}/meta-data/public-keys"),
            "0=alice\n1=bob\n2=alice",
        )
        .await;
        mount_text(
            server,
            &format!("{prefix}/meta-data/public-keys/1/openssh-key"),
            "ssh-rsa BOB",
        )
        .await;
        mount_text(
            server,
            &format!("{prefix}/meta-data/public-keys/2/openssh-key"),
            "ssh-rsa ALICE",
        )
        .await;
    }

    fn ec2(server: &MockServer) -> CloudMetadata {
        CloudMetadata::with_config(CloudProvider::Ec2, &server.uri(), fast_config()).unwrap()
    }

    #[tokio::test]
    async fn test_ec2_fetch_metadata() {
        let server = MockServer::start().await;
        setup_ec2_mock(&server).await;

        let metadata = ec2(&server).fetch_metadata().await.unwrap();
        let attrs = &metadata.attributes;

        assert_eq!(attrs["EC2_INSTANCE_ID"], "i-0123456789");
        assert_eq!(attrs["EC2_IPV4_LOCAL"], "172.31.10.20");
        assert_eq!(attrs["EC2_HOSTNAME"], "ip-172-31-10-20.us-west-2.compute.internal");
        assert_eq!(attrs["EC2_AVAILABILITY_ZONE"], "us-west-2a");
        assert_eq!(attrs["EC2_REGION"], "us-west-2");
        assert_eq!(metadata.hostname, "ip-172-31-10-20.us-west-2.compute.internal");
        assert!(metadata.network.is_empty());
    }

    #[tokio::test]
    async fn test_ec2_absent_public_ip_is_omitted() {
        let server = MockServer::start().await;
        setup_ec2_mock(&server).await;

        let metadata = ec2(&server).fetch_metadata().await.unwrap();
        assert!(!metadata.attributes.contains_key("EC2_IPV4_PUBLIC"));
    }

    #[tokio::test]
    async fn test_ec2_ssh_keys_deduplicated_by_name() {
        let server = MockServer::start().await;
        setup_ec2_mock(&server).await;

        let mut keys = ec2(&server).fetch_metadata().await.unwrap().ssh_keys;
        keys.sort();
        assert_eq!(keys, vec!["ssh-rsa ALICE", "ssh-rsa BOB"]);
    }

    #[tokio::test]
    async fn test_ec2_no_keys() {
        let server = MockServer::start().await;
        mount_text(&server, "/2009-04-04/meta-data/instance-id", "i-1").await;

        let metadata = ec2(&server).fetch_metadata().await.unwrap();
        assert!(metadata.ssh_keys.is_empty());
        assert_eq!(metadata.attributes.len(), 1);
        assert_eq!(metadata.hostname, "");
    }

    #[tokio::test]
    async fn test_ec2_malformed_ip_is_error() {
        let server = MockServer::start().await;
        mount_text(&server, "/2009-04-04/meta-data/local-ipv4", "not-an-ip").await;

        let result = ec2(&server).fetch_metadata().await;
        assert!(matches!(result, Err(MetadataError::Parse { .. })));
    }

    #[tokio::test]
    async fn test_ec2_malformed_key_listing_is_error() {
        let server = MockServer::start().await;
        mount_text(&server, "/2009-04-04/meta-data/public-keys", "0=alice\nbroken").await;

        let result = ec2(&server).fetch_metadata().await;
        assert!(matches!(result, Err(MetadataError::Parse { ref value, .. }) if value == "broken"));
    }

    #[tokio::test]
    async fn test_ec2_invalid_identity_document() {
        let server = MockServer::start().await;
        mount_text(&server, "/2009-04-04/dynamic/instance-identity/document", "{").await;

        let result = ec2(&server).fetch_metadata().await;
        assert!(matches!(result, Err(MetadataError::Json { .. })));
    }

    #[tokio::test]
    async fn test_ec2_server_error_aborts_fetch() {
        let server = MockServer::start().await;
        setup_ec2_mock(&server).await;
        Mock::given(method("GET"))
            .and(path("/2009-04-04/meta-data/hostname"))
            .respond_with(ResponseTemplate::new(500))
            .with_priority(1)
            .mount(&server)
            .await;

        let result = ec2(&server).fetch_metadata().await;
        assert!(matches!(
            result,
            Err(MetadataError::RetriesExhausted { attempts: 3, .. })
        ));
    }
}

// =============================================================================
// GCE Tests
// =============================================================================

mod gce {
    use super::*;

    const PREFIX: &str = "/computeMetadata/v1";

    async fn mount_gce(server: &MockServer, key: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(format!("{PREFIX}/{key}")))
            .and(header("Metadata-Flavor", "Google"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    fn gce(server: &MockServer) -> CloudMetadata {
        CloudMetadata::with_config(CloudProvider::Gce, &server.uri(), fast_config()).unwrap()
    }

    #[tokio::test]
    async fn test_gce_fetch_metadata() {
        let server = MockServer::start().await;
        mount_gce(&server, "instance/network-interfaces/0/ip", "10.128.0.2").await;
        mount_gce(
            &server,
            "instance/network-interfaces/0/access-configs/0/external-ip",
            "35.1.2.3",
        )
        .await;
        mount_gce(&server, "instance/hostname", "vm.c.project.internal").await;

        let metadata = gce(&server).fetch_metadata().await.unwrap();
        assert_eq!(metadata.attributes["GCE_IP_LOCAL_0"], "10.128.0.2");
        assert_eq!(metadata.attributes["GCE_IP_EXTERNAL_0"], "35.1.2.3");
        assert_eq!(metadata.attributes["GCE_HOSTNAME"], "vm.c.project.internal");
        assert_eq!(metadata.hostname, "vm.c.project.internal");
    }

    #[tokio::test]
    async fn test_gce_empty_body_is_absent() {
        let server = MockServer::start().await;
        mount_gce(&server, "instance/network-interfaces/0/ip", "10.128.0.2").await;
        mount_gce(
            &server,
            "instance/network-interfaces/0/access-configs/0/external-ip",
            "",
        )
        .await;

        let metadata = gce(&server).fetch_metadata().await.unwrap();
        assert!(!metadata.attributes.contains_key("GCE_IP_EXTERNAL_0"));
        assert_eq!(metadata.attributes["GCE_IP_LOCAL_0"], "10.128.0.2");
    }

    #[tokio::test]
    async fn test_gce_instance_and_project_keys() {
        let server = MockServer::start().await;
        mount_gce(&server, "instance/attributes/ssh-keys", "core:ssh-rsa AAAA\n").await;
        mount_gce(&server, "instance/attributes/block-project-ssh-keys", "false").await;
        mount_gce(&server, "project/attributes/sshKeys", "admin:ssh-ed25519 BBBB").await;

        let metadata = gce(&server).fetch_metadata().await.unwrap();
        assert_eq!(metadata.ssh_keys, vec!["ssh-rsa AAAA", "ssh-ed25519 BBBB"]);
    }

    #[tokio::test]
    async fn test_gce_blocked_project_keys() {
        let server = MockServer::start().await;
        mount_gce(&server, "instance/attributes/ssh-keys", "core:ssh-rsa AAAA").await;
        mount_gce(&server, "instance/attributes/block-project-ssh-keys", "true").await;
        mount_gce(&server, "project/attributes/sshKeys", "admin:ssh-ed25519 BBBB").await;

        let metadata = gce(&server).fetch_metadata().await.unwrap();
        assert_eq!(metadata.ssh_keys, vec!["ssh-rsa AAAA"]);
    }

    #[tokio::test]
    async fn test_gce_deprecated_keys_win() {
        let server = MockServer::start().await;
        mount_gce(&server, "instance/attributes/sshKeys", "old:ssh-rsa OLD").await;
        mount_gce(&server, "instance/attributes/ssh-keys", "core:ssh-rsa AAAA").await;
        mount_gce(&server, "project/attributes/sshKeys", "admin:ssh-ed25519 BBBB").await;

        let metadata = gce(&server).fetch_metadata().await.unwrap();
        assert_eq!(metadata.ssh_keys, vec!["ssh-rsa OLD"]);
    }

    #[tokio::test]
    async fn test_gce_malformed_key_line() {
        let server = MockServer::start().await;
        mount_gce(&server, "instance/attributes/ssh-keys", "ssh-rsa AAAA").await;

        let result = gce(&server).fetch_metadata().await;
        assert!(matches!(result, Err(MetadataError::Parse { .. })));
    }
}

// =============================================================================
// OpenStack Tests
// =============================================================================

mod openstack {
    use super::*;

    const PREFIX: &str = "/latest/meta-data";

    fn openstack(server: &MockServer) -> CloudMetadata {
        CloudMetadata::with_config(CloudProvider::OpenStack, &server.uri(), fast_config())
            .unwrap()
    }

    #[tokio::test]
    async fn test_openstack_fetch_metadata() {
        let server = MockServer::start().await;
        mount_text(&server, &format!("{PREFIX}/instance-id"), "i-00000042").await;
        mount_text(&server, &format!("{PREFIX}/local-ipv4"), "192.168.0.10").await;
        mount_text(&server, &format!("{PREFIX}/public-ipv4"), "").await;
        mount_text(&server, &format!("{PREFIX}/hostname"), "node.novalocal").await;
        mount_text(&server, &format!("{PREFIX}/public-keys"), "0=mykey\n1=other").await;
        mount_text(
            &server,
            &format!("{PREFIX}/public-keys/0/openssh-key"),
            "ssh-rsa MYKEY",
        )
        .await;

        let metadata = openstack(&server).fetch_metadata().await.unwrap();
        let attrs = &metadata.attributes;
        assert_eq!(attrs["OPENSTACK_INSTANCE_ID"], "i-00000042");
        assert_eq!(attrs["OPENSTACK_IPV4_LOCAL"], "192.168.0.10");
        assert!(!attrs.contains_key("OPENSTACK_IPV4_PUBLIC"));
        assert_eq!(attrs["OPENSTACK_HOSTNAME"], "node.novalocal");
        assert_eq!(metadata.hostname, "node.novalocal");
        assert_eq!(metadata.ssh_keys, vec!["ssh-rsa MYKEY"]);
    }

    #[tokio::test]
    async fn test_openstack_no_keys() {
        let server = MockServer::start().await;

        let metadata = openstack(&server).fetch_metadata().await.unwrap();
        assert!(metadata.ssh_keys.is_empty());
        assert!(metadata.attributes.is_empty());
    }

    #[tokio::test]
    async fn test_openstack_malformed_ip_is_error() {
        let server = MockServer::start().await;
        mount_text(&server, &format!("{PREFIX}/instance-id"), "i-00000042").await;
        mount_text(&server, &format!("{PREFIX}/local-ipv4"), "not-an-ip").await;

        let result = openstack(&server).fetch_metadata().await;
        assert!(
            matches!(result, Err(MetadataError::Parse { ref value, .. }) if value == "not-an-ip")
        );
    }

    #[tokio::test]
    async fn test_openstack_missing_key_body() {
        let server = MockServer::start().await;
        mount_text(&server, &format!("{PREFIX}/public-keys"), "0=mykey").await;

        let result = openstack(&server).fetch_metadata().await;
        assert!(matches!(result, Err(MetadataError::MissingKey(_))));
    }

    #[tokio::test]
    async fn test_openstack_malformed_key_index() {
        let server = MockServer::start().await;
        mount_text(&server, &format!("{PREFIX}/public-keys"), "0=my=key").await;

        let result = openstack(&server).fetch_metadata().await;
        assert!(matches!(result, Err(MetadataError::Parse { .. })));
    }
}

// =============================================================================
// DigitalOcean Tests
// =============================================================================

mod digitalocean {
    use super::*;

    const DROPLET: &str = r#"{
        "hostname": "droplet",
        "region": "ams3",
        "public_keys": ["ssh-rsa FIRST", "ssh-ed25519 SECOND"],
        "interfaces": {
            "public": [{
                "ipv4": {"ip_address": "203.0.113.7", "netmask": "255.255.255.0", "gateway": "203.0.113.1"},
                "mac": "36:b1:4a:e1:b1:51",
                "type": "public"
            }],
            "private": [{
                "ipv4": {"ip_address": "10.110.0.2", "netmask": "255.255.240.0", "gateway": "0.0.0.0"},
                "mac": "36:b1:4a:e1:b1:51",
                "type": "private"
            }]
        },
        "dns": {"nameservers": ["67.207.67.2", "67.207.67.3"]}
    }"#;

    async fn setup_droplet_mock(server: &MockServer, document: &str) {
        mount_text(server, "/metadata/v1.json", document).await;
    }

    fn digitalocean(server: &MockServer) -> CloudMetadata {
        CloudMetadata::with_config(CloudProvider::DigitalOcean, &server.uri(), fast_config())
            .unwrap()
    }

    #[tokio::test]
    async fn test_digitalocean_fetch_metadata() {
        let server = MockServer::start().await;
        setup_droplet_mock(&server, DROPLET).await;

        let metadata = digitalocean(&server).fetch_metadata().await.unwrap();
        assert_eq!(metadata.hostname, "droplet");
        assert_eq!(metadata.attributes["DIGITALOCEAN_REGION"], "ams3");
        assert_eq!(metadata.attributes["DIGITALOCEAN_IPV4_PUBLIC_0"], "203.0.113.7");
        assert_eq!(metadata.attributes["DIGITALOCEAN_IPV4_PRIVATE_0"], "10.110.0.2");
        assert_eq!(metadata.ssh_keys, vec!["ssh-rsa FIRST", "ssh-ed25519 SECOND"]);
    }

    #[tokio::test]
    async fn test_digitalocean_shared_mac_merges_private_first() {
        let server = MockServer::start().await;
        setup_droplet_mock(&server, DROPLET).await;

        let metadata = digitalocean(&server).fetch_metadata().await.unwrap();
        assert_eq!(metadata.network.len(), 1);

        let iface = &metadata.network[0];
        let addresses: Vec<String> = iface.ip_addresses.iter().map(|a| a.to_string()).collect();
        assert_eq!(addresses, vec!["10.110.0.2/20", "203.0.113.7/24"]);

        let routes: Vec<(String, String)> = iface
            .routes
            .iter()
            .map(|r| (r.destination.to_string(), r.gateway.to_string()))
            .collect();
        assert_eq!(
            routes,
            vec![
                ("10.110.0.2/20".to_string(), "0.0.0.0".to_string()),
                ("203.0.113.7/24".to_string(), "203.0.113.1".to_string()),
                ("0.0.0.0/0".to_string(), "203.0.113.1".to_string()),
            ]
        );
        assert_eq!(iface.nameservers.len(), 2);
    }

    #[tokio::test]
    async fn test_digitalocean_document_missing() {
        let server = MockServer::start().await;

        let result = digitalocean(&server).fetch_metadata().await;
        assert!(matches!(result, Err(MetadataError::MissingKey(_))));
    }

    #[tokio::test]
    async fn test_digitalocean_bad_gateway_is_fatal() {
        let server = MockServer::start().await;
        setup_droplet_mock(&server, &DROPLET.replace("203.0.113.1", "gateway")).await;

        let result = digitalocean(&server).fetch_metadata().await;
        assert!(
            matches!(result, Err(MetadataError::Parse { ref value, .. }) if value == "gateway")
        );
    }

    #[tokio::test]
    async fn test_digitalocean_bad_mac_is_fatal() {
        let server = MockServer::start().await;
        setup_droplet_mock(&server, &DROPLET.replace("36:b1:4a:e1:b1:51", "36:b1")).await;

        let result = digitalocean(&server).fetch_metadata().await;
        assert!(matches!(result, Err(MetadataError::Parse { .. })));
    }
}

// =============================================================================
// Provider Selection Tests
// =============================================================================

mod selection {
    use super::*;

    #[test]
    fn test_supported_provider() {
        let provider: CloudProvider = "digitalocean".parse().unwrap();
        assert_eq!(provider, CloudProvider::DigitalOcean);
    }

    #[test]
    fn test_unknown_provider() {
        let result = "not-supported".parse::<CloudProvider>();
        assert!(matches!(result, Err(MetadataError::UnknownProvider(_))));
    }

    #[test]
    fn test_provider_uses_well_known_endpoint() {
        let metadata = CloudMetadata::new(CloudProvider::Gce).unwrap();
        assert_eq!(
            metadata.client().base_url(),
            "http://metadata.google.internal"
        );
    }
}
