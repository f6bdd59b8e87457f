//! Integration tests for the DNS API client
//!
//! These tests require a running DNS management API.
//! Set DNS_API_URL, DNS_API_USERNAME and DNS_API_PASSWORD environment variables to run.

use dns_client::{DnsApiClient, DnsPublisher};
use std::time::Duration;

fn client_from_env() -> DnsApiClient {
    let url = std::env::var("DNS_API_URL").unwrap_or_else(|_| "http://localhost:5000".to_string());
    let username = std::env::var("DNS_API_USERNAME").unwrap_or_else(|_| "admin".to_string());
    let password = std::env::var("DNS_API_PASSWORD")
        .expect("DNS_API_PASSWORD environment variable must be set");

    DnsApiClient::new(url, username, password, Duration::from_secs(30)).expect("Failed to create client")
}

#[tokio::test]
#[ignore] // Requires running DNS API
async fn test_login() {
    let client = client_from_env();
    let token = client.login().await.expect("Failed to log in");
    assert!(!token.is_empty(), "Access token should not be empty");
}

#[tokio::test]
#[ignore]
async fn test_create_and_delete_record() {
    let client = client_from_env();
    let zone = std::env::var("DNS_API_ZONE").unwrap_or_else(|_| "range.local".to_string());
    let fqdn = format!("integration-test.{}", zone);
    let address = "192.0.2.10".parse().expect("valid address");

    client.create_record(&fqdn, address, &zone, 60).await.expect("Failed to create record");
    client.delete_record(&fqdn).await.expect("Failed to delete record");
    client.delete_record(&fqdn).await.expect("Delete of absent record should succeed");
}
