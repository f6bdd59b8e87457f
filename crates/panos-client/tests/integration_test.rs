//! Integration tests for the PAN-OS client
//!
//! These tests require a reachable firewall.
//! Set PANOS_URL, PANOS_USERNAME and PANOS_PASSWORD environment variables to run.

use panos_client::{NetworkDeviceGateway, PanOsClient, StaticRoute, wait_for_terminal};
use std::time::Duration;

fn client_from_env() -> PanOsClient {
    let url = std::env::var("PANOS_URL").unwrap_or_else(|_| "https://192.168.255.254".to_string());
    let username = std::env::var("PANOS_USERNAME").unwrap_or_else(|_| "admin".to_string());
    let password = std::env::var("PANOS_PASSWORD")
        .expect("PANOS_PASSWORD environment variable must be set");

    PanOsClient::new(url, username, password, false, Duration::from_secs(30))
        .expect("Failed to create client")
}

#[tokio::test]
#[ignore] // Requires a reachable firewall
async fn test_keygen() {
    let client = client_from_env();
    let key = client.authenticate().await.expect("Failed to generate API key");
    assert!(!key.is_empty(), "API key should not be empty");
}

#[tokio::test]
#[ignore]
async fn test_stage_commit_and_remove_route() {
    let client = client_from_env();
    let virtual_router = std::env::var("PANOS_VIRTUAL_ROUTER").unwrap_or_else(|_| "default".to_string());
    let route = StaticRoute {
        name: "dns_integration_test_192_0_2_10_00000000".to_string(),
        destination: "192.0.2.10/32".to_string(),
        next_hop: "192.0.2.1".to_string(),
        interface: None,
        metric: 10,
    };
    let xpath = route.xpath(&virtual_router);

    client.submit_change(&xpath, &route.to_element()).await.expect("Failed to stage route");
    let staged = client.read_change(&xpath).await.expect("Failed to read route");
    assert!(staged.is_some(), "Staged route should be readable from candidate config");

    let job = client.commit().await.expect("Failed to commit");
    let job = wait_for_terminal(&client, job.job_id, Duration::from_secs(2), Duration::from_secs(120))
        .await
        .expect("Commit did not finish");
    println!("Commit job {} finished: {:?} {}", job.job_id, job.status, job.details);

    client.delete_change(&xpath).await.expect("Failed to remove route");
    let job = client.commit().await.expect("Failed to commit removal");
    wait_for_terminal(&client, job.job_id, Duration::from_secs(2), Duration::from_secs(120))
        .await
        .expect("Removal commit did not finish");
}
