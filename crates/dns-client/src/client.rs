//! DNS management API client

use crate::dns_trait::DnsPublisher;
use crate::error::DnsError;
use crate::models::LoginResponse;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use std::net::IpAddr;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// DNS management API client
///
/// Logs in with username/password, keeps the bearer token and logs in again
/// once when a request comes back 401.
#[derive(Debug)]
pub struct DnsApiClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    token: RwLock<Option<String>>,
}

impl DnsApiClient {
    /// Create a new DNS API client
    pub fn new(base_url: String, username: String, password: String, timeout: Duration) -> Result<Self, DnsError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            username,
            password,
            token: RwLock::new(None),
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Log in and cache the access token
    pub async fn login(&self) -> Result<String, DnsError> {
        let url = self.build_url("/api/auth/login");
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .form(&[("username", self.username.as_str()), ("password", self.password.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DnsError::Authentication(format!("login failed: {} - {}", status, body)));
        }

        let body = response.text().await?;
        let login: LoginResponse = serde_json::from_str(&body)?;

        *self.token.write().await = Some(login.access_token.clone());
        info!("Authenticated with DNS API at {}", self.base_url);
        Ok(login.access_token)
    }

    async fn current_token(&self) -> Result<String, DnsError> {
        if let Some(token) = self.token.read().await.as_ref() {
            return Ok(token.clone());
        }
        self.login().await
    }

    /// Send an authenticated request built by `build`, retrying once on 401
    async fn send<F>(&self, method: Method, path: &str, build: F) -> Result<Response, DnsError>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        let url = self.build_url(path);
        let mut retried = false;
        loop {
            let token = self.current_token().await?;
            debug!("{} {}", method, url);

            let response = build(self.client.request(method.clone(), &url))
                .bearer_auth(&token)
                .header("Accept", "application/json")
                .send()
                .await?;

            if response.status() == StatusCode::UNAUTHORIZED && !retried {
                warn!("DNS API token rejected, logging in again");
                *self.token.write().await = None;
                retried = true;
                continue;
            }
            if response.status() == StatusCode::UNAUTHORIZED {
                return Err(DnsError::Authentication(format!("{} {} rejected after re-login", method, path)));
            }
            return Ok(response);
        }
    }
}

#[async_trait::async_trait]
impl DnsPublisher for DnsApiClient {
    async fn create_record(&self, fqdn: &str, address: IpAddr, zone: &str, ttl: u32) -> Result<(), DnsError> {
        let ip = address.to_string();
        let ttl = ttl.to_string();
        let response = self
            .send(Method::POST, "/api/dns/records", |req| {
                req.query(&[
                    ("zone", zone),
                    ("fqdn", fqdn),
                    ("ip_address", ip.as_str()),
                    ("ttl", ttl.as_str()),
                ])
            })
            .await?;

        let status = response.status();
        if status == StatusCode::CONFLICT {
            // The existing record may point elsewhere; never adopt it
            let body = response.text().await.unwrap_or_default();
            warn!("DNS record {} already exists: {}", fqdn, body);
            return Err(DnsError::Conflict(format!("{} already exists: {}", fqdn, body)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DnsError::Api(format!(
                "POST /api/dns/records for {} failed: {} - {}",
                fqdn, status, body
            )));
        }

        info!("DNS record added: {} -> {}", fqdn, address);
        Ok(())
    }

    async fn delete_record(&self, fqdn: &str) -> Result<(), DnsError> {
        let response = self
            .send(Method::DELETE, "/api/dns/records", |req| req.query(&[("fqdn", fqdn)]))
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("DNS record {} already absent", fqdn);
            return Ok(());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DnsError::Api(format!(
                "DELETE /api/dns/records for {} failed: {} - {}",
                fqdn, status, body
            )));
        }

        info!("DNS record removed: {}", fqdn);
        Ok(())
    }
}
