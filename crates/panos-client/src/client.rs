//! PAN-OS XML API client

use crate::error::GatewayError;
use crate::gateway_trait::NetworkDeviceGateway;
use crate::models::CommitJob;
use crate::response;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// PAN-OS XML API client
///
/// Authenticates with `type=keygen` on first use and caches the API key.
/// A request rejected with 403 triggers one re-keygen and retry.
#[derive(Debug)]
pub struct PanOsClient {
    client: Client,
    base_url: String,
    device_id: String,
    username: String,
    password: String,
    api_key: RwLock<Option<String>>,
}

impl PanOsClient {
    /// Create a new PAN-OS client
    ///
    /// `base_url` is the management address, e.g. `https://192.0.2.254`.
    /// Lab firewalls usually carry self-signed certificates, hence `verify_tls`.
    pub fn new(
        base_url: String,
        username: String,
        password: String,
        verify_tls: bool,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .danger_accept_invalid_certs(!verify_tls)
            .timeout(timeout)
            .build()?;

        let base_url = base_url.trim_end_matches('/').to_string();
        let device_id = base_url
            .split("://")
            .last()
            .unwrap_or(&base_url)
            .trim_end_matches("/api")
            .to_string();

        Ok(Self {
            client,
            base_url,
            device_id,
            username,
            password,
            api_key: RwLock::new(None),
        })
    }

    /// Use a pre-provisioned API key instead of keygen
    pub fn with_api_key(self, api_key: String) -> Self {
        Self {
            api_key: RwLock::new(Some(api_key)),
            ..self
        }
    }

    fn api_url(&self) -> String {
        format!("{}/api/", self.base_url)
    }

    /// Generate a fresh API key and cache it
    pub async fn authenticate(&self) -> Result<String, GatewayError> {
        debug!("Requesting API key from {}", self.device_id);
        let response = self
            .client
            .get(self.api_url())
            .query(&[
                ("type", "keygen"),
                ("user", self.username.as_str()),
                ("password", self.password.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(GatewayError::Authentication(format!(
                "keygen on {} failed: {} - {}",
                self.device_id, status, body
            )));
        }

        let key = response::parse_api_key(&body)?;
        *self.api_key.write().await = Some(key.clone());
        info!("Authenticated to PAN-OS device {}", self.device_id);
        Ok(key)
    }

    async fn current_key(&self) -> Result<String, GatewayError> {
        if let Some(key) = self.api_key.read().await.as_ref() {
            return Ok(key.clone());
        }
        self.authenticate().await
    }

    /// Issue an API call and return the raw body of a 2xx response
    async fn request(&self, params: &[(&str, &str)]) -> Result<String, GatewayError> {
        let action = params
            .iter()
            .map(|(k, v)| if *k == "type" || *k == "action" { *v } else { "" })
            .filter(|v| !v.is_empty())
            .collect::<Vec<_>>()
            .join("/");

        let mut retried = false;
        loop {
            let key = self.current_key().await?;
            debug!("PAN-OS {} on {}", action, self.device_id);

            let response = self
                .client
                .get(self.api_url())
                .query(params)
                .query(&[("key", key.as_str())])
                .send()
                .await?;

            let status = response.status();
            if status == StatusCode::FORBIDDEN && !retried {
                warn!("API key rejected by {}, re-authenticating", self.device_id);
                *self.api_key.write().await = None;
                retried = true;
                continue;
            }

            let body = response.text().await?;
            if !status.is_success() {
                return Err(GatewayError::Api(format!(
                    "{} on {} failed: {} - {}",
                    action,
                    self.device_id,
                    status,
                    body.chars().take(500).collect::<String>()
                )));
            }
            return Ok(body);
        }
    }
}

#[async_trait::async_trait]
impl NetworkDeviceGateway for PanOsClient {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    async fn read_change(&self, selector: &str) -> Result<Option<String>, GatewayError> {
        let body = self
            .request(&[("type", "config"), ("action", "get"), ("xpath", selector)])
            .await?;
        response::parse_get_entry(&body)
    }

    async fn submit_change(&self, selector: &str, payload: &str) -> Result<(), GatewayError> {
        let body = self
            .request(&[
                ("type", "config"),
                ("action", "set"),
                ("xpath", selector),
                ("element", payload),
            ])
            .await?;
        response::parse_success(&body)?;
        Ok(())
    }

    async fn delete_change(&self, selector: &str) -> Result<(), GatewayError> {
        let body = self
            .request(&[("type", "config"), ("action", "delete"), ("xpath", selector)])
            .await?;
        response::parse_success(&body)?;
        Ok(())
    }

    async fn commit(&self) -> Result<CommitJob, GatewayError> {
        let body = self
            .request(&[("type", "commit"), ("cmd", "<commit></commit>")])
            .await?;
        match response::parse_commit_job_id(&body)? {
            Some(job_id) => {
                info!("Commit job {} queued on {}", job_id, self.device_id);
                self.poll(job_id).await
            }
            None => {
                info!("Commit on {} completed without a job", self.device_id);
                Ok(CommitJob::immediate())
            }
        }
    }

    async fn poll(&self, job_id: u64) -> Result<CommitJob, GatewayError> {
        let cmd = format!("<show><jobs><id>{}</id></jobs></show>", job_id);
        let body = self.request(&[("type", "op"), ("cmd", cmd.as_str())]).await?;
        response::parse_job(&body, job_id)
    }
}
