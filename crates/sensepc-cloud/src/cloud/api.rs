use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;

use sensepc_core::DesktopConfig;

use crate::cloud::error::CloudError;
use crate::cloud::token_store::{TokenStore, ACCESS_TOKEN_KEY};
use crate::cloud::types::{Instance, InstanceList, LaunchSession};

/// SensePC backend operations used by the desktop shell.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CloudApi: Send + Sync {
    async fn list_instances(&self) -> Result<Vec<Instance>, CloudError>;
    async fn start_instance(&self, instance_id: &str) -> Result<(), CloudError>;
    async fn stop_instance(&self, instance_id: &str) -> Result<(), CloudError>;
    async fn restart_instance(&self, instance_id: &str) -> Result<(), CloudError>;
    /// Ask the backend for remote-display credentials for a running PC.
    async fn launch_session(&self, instance_id: &str) -> Result<LaunchSession, CloudError>;
}

/// HTTP client for the SensePC REST API.
///
/// The bearer token is read from the token store on every call, so signing
/// in or out takes effect without rebuilding the client.
pub struct SensePcApiClient {
    base_url: String,
    client: Client,
    tokens: Arc<dyn TokenStore>,
}

impl std::fmt::Debug for SensePcApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensePcApiClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl SensePcApiClient {
    pub fn new(
        base_url: &str,
        tokens: Arc<dyn TokenStore>,
        request_timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, CloudError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .user_agent(concat!("SensePC-Desktop/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            tokens,
        })
    }

    pub fn from_config(config: &DesktopConfig, tokens: Arc<dyn TokenStore>) -> Result<Self, CloudError> {
        Self::new(
            &config.api_base_url,
            tokens,
            config.request_timeout(),
            config.connect_timeout(),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn instance_path(instance_id: &str, action: &str) -> Result<String, CloudError> {
        let id = instance_id.trim();
        if id.is_empty() {
            return Err(CloudError::InvalidInput("Instance id must not be empty".to_string()));
        }
        // Only the path of this scratch URL is used.
        let mut scratch = url::Url::parse("http://localhost/")
            .map_err(|e| CloudError::InvalidInput(e.to_string()))?;
        scratch
            .path_segments_mut()
            .map_err(|_| CloudError::InvalidInput("Cannot build instance path".to_string()))?
            .extend(["instances", id, action]);
        Ok(scratch.path().to_string())
    }

    // ── Low-level request helpers ───────────────────────────────────

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response, CloudError> {
        let token = self.tokens.get(ACCESS_TOKEN_KEY).ok_or(CloudError::Unauthorized)?;
        let resp = request.bearer_auth(token.expose_secret()).send().await?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            log::warn!("[cloud-api] {} rejected: unauthorized", what);
            return Err(CloudError::Unauthorized);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            log::warn!("[cloud-api] {} returned {}", what, status);
            return Err(CloudError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, CloudError> {
        let what = format!("GET {}", path);
        let resp = self.send(self.client.get(self.url(path)), &what).await?;
        decode(resp, &what).await
    }

    async fn post_empty(&self, path: &str) -> Result<(), CloudError> {
        let what = format!("POST {}", path);
        self.send(self.client.post(self.url(path)), &what).await?;
        Ok(())
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, CloudError> {
        let what = format!("POST {}", path);
        let resp = self.send(self.client.post(self.url(path)), &what).await?;
        decode(resp, &what).await
    }
}

async fn decode<T: DeserializeOwned>(resp: Response, what: &str) -> Result<T, CloudError> {
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| CloudError::Decode(format!("{}: {}", what, e)))
}

#[async_trait]
impl CloudApi for SensePcApiClient {
    async fn list_instances(&self) -> Result<Vec<Instance>, CloudError> {
        let list: InstanceList = self.get_json("/instances").await?;
        let instances: Vec<Instance> = list.into();
        log::debug!("[cloud-api] listed {} instances", instances.len());
        Ok(instances)
    }

    async fn start_instance(&self, instance_id: &str) -> Result<(), CloudError> {
        self.post_empty(&Self::instance_path(instance_id, "start")?).await?;
        log::info!("[cloud-api] start requested for {}", instance_id);
        Ok(())
    }

    async fn stop_instance(&self, instance_id: &str) -> Result<(), CloudError> {
        self.post_empty(&Self::instance_path(instance_id, "stop")?).await?;
        log::info!("[cloud-api] stop requested for {}", instance_id);
        Ok(())
    }

    async fn restart_instance(&self, instance_id: &str) -> Result<(), CloudError> {
        self.post_empty(&Self::instance_path(instance_id, "restart")?).await?;
        log::info!("[cloud-api] restart requested for {}", instance_id);
        Ok(())
    }

    async fn launch_session(&self, instance_id: &str) -> Result<LaunchSession, CloudError> {
        let launch: LaunchSession = self.post_json(&Self::instance_path(instance_id, "session")?).await?;
        log::info!("[cloud-api] session launched for {}", instance_id);
        Ok(launch)
    }
}
