//! Token acquisition and explicitly scoped service sessions.

use async_trait::async_trait;
use secrecy::{ExposeSecret, Secret};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{ClientError, Result};

/// Default sign-in authority.
pub const DEFAULT_LOGIN_URL: &str = "https://login.microsoftonline.com";

/// Source of bearer tokens for a resource audience such as
/// `https://graph.microsoft.com`.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self, resource: &str) -> Result<String>;

    /// Short label for logs.
    fn describe(&self) -> &'static str;
}

/// Fixed token, used for pre-issued tokens and tests.
pub struct StaticTokenProvider(String);

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self, _resource: &str) -> Result<String> {
        Ok(self.0.clone())
    }

    fn describe(&self) -> &'static str {
        "static token"
    }
}

/// Client-credentials flow against the sign-in authority, cached per resource.
pub struct ClientSecretTokenProvider {
    tenant_id: String,
    client_id: String,
    client_secret: Secret<String>,
    login_base: String,
    http: reqwest::Client,
    cache: Mutex<HashMap<String, (String, Instant)>>,
}

impl ClientSecretTokenProvider {
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: Secret<String>,
        login_base: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret,
            login_base: login_base.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            cache: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl TokenProvider for ClientSecretTokenProvider {
    async fn token(&self, resource: &str) -> Result<String> {
        {
            let cache = self.cache.lock().await;
            if let Some((token, expiry)) = cache.get(resource) {
                if Instant::now() < *expiry {
                    return Ok(token.clone());
                }
            }
        }

        let url = format!("{}/{}/oauth2/v2.0/token", self.login_base, self.tenant_id);
        let scope = format!("{}/.default", resource.trim_end_matches('/'));
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret().as_str()),
            ("scope", scope.as_str()),
        ];
        let response = self.http.post(&url).form(&params).send().await?;
        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() {
            let reason = body["error_description"]
                .as_str()
                .or_else(|| body["error"].as_str())
                .unwrap_or("token request rejected")
                .to_string();
            return Err(ClientError::Authentication {
                resource: resource.to_string(),
                reason,
            });
        }

        let token = body["access_token"]
            .as_str()
            .ok_or_else(|| ClientError::Authentication {
                resource: resource.to_string(),
                reason: "no access_token in token response".to_string(),
            })?
            .to_string();
        let expires_in = body["expires_in"].as_u64().unwrap_or(3600);
        let expiry = Instant::now() + Duration::from_secs(expires_in.saturating_sub(60));

        self.cache
            .lock()
            .await
            .insert(resource.to_string(), (token.clone(), expiry));
        Ok(token)
    }

    fn describe(&self) -> &'static str {
        "client credentials"
    }
}

/// Tokens from the operator's Azure CLI login.
pub struct AzureCliTokenProvider {
    tenant_id: Option<String>,
}

impl AzureCliTokenProvider {
    pub fn new(tenant_id: Option<String>) -> Self {
        Self { tenant_id }
    }

    /// Subscription currently selected in the Azure CLI.
    pub async fn current_subscription() -> Result<String> {
        let account = az_json(&["account", "show", "--output", "json"]).await?;
        account["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ClientError::Authentication {
                resource: "Azure CLI".to_string(),
                reason: "az account show returned no subscription id".to_string(),
            })
    }
}

#[async_trait]
impl TokenProvider for AzureCliTokenProvider {
    async fn token(&self, resource: &str) -> Result<String> {
        let mut args = vec![
            "account",
            "get-access-token",
            "--resource",
            resource,
            "--output",
            "json",
        ];
        if let Some(tenant) = self.tenant_id.as_deref() {
            args.extend(["--tenant", tenant]);
        }
        let response = az_json(&args).await?;
        response["accessToken"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ClientError::Authentication {
                resource: resource.to_string(),
                reason: "az CLI returned no accessToken".to_string(),
            })
    }

    fn describe(&self) -> &'static str {
        "Azure CLI"
    }
}

async fn az_json(args: &[&str]) -> Result<Value> {
    let output = Command::new("az")
        .args(args)
        .output()
        .await
        .map_err(|e| ClientError::Authentication {
            resource: "Azure CLI".to_string(),
            reason: format!(
                "az CLI not found: {}. Install the Azure CLI or configure service principal credentials",
                e
            ),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ClientError::Authentication {
            resource: "Azure CLI".to_string(),
            reason: format!(
                "az {} failed: {}. Run 'az login' first",
                args.join(" "),
                stderr.trim()
            ),
        });
    }

    Ok(serde_json::from_slice(&output.stdout)?)
}

/// Pick a token provider from the environment.
///
/// 1. `CALPROV_ACCESS_TOKEN` → static token
/// 2. `AZURE_TENANT_ID` + `AZURE_CLIENT_ID` + `AZURE_CLIENT_SECRET` → client credentials
/// 3. Otherwise → Azure CLI, scoped to `AZURE_TENANT_ID` when set
pub fn token_provider_from_env(login_base: &str) -> Arc<dyn TokenProvider> {
    if let Ok(token) = std::env::var("CALPROV_ACCESS_TOKEN") {
        if !token.trim().is_empty() {
            return Arc::new(StaticTokenProvider::new(token.trim()));
        }
    }

    let tenant = std::env::var("AZURE_TENANT_ID").ok();
    if let (Some(tenant_id), Ok(client_id), Ok(secret)) = (
        tenant.clone(),
        std::env::var("AZURE_CLIENT_ID"),
        std::env::var("AZURE_CLIENT_SECRET"),
    ) {
        return Arc::new(ClientSecretTokenProvider::new(
            tenant_id,
            client_id,
            Secret::new(secret),
            login_base,
        ));
    }

    Arc::new(AzureCliTokenProvider::new(tenant))
}

/// An authenticated connection to one remote service.
///
/// Opening a session acquires a token up front, so authentication failures
/// surface before any work starts. The token is released on [`Session::close`]
/// or when the session is dropped; calls through a closed session fail with
/// [`ClientError::SessionClosed`].
pub struct Session {
    service: &'static str,
    resource: String,
    token: StdMutex<Option<String>>,
}

impl Session {
    pub async fn open(
        service: &'static str,
        resource: impl Into<String>,
        provider: Arc<dyn TokenProvider>,
    ) -> Result<Self> {
        let resource = resource.into();
        let token = provider.token(&resource).await.map_err(|e| match e {
            ClientError::Authentication { .. } => e,
            other => ClientError::Authentication {
                resource: resource.clone(),
                reason: other.to_string(),
            },
        })?;

        info!(service, resource = %resource, via = provider.describe(), "Session established");
        Ok(Self {
            service,
            resource,
            token: StdMutex::new(Some(token)),
        })
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn is_open(&self) -> bool {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub(crate) fn bearer(&self) -> Result<String> {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ClientError::SessionClosed(self.service))
    }

    pub fn close(&self) {
        let released = self
            .token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if released.is_some() {
            debug!(service = self.service, "Session closed");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("service", &self.service)
            .field("resource", &self.resource)
            .field("open", &self.is_open())
            .finish()
    }
}
