//! Vault secret store: unseal on demand, then an AppRole handshake per read.

use async_trait::async_trait;
use hoist_config::VaultSettings;
use hoist_core::retry::{RetryPolicy, retry};
use hoist_core::secret::{SecretStore, SecretValue};
use hoist_core::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("vault request failed: {0}")]
    Request(String),

    #[error("vault returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("unexpected vault response: {0}")]
    Parse(String),
}

impl From<VaultError> for Error {
    fn from(err: VaultError) -> Self {
        Error::Auth(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SealStatus {
    pub sealed: bool,
    #[serde(default)]
    pub progress: u32,
}

/// The subset of the Vault HTTP API used here.
#[async_trait]
pub trait VaultApi: Send + Sync {
    async fn seal_status(&self) -> std::result::Result<SealStatus, VaultError>;

    /// Submit one unseal key share. Harmless on an unsealed vault.
    async fn unseal(&self, key: &str) -> std::result::Result<SealStatus, VaultError>;

    async fn role_id(&self, role: &str) -> std::result::Result<String, VaultError>;

    /// Mint a fresh secret-id for `role`.
    async fn secret_id(&self, role: &str) -> std::result::Result<String, VaultError>;

    /// AppRole login, returning a client token.
    async fn login(&self, role_id: &str, secret_id: &str)
    -> std::result::Result<String, VaultError>;

    /// Read a KV v2 secret.
    async fn read_kv(
        &self,
        token: &str,
        mount: &str,
        path: &str,
    ) -> std::result::Result<SecretValue, VaultError>;
}

/// [`VaultApi`] over HTTP.
pub struct HttpVaultApi {
    client: reqwest::Client,
    addr: String,
    token: Option<String>,
}

impl HttpVaultApi {
    pub fn new(addr: &str, token: Option<String>) -> std::result::Result<Self, VaultError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| VaultError::Request(e.to_string()))?;

        Ok(Self {
            client,
            addr: addr.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.addr, path)
    }

    fn admin_token(&self) -> std::result::Result<&str, VaultError> {
        self.token
            .as_deref()
            .ok_or_else(|| VaultError::Request("VAULT_TOKEN is not configured".to_string()))
    }

    async fn json(
        &self,
        request: reqwest::RequestBuilder,
    ) -> std::result::Result<Value, VaultError> {
        let response = request
            .send()
            .await
            .map_err(|e| VaultError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(VaultError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| VaultError::Parse(e.to_string()))
    }
}

fn string_at(value: &Value, pointer: &str) -> std::result::Result<String, VaultError> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| VaultError::Parse(format!("missing {}", pointer)))
}

fn seal_status(value: Value) -> std::result::Result<SealStatus, VaultError> {
    serde_json::from_value(value).map_err(|e| VaultError::Parse(e.to_string()))
}

#[async_trait]
impl VaultApi for HttpVaultApi {
    async fn seal_status(&self) -> std::result::Result<SealStatus, VaultError> {
        let body = self.json(self.client.get(self.url("sys/seal-status"))).await?;
        seal_status(body)
    }

    async fn unseal(&self, key: &str) -> std::result::Result<SealStatus, VaultError> {
        let body = self
            .json(
                self.client
                    .post(self.url("sys/unseal"))
                    .json(&serde_json::json!({ "key": key })),
            )
            .await?;
        seal_status(body)
    }

    async fn role_id(&self, role: &str) -> std::result::Result<String, VaultError> {
        let body = self
            .json(
                self.client
                    .get(self.url(&format!("auth/approle/role/{}/role-id", role)))
                    .header("X-Vault-Token", self.admin_token()?),
            )
            .await?;
        string_at(&body, "/data/role_id")
    }

    async fn secret_id(&self, role: &str) -> std::result::Result<String, VaultError> {
        let body = self
            .json(
                self.client
                    .post(self.url(&format!("auth/approle/role/{}/secret-id", role)))
                    .header("X-Vault-Token", self.admin_token()?),
            )
            .await?;
        string_at(&body, "/data/secret_id")
    }

    async fn login(
        &self,
        role_id: &str,
        secret_id: &str,
    ) -> std::result::Result<String, VaultError> {
        let body = self
            .json(
                self.client
                    .post(self.url("auth/approle/login"))
                    .json(&serde_json::json!({ "role_id": role_id, "secret_id": secret_id })),
            )
            .await?;
        string_at(&body, "/auth/client_token")
    }

    async fn read_kv(
        &self,
        token: &str,
        mount: &str,
        path: &str,
    ) -> std::result::Result<SecretValue, VaultError> {
        let body = self
            .json(
                self.client
                    .get(self.url(&format!("{}/data/{}", mount, path)))
                    .header("X-Vault-Token", token),
            )
            .await?;

        let data = body
            .pointer("/data/data")
            .ok_or_else(|| VaultError::Parse("missing /data/data".to_string()))?;
        Ok(SecretValue::from_json_or_string(&data.to_string()))
    }
}

/// [`SecretStore`] backed by a Vault that may need unsealing first.
pub struct VaultStore {
    api: Arc<dyn VaultApi>,
    unseal_key: Option<String>,
    approle: String,
    mount: String,
    policy: RetryPolicy,
}

impl VaultStore {
    pub fn new(api: Arc<dyn VaultApi>, settings: &VaultSettings) -> Self {
        Self {
            api,
            unseal_key: settings.unseal_key.clone(),
            approle: settings.approle.clone(),
            mount: settings.mount.clone(),
            policy: RetryPolicy::new(settings.unseal_attempts, settings.unseal_interval),
        }
    }

    /// Unseal the vault if needed.
    ///
    /// Each retry cycle submits the unseal key and re-checks the status.
    pub async fn ensure_unsealed(&self) -> Result<()> {
        let status = self.api.seal_status().await?;
        if !status.sealed {
            return Ok(());
        }

        let key = self.unseal_key.as_deref().ok_or_else(|| {
            Error::Auth("vault is sealed and no unseal key is configured".to_string())
        })?;

        info!(max_attempts = self.policy.max_attempts, "Vault is sealed, unsealing");

        let api = &self.api;
        retry(self.policy, |attempt| async move {
            api.unseal(key).await?;
            let status = api.seal_status().await?;
            if status.sealed {
                warn!(attempt, progress = status.progress, "Vault still sealed");
                Err(Error::Auth("vault still sealed".to_string()))
            } else {
                Ok(())
            }
        })
        .await
        .map_err(|e| Error::Auth(e.to_string()))?;

        info!("Vault unsealed");
        Ok(())
    }
}

#[async_trait]
impl SecretStore for VaultStore {
    fn name(&self) -> &'static str {
        "vault"
    }

    async fn get(&self, path: &str) -> Result<SecretValue> {
        self.ensure_unsealed().await?;

        let role_id = self.api.role_id(&self.approle).await?;
        let secret_id = self.api.secret_id(&self.approle).await?;
        let token = self.api.login(&role_id, &secret_id).await?;
        debug!(approle = %self.approle, secret = path, "AppRole login succeeded");

        Ok(self.api.read_kv(&token, &self.mount, path).await?)
    }
}
