//! Deployment settings.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::tls::TlsMaterial;
use crate::{ConfigError, ConfigResult};

/// Deployment-wide configuration.
#[derive(Debug, Clone)]
pub struct HoistConfig {
    /// Local deployments keep built images for inspection.
    pub mode: DeploymentMode,
    /// Parent directory of per-request working trees.
    pub work_dir: PathBuf,
    /// Maximum number of builds running at once.
    pub max_workers: usize,
    /// Number of log events buffered per request before the worker blocks.
    pub channel_capacity: usize,
    /// Registry namespace of synthesized base images.
    pub base_image_namespace: String,
    /// Where registry and source credentials come from.
    pub credentials: CredentialsSource,
    pub local: LocalCredentials,
    pub aws: AwsSettings,
    pub secrets_manager: SecretsManagerSettings,
    pub vault: VaultSettings,
    pub tls: Option<TlsMaterial>,
}

impl Default for HoistConfig {
    fn default() -> Self {
        Self {
            mode: DeploymentMode::Production,
            work_dir: std::env::temp_dir().join("hoist").join("code"),
            max_workers: 10,
            channel_capacity: 32,
            base_image_namespace: "hoist".to_string(),
            credentials: CredentialsSource::Local,
            local: LocalCredentials::default(),
            aws: AwsSettings::default(),
            secrets_manager: SecretsManagerSettings::default(),
            vault: VaultSettings::default(),
            tls: None,
        }
    }
}

impl HoistConfig {
    /// Load defaults, then `path` (if any), then the process environment.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            let text = std::fs::read_to_string(path)?;
            config.apply_kdl(&text)?;
        }

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn is_local(&self) -> bool {
        self.mode == DeploymentMode::Local
    }

    pub(crate) fn validate(&self) -> ConfigResult<()> {
        if self.max_workers == 0 {
            return Err(ConfigError::invalid("workers", "must be at least 1"));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::invalid("channel-capacity", "must be at least 1"));
        }
        if self.credentials == CredentialsSource::Vault && self.vault.unseal_attempts == 0 {
            return Err(ConfigError::invalid("vault unseal attempts", "must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentMode {
    Local,
    Production,
}

impl FromStr for DeploymentMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "local" | "dev" | "development" => Ok(DeploymentMode::Local),
            "production" | "prod" | "remote" => Ok(DeploymentMode::Production),
            other => Err(ConfigError::invalid(
                "mode",
                format!("expected local or production, got `{}`", other),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialsSource {
    /// Statically configured values.
    Local,
    /// A JSON secret in AWS Secrets Manager.
    SecretsManager,
    /// A KV secret in a (possibly sealed) Vault, read through AppRole.
    Vault,
}

impl FromStr for CredentialsSource {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "local" | "env" => Ok(CredentialsSource::Local),
            "secrets-manager" | "secretsmanager" | "managed" | "ssm" => {
                Ok(CredentialsSource::SecretsManager)
            }
            "vault" => Ok(CredentialsSource::Vault),
            other => Err(ConfigError::invalid(
                "credentials",
                format!("expected local, secrets-manager or vault, got `{}`", other),
            )),
        }
    }
}

/// Credentials for local mode, read from the environment at startup.
#[derive(Clone, Default)]
pub struct LocalCredentials {
    pub dockerhub_user: Option<String>,
    pub dockerhub_token: Option<String>,
    pub github_token: Option<String>,
}

impl std::fmt::Debug for LocalCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCredentials")
            .field("dockerhub_user", &self.dockerhub_user)
            .field("dockerhub_token", &self.dockerhub_token.as_ref().map(|_| "***"))
            .field("github_token", &self.github_token.as_ref().map(|_| "***"))
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct AwsSettings {
    pub profile: Option<String>,
    pub region: Option<String>,
    /// Set when running under a container task role.
    pub container_credentials_uri: Option<String>,
}

impl AwsSettings {
    /// Whether the process runs with delegated (task/instance) credentials.
    pub fn delegated(&self) -> bool {
        self.container_credentials_uri
            .as_deref()
            .is_some_and(|uri| !uri.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct SecretsManagerSettings {
    pub secret_id: String,
}

impl Default for SecretsManagerSettings {
    fn default() -> Self {
        Self {
            secret_id: "hoist/creds".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct VaultSettings {
    pub addr: String,
    /// Token used for the AppRole management calls.
    pub token: Option<String>,
    pub unseal_key: Option<String>,
    pub approle: String,
    pub secret: String,
    /// KV v2 mount the secret lives under.
    pub mount: String,
    pub unseal_attempts: u32,
    pub unseal_interval: Duration,
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            addr: "http://127.0.0.1:8200".to_string(),
            token: None,
            unseal_key: None,
            approle: "hoist".to_string(),
            secret: "hoist".to_string(),
            mount: "secret".to_string(),
            unseal_attempts: 5,
            unseal_interval: Duration::from_secs(10),
        }
    }
}

impl std::fmt::Debug for VaultSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultSettings")
            .field("addr", &self.addr)
            .field("approle", &self.approle)
            .field("secret", &self.secret)
            .field("mount", &self.mount)
            .field("unseal_attempts", &self.unseal_attempts)
            .field("unseal_interval", &self.unseal_interval)
            .finish_non_exhaustive()
    }
}
