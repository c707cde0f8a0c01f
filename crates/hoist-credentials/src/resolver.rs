//! The credential resolver seam and its static implementation.

use async_trait::async_trait;
use hoist_config::{AwsSettings, CredentialsSource, HoistConfig, LocalCredentials};
use hoist_core::{AuthConfig, Error, Result, ServiceKind};
use std::sync::Arc;
use tracing::info;

use crate::aws::settings_auth;
use crate::managed::{KeyLayout, ManagedCredentials};
use crate::secrets_manager::SecretsManagerStore;
use crate::vault::{HttpVaultApi, VaultStore};

/// Produces auth material for a target service.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// Name of the strategy, for logs.
    fn name(&self) -> &'static str;

    async fn resolve(&self, service: ServiceKind) -> Result<AuthConfig>;
}

/// Credentials taken from the configuration value. No network calls.
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    local: LocalCredentials,
    aws: AwsSettings,
}

impl EnvCredentials {
    pub fn new(local: LocalCredentials, aws: AwsSettings) -> Self {
        Self { local, aws }
    }
}

#[async_trait]
impl CredentialResolver for EnvCredentials {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn resolve(&self, service: ServiceKind) -> Result<AuthConfig> {
        match service {
            ServiceKind::DockerHub => {
                match (&self.local.dockerhub_user, &self.local.dockerhub_token) {
                    (Some(username), Some(password)) => Ok(AuthConfig::DockerHub {
                        username: username.clone(),
                        password: password.clone(),
                    }),
                    _ => Err(Error::Auth(
                        "DockerHub credentials are not configured (DOCKERHUB_USER, DOCKERHUB_TOKEN)"
                            .to_string(),
                    )),
                }
            }
            ServiceKind::GitHub => self
                .local
                .github_token
                .clone()
                .map(|token| AuthConfig::GitHub { token })
                .ok_or_else(|| {
                    Error::Auth("GitHub token is not configured (GITHUB_TOKEN)".to_string())
                }),
            ServiceKind::Ecr => Ok(AuthConfig::Ecr(settings_auth(&self.aws)?)),
            ServiceKind::S3 => Ok(AuthConfig::S3(settings_auth(&self.aws)?)),
        }
    }
}

/// Build the resolver selected by `config.credentials`.
pub async fn resolver_from_config(config: &HoistConfig) -> Result<Arc<dyn CredentialResolver>> {
    let resolver: Arc<dyn CredentialResolver> = match config.credentials {
        CredentialsSource::Local => Arc::new(EnvCredentials::new(
            config.local.clone(),
            config.aws.clone(),
        )),
        CredentialsSource::SecretsManager => {
            let auth = settings_auth(&config.aws)?;
            let store = SecretsManagerStore::connect(&auth).await;
            Arc::new(ManagedCredentials::new(
                Arc::new(store),
                config.secrets_manager.secret_id.clone(),
                KeyLayout::SecretsManager,
                config.aws.clone(),
            ))
        }
        CredentialsSource::Vault => {
            let api = HttpVaultApi::new(&config.vault.addr, config.vault.token.clone())
                .map_err(|e| Error::Auth(e.to_string()))?;
            let store = VaultStore::new(Arc::new(api), &config.vault);
            Arc::new(ManagedCredentials::new(
                Arc::new(store),
                config.vault.secret.clone(),
                KeyLayout::Vault,
                config.aws.clone(),
            ))
        }
    };

    info!(strategy = resolver.name(), "Credential resolver configured");
    Ok(resolver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoist_core::AwsIdentity;

    fn resolver() -> EnvCredentials {
        EnvCredentials::new(
            LocalCredentials {
                dockerhub_user: Some("acme".to_string()),
                dockerhub_token: Some("dckr_pat".to_string()),
                github_token: None,
            },
            AwsSettings {
                profile: Some("ci".to_string()),
                region: Some("us-east-1".to_string()),
                container_credentials_uri: None,
            },
        )
    }

    #[tokio::test]
    async fn test_dockerhub() {
        let auth = resolver().resolve(ServiceKind::DockerHub).await.unwrap();
        assert_eq!(
            auth,
            AuthConfig::DockerHub {
                username: "acme".to_string(),
                password: "dckr_pat".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_missing_github_token() {
        let err = resolver().resolve(ServiceKind::GitHub).await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[tokio::test]
    async fn test_ecr_uses_profile() {
        let auth = resolver().resolve(ServiceKind::Ecr).await.unwrap();
        match auth {
            AuthConfig::Ecr(aws) => {
                assert_eq!(aws.identity, AwsIdentity::Profile("ci".to_string()));
                assert_eq!(aws.region, "us-east-1");
            }
            other => panic!("unexpected auth: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_local_strategy_from_config() {
        let config = HoistConfig::default();
        let resolver = resolver_from_config(&config).await.unwrap();
        assert_eq!(resolver.name(), "local");
    }
}
