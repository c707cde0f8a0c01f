//! Credentials read from a managed secret store.

use async_trait::async_trait;
use hoist_config::AwsSettings;
use hoist_core::secret::{SecretStore, SecretValue};
use hoist_core::{AuthConfig, AwsAuth, AwsIdentity, Error, Result, ServiceKind};
use std::sync::Arc;
use tracing::debug;

use crate::aws::settings_auth;
use crate::resolver::CredentialResolver;

/// Key names used inside the stored secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyLayout {
    /// `DOCKERHUB_USER`, `DOCKERHUB_TOKEN`, `GITHUB_TOKEN`; AWS from settings.
    SecretsManager,
    /// Lower-case keys, with optional AWS keys carried in the secret itself.
    Vault,
}

struct AwsKeys {
    profile: &'static str,
    region: &'static str,
    access_key: &'static str,
    secret_key: &'static str,
}

impl KeyLayout {
    fn dockerhub_user(self) -> &'static str {
        match self {
            KeyLayout::SecretsManager => "DOCKERHUB_USER",
            KeyLayout::Vault => "dockerhub_user",
        }
    }

    fn dockerhub_token(self) -> &'static str {
        match self {
            KeyLayout::SecretsManager => "DOCKERHUB_TOKEN",
            KeyLayout::Vault => "dockerhub_token",
        }
    }

    fn github_token(self) -> &'static str {
        match self {
            KeyLayout::SecretsManager => "GITHUB_TOKEN",
            KeyLayout::Vault => "github_token",
        }
    }

    fn aws_keys(self) -> Option<AwsKeys> {
        match self {
            KeyLayout::SecretsManager => None,
            KeyLayout::Vault => Some(AwsKeys {
                profile: "aws_profile",
                region: "aws_region",
                access_key: "aws_access_key",
                secret_key: "aws_secret_key",
            }),
        }
    }
}

/// Resolver that fetches one secret per call and shapes it per service.
pub struct ManagedCredentials {
    store: Arc<dyn SecretStore>,
    secret: String,
    layout: KeyLayout,
    aws: AwsSettings,
}

impl ManagedCredentials {
    pub fn new(
        store: Arc<dyn SecretStore>,
        secret: impl Into<String>,
        layout: KeyLayout,
        aws: AwsSettings,
    ) -> Self {
        Self {
            store,
            secret: secret.into(),
            layout,
            aws,
        }
    }

    fn aws_auth(&self, secret: &SecretValue) -> Result<AwsAuth> {
        let Some(keys) = self.layout.aws_keys() else {
            return settings_auth(&self.aws);
        };

        let region = non_empty(secret, keys.region)
            .map(str::to_string)
            .or_else(|| self.aws.region.clone())
            .ok_or_else(|| Error::Auth(format!("`{}` missing from secret", keys.region)))?;

        let identity = match (
            non_empty(secret, keys.access_key),
            non_empty(secret, keys.secret_key),
            non_empty(secret, keys.profile),
        ) {
            (Some(access_key_id), Some(secret_access_key), _) => AwsIdentity::Static {
                access_key_id: access_key_id.to_string(),
                secret_access_key: secret_access_key.to_string(),
            },
            (_, _, Some(profile)) => AwsIdentity::Profile(profile.to_string()),
            _ => settings_auth(&self.aws).map(|auth| auth.identity).unwrap_or(AwsIdentity::Ambient),
        };

        Ok(AwsAuth { identity, region })
    }
}

#[async_trait]
impl CredentialResolver for ManagedCredentials {
    fn name(&self) -> &'static str {
        self.store.name()
    }

    async fn resolve(&self, service: ServiceKind) -> Result<AuthConfig> {
        debug!(store = self.store.name(), %service, "Fetching credentials");
        let secret = self.store.get(&self.secret).await?;

        match service {
            ServiceKind::DockerHub => Ok(AuthConfig::DockerHub {
                username: required(&secret, self.layout.dockerhub_user())?,
                password: required(&secret, self.layout.dockerhub_token())?,
            }),
            ServiceKind::GitHub => Ok(AuthConfig::GitHub {
                token: required(&secret, self.layout.github_token())?,
            }),
            ServiceKind::Ecr => Ok(AuthConfig::Ecr(self.aws_auth(&secret)?)),
            ServiceKind::S3 => Ok(AuthConfig::S3(self.aws_auth(&secret)?)),
        }
    }
}

fn non_empty<'a>(secret: &'a SecretValue, key: &str) -> Option<&'a str> {
    secret.get(key).filter(|v| !v.is_empty())
}

fn required(secret: &SecretValue, key: &str) -> Result<String> {
    non_empty(secret, key)
        .map(str::to_string)
        .ok_or_else(|| Error::Auth(format!("`{}` missing from secret", key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MapStore {
        values: HashMap<String, String>,
        requested: Mutex<Vec<String>>,
    }

    impl MapStore {
        fn new(pairs: &[(&str, &str)]) -> Arc<Self> {
            Arc::new(Self {
                values: pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                requested: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl SecretStore for MapStore {
        fn name(&self) -> &'static str {
            "map"
        }

        async fn get(&self, path: &str) -> Result<SecretValue> {
            self.requested.lock().unwrap().push(path.to_string());
            Ok(SecretValue::Map(self.values.clone()))
        }
    }

    fn settings() -> AwsSettings {
        AwsSettings {
            profile: Some("default".to_string()),
            region: Some("us-east-1".to_string()),
            container_credentials_uri: None,
        }
    }

    #[tokio::test]
    async fn test_secrets_manager_layout() {
        let store = MapStore::new(&[
            ("DOCKERHUB_USER", "acme"),
            ("DOCKERHUB_TOKEN", "t0k"),
            ("GITHUB_TOKEN", "ghp_x"),
        ]);
        let resolver =
            ManagedCredentials::new(store.clone(), "hoist/creds", KeyLayout::SecretsManager, settings());

        let hub = resolver.resolve(ServiceKind::DockerHub).await.unwrap();
        assert_eq!(
            hub,
            AuthConfig::DockerHub {
                username: "acme".to_string(),
                password: "t0k".to_string(),
            }
        );

        let gh = resolver.resolve(ServiceKind::GitHub).await.unwrap();
        assert_eq!(gh, AuthConfig::GitHub { token: "ghp_x".to_string() });

        // One fetch per resolution, no caching.
        assert_eq!(store.requested.lock().unwrap().len(), 2);
        assert_eq!(store.requested.lock().unwrap()[0], "hoist/creds");
    }

    #[tokio::test]
    async fn test_secrets_manager_ecr_delegated() {
        let store = MapStore::new(&[]);
        let mut aws = settings();
        aws.container_credentials_uri = Some("/v2/credentials/task".to_string());
        let resolver = ManagedCredentials::new(store, "hoist/creds", KeyLayout::SecretsManager, aws);

        let auth = resolver.resolve(ServiceKind::Ecr).await.unwrap();
        assert_eq!(
            auth,
            AuthConfig::Ecr(AwsAuth {
                identity: AwsIdentity::Ambient,
                region: "us-east-1".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_vault_layout_static_keys_win() {
        let store = MapStore::new(&[
            ("aws_profile", "dev"),
            ("aws_region", "eu-central-1"),
            ("aws_access_key", "AKIA123"),
            ("aws_secret_key", "shh"),
        ]);
        let resolver = ManagedCredentials::new(store, "hoist", KeyLayout::Vault, settings());

        let auth = resolver.resolve(ServiceKind::S3).await.unwrap();
        assert_eq!(
            auth,
            AuthConfig::S3(AwsAuth {
                identity: AwsIdentity::Static {
                    access_key_id: "AKIA123".to_string(),
                    secret_access_key: "shh".to_string(),
                },
                region: "eu-central-1".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_vault_layout_profile() {
        let store = MapStore::new(&[("aws_profile", "dev"), ("aws_region", "eu-central-1")]);
        let resolver = ManagedCredentials::new(store, "hoist", KeyLayout::Vault, settings());

        match resolver.resolve(ServiceKind::Ecr).await.unwrap() {
            AuthConfig::Ecr(aws) => assert_eq!(aws.identity, AwsIdentity::Profile("dev".to_string())),
            other => panic!("unexpected auth: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_key_is_auth_error() {
        let store = MapStore::new(&[("dockerhub_user", "acme")]);
        let resolver = ManagedCredentials::new(store, "hoist", KeyLayout::Vault, settings());

        let err = resolver.resolve(ServiceKind::DockerHub).await.unwrap_err();
        assert!(matches!(err, Error::Auth(msg) if msg.contains("dockerhub_token")));
    }
}
