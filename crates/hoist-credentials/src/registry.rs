//! Registry logins.

use async_trait::async_trait;
use hoist_core::{AuthConfig, Error, RegistryCredentials, RegistryService, Result, ServiceKind};
use std::sync::Arc;
use tracing::debug;

use crate::ecr::EcrSession;
use crate::resolver::CredentialResolver;

pub const DOCKER_HUB_SERVER: &str = "https://index.docker.io/v1/";

/// The result of logging in to a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryLogin {
    /// Registry endpoint URL, e.g. `https://123456789012.dkr.ecr.us-east-1.amazonaws.com`.
    pub endpoint: String,
    pub credentials: RegistryCredentials,
}

impl RegistryLogin {
    /// The endpoint without scheme or trailing slash, usable as an image prefix.
    pub fn host(&self) -> &str {
        let host = self
            .endpoint
            .strip_prefix("https://")
            .or_else(|| self.endpoint.strip_prefix("http://"))
            .unwrap_or(&self.endpoint);
        host.trim_end_matches('/')
    }
}

/// Logs in to a push/pull registry.
#[async_trait]
pub trait RegistryAuthenticator: Send + Sync {
    async fn login(&self, service: RegistryService) -> Result<RegistryLogin>;
}

/// Resolves credentials on every call; ECR logins go through an [`EcrSession`].
pub struct DefaultRegistryAuthenticator {
    resolver: Arc<dyn CredentialResolver>,
}

impl DefaultRegistryAuthenticator {
    pub fn new(resolver: Arc<dyn CredentialResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl RegistryAuthenticator for DefaultRegistryAuthenticator {
    async fn login(&self, service: RegistryService) -> Result<RegistryLogin> {
        let auth = self.resolver.resolve(ServiceKind::from(service)).await?;
        debug!(service = %auth.service(), "Logging in to registry");

        match auth {
            AuthConfig::DockerHub { username, password } => Ok(RegistryLogin {
                endpoint: DOCKER_HUB_SERVER.to_string(),
                credentials: RegistryCredentials {
                    username,
                    password,
                    server_address: DOCKER_HUB_SERVER.to_string(),
                },
            }),
            AuthConfig::Ecr(aws) => EcrSession::connect(&aws).await.login().await,
            other => Err(Error::Internal(format!(
                "resolver returned {} credentials for a registry login",
                other.service()
            ))),
        }
    }
}
