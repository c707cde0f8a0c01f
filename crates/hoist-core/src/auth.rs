//! Authentication material for registries, source hosts and object storage.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::request::RegistryService;

/// Services the credential resolver can produce auth material for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum ServiceKind {
    #[display("dockerhub")]
    DockerHub,
    #[display("ecr")]
    Ecr,
    #[display("github")]
    GitHub,
    #[display("s3")]
    S3,
}

impl From<RegistryService> for ServiceKind {
    fn from(service: RegistryService) -> Self {
        match service {
            RegistryService::DockerHub => ServiceKind::DockerHub,
            RegistryService::Ecr => ServiceKind::Ecr,
        }
    }
}

/// Resolved auth material, one variant per target service.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthConfig {
    DockerHub { username: String, password: String },
    Ecr(AwsAuth),
    GitHub { token: String },
    S3(AwsAuth),
}

impl AuthConfig {
    pub fn service(&self) -> ServiceKind {
        match self {
            AuthConfig::DockerHub { .. } => ServiceKind::DockerHub,
            AuthConfig::Ecr(_) => ServiceKind::Ecr,
            AuthConfig::GitHub { .. } => ServiceKind::GitHub,
            AuthConfig::S3(_) => ServiceKind::S3,
        }
    }
}

// Secrets stay out of logs.
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthConfig::DockerHub { username, .. } => f
                .debug_struct("DockerHub")
                .field("username", username)
                .finish_non_exhaustive(),
            AuthConfig::Ecr(aws) => f.debug_tuple("Ecr").field(aws).finish(),
            AuthConfig::GitHub { .. } => f.debug_struct("GitHub").finish_non_exhaustive(),
            AuthConfig::S3(aws) => f.debug_tuple("S3").field(aws).finish(),
        }
    }
}

/// AWS session material: a region plus exactly one way to obtain credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsAuth {
    pub identity: AwsIdentity,
    pub region: String,
}

#[derive(Clone, PartialEq, Eq)]
pub enum AwsIdentity {
    /// Delegated (task role / instance) credentials picked up by the SDK.
    Ambient,
    /// A named profile from the shared credentials file.
    Profile(String),
    /// Static access keys.
    Static {
        access_key_id: String,
        secret_access_key: String,
    },
}

impl std::fmt::Debug for AwsIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AwsIdentity::Ambient => f.write_str("Ambient"),
            AwsIdentity::Profile(name) => f.debug_tuple("Profile").field(name).finish(),
            AwsIdentity::Static { access_key_id, .. } => f
                .debug_struct("Static")
                .field("access_key_id", access_key_id)
                .finish_non_exhaustive(),
        }
    }
}

/// Credentials for one registry, as consumed by the image engine.
#[derive(Clone, PartialEq, Eq)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: String,
    pub server_address: String,
}

impl std::fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryCredentials")
            .field("username", &self.username)
            .field("server_address", &self.server_address)
            .finish_non_exhaustive()
    }
}
