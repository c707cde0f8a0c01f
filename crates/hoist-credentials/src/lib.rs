//! Credential resolution for Hoist.
//!
//! A [`CredentialResolver`] turns a [`hoist_core::ServiceKind`] into a
//! [`hoist_core::AuthConfig`]. Three strategies exist:
//! - [`EnvCredentials`]: values configured at process start
//! - [`ManagedCredentials`] over [`SecretsManagerStore`]: one JSON secret in AWS Secrets Manager
//! - [`ManagedCredentials`] over [`VaultStore`]: a KV secret behind a sealed Vault and AppRole
//!
//! [`RegistryAuthenticator`] builds on a resolver to log in to a registry.

pub mod aws;
pub mod ecr;
pub mod managed;
pub mod registry;
pub mod resolver;
pub mod secrets_manager;
pub mod vault;

pub use ecr::{EcrSession, is_private_registry};
pub use managed::{KeyLayout, ManagedCredentials};
pub use registry::{DefaultRegistryAuthenticator, RegistryAuthenticator, RegistryLogin};
pub use resolver::{CredentialResolver, EnvCredentials, resolver_from_config};
pub use secrets_manager::SecretsManagerStore;
pub use vault::{HttpVaultApi, SealStatus, VaultApi, VaultError, VaultStore};
