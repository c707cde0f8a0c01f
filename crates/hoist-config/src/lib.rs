//! Deployment configuration for Hoist.
//!
//! Configuration is assembled once at process start, in increasing
//! precedence, from:
//! - Built-in defaults
//! - An optional KDL file
//! - Environment variables
//!
//! The resulting [`HoistConfig`] is passed by value to every component.

pub mod env;
pub mod error;
pub mod file;
pub mod settings;
pub mod tls;

pub use error::{ConfigError, ConfigResult};
pub use settings::{
    AwsSettings, CredentialsSource, DeploymentMode, HoistConfig, LocalCredentials,
    SecretsManagerSettings, VaultSettings,
};
pub use tls::{TlsMaterial, TlsPem};
