//! Environment variable overrides.

use std::path::PathBuf;
use std::time::Duration;

use crate::settings::{DeploymentMode, HoistConfig};
use crate::tls::TlsMaterial;
use crate::{ConfigError, ConfigResult};

impl HoistConfig {
    /// Overlay settings from environment variables, read through `lookup`.
    ///
    /// Empty values are treated as unset.
    pub fn apply_env<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(mode) = get("HOIST_MODE") {
            self.mode = mode.parse()?;
        } else if get("MODE").is_some_and(|m| m.eq_ignore_ascii_case("local")) {
            self.mode = DeploymentMode::Local;
        }

        if let Some(dir) = get("HOIST_WORK_DIR") {
            self.work_dir = PathBuf::from(dir);
        }
        if let Some(workers) = get("HOIST_MAX_WORKERS") {
            self.max_workers = parse_number("HOIST_MAX_WORKERS", &workers)?;
        }
        if let Some(capacity) = get("HOIST_CHANNEL_CAPACITY") {
            self.channel_capacity = parse_number("HOIST_CHANNEL_CAPACITY", &capacity)?;
        }
        if let Some(namespace) = get("HOIST_BASE_IMAGE_NAMESPACE") {
            self.base_image_namespace = namespace;
        }
        if let Some(source) = get("HOIST_CREDENTIALS") {
            self.credentials = source.parse()?;
        }

        self.local.dockerhub_user = get("DOCKERHUB_USER").or(self.local.dockerhub_user.take());
        self.local.dockerhub_token = get("DOCKERHUB_TOKEN").or(self.local.dockerhub_token.take());
        self.local.github_token = get("GITHUB_TOKEN").or(self.local.github_token.take());

        if let Some(profile) = get("AWS_PROFILE") {
            self.aws.profile = Some(profile);
        }
        if let Some(region) = get("AWS_REGION").or_else(|| get("AWS_DEFAULT_REGION")) {
            self.aws.region = Some(region);
        }
        if let Some(uri) = get("AWS_CONTAINER_CREDENTIALS_RELATIVE_URI") {
            self.aws.container_credentials_uri = Some(uri);
        }
        if let Some(secret) = get("SECRET_NAME") {
            self.secrets_manager.secret_id = secret;
        }

        if let Some(addr) = get("VAULT_ADDR") {
            self.vault.addr = addr;
        }
        if let Some(token) = get("VAULT_TOKEN") {
            self.vault.token = Some(token);
        }
        if let Some(key) = get("VAULT_UNSEAL") {
            self.vault.unseal_key = Some(key);
        }
        if let Some(approle) = get("VAULT_APPROLE") {
            self.vault.approle = approle;
        }
        if let Some(secret) = get("VAULT_SECRET") {
            self.vault.secret = secret;
        }
        if let Some(mount) = get("VAULT_MOUNT") {
            self.vault.mount = mount;
        }
        if let Some(attempts) = get("VAULT_UNSEAL_ATTEMPTS") {
            self.vault.unseal_attempts = parse_number("VAULT_UNSEAL_ATTEMPTS", &attempts)?;
        }
        if let Some(secs) = get("VAULT_UNSEAL_INTERVAL_SECS") {
            self.vault.unseal_interval =
                Duration::from_secs(parse_number("VAULT_UNSEAL_INTERVAL_SECS", &secs)?);
        }

        match (get("HOIST_TLS_CERT_B64"), get("HOIST_TLS_KEY_B64")) {
            (Some(cert), Some(key)) => self.tls = Some(TlsMaterial::Inline { cert, key }),
            (None, None) => {}
            _ => {
                return Err(ConfigError::MissingField(
                    "HOIST_TLS_CERT_B64 and HOIST_TLS_KEY_B64 must be set together".to_string(),
                ));
            }
        }
        match (get("HOIST_TLS_CERT"), get("HOIST_TLS_KEY")) {
            (Some(cert), Some(key)) => {
                self.tls = Some(TlsMaterial::Files {
                    cert: PathBuf::from(cert),
                    key: PathBuf::from(key),
                });
            }
            (None, None) => {}
            _ => {
                return Err(ConfigError::MissingField(
                    "HOIST_TLS_CERT and HOIST_TLS_KEY must be set together".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Defaults overlaid with `lookup` only; used where the process
    /// environment must not leak in.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.apply_env(lookup)?;
        config.validate()?;
        Ok(config)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(key, format!("`{}` is not a valid number", value)))
}
