//! KDL configuration file parsing.
//!
//! ```kdl
//! mode "production"
//! work-dir "/var/lib/hoist/code"
//! workers 10
//! channel-capacity 32
//! base-image-namespace "hoist"
//! credentials "vault"
//! aws profile="default" region="us-east-1"
//! secrets-manager secret="hoist/creds"
//! vault addr="http://127.0.0.1:8200" approle="hoist" secret="hoist" mount="secret" {
//!     unseal attempts=5 interval-secs=10
//! }
//! tls cert="/etc/hoist/server-cert.pem" key="/etc/hoist/server-key.pem"
//! ```
//!
//! Secret values (tokens, unseal keys) are only read from the environment.

use kdl::{KdlDocument, KdlNode};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crate::settings::HoistConfig;
use crate::tls::TlsMaterial;
use crate::{ConfigError, ConfigResult};

impl HoistConfig {
    /// Overlay the settings found in a KDL document.
    pub fn apply_kdl(&mut self, kdl: &str) -> ConfigResult<()> {
        let doc: KdlDocument = kdl.parse()?;

        for node in doc.nodes() {
            match node.name().value() {
                "mode" => {
                    self.mode = required_string_arg(node, "mode")?.parse()?;
                }
                "work-dir" => {
                    self.work_dir = PathBuf::from(required_string_arg(node, "work-dir")?);
                }
                "workers" => {
                    self.max_workers = required_count_arg(node, "workers")?;
                }
                "channel-capacity" => {
                    self.channel_capacity = required_count_arg(node, "channel-capacity")?;
                }
                "base-image-namespace" => {
                    self.base_image_namespace = required_string_arg(node, "base-image-namespace")?;
                }
                "credentials" => {
                    self.credentials = required_string_arg(node, "credentials")?.parse()?;
                }
                "aws" => {
                    if let Some(profile) = get_string_prop(node, "profile") {
                        self.aws.profile = Some(profile);
                    }
                    if let Some(region) = get_string_prop(node, "region") {
                        self.aws.region = Some(region);
                    }
                }
                "secrets-manager" => {
                    if let Some(secret) = get_string_prop(node, "secret") {
                        self.secrets_manager.secret_id = secret;
                    }
                }
                "vault" => self.apply_vault_node(node)?,
                "tls" => {
                    let cert = get_string_prop(node, "cert")
                        .ok_or_else(|| ConfigError::MissingField("tls cert".to_string()))?;
                    let key = get_string_prop(node, "key")
                        .ok_or_else(|| ConfigError::MissingField("tls key".to_string()))?;
                    self.tls = Some(TlsMaterial::Files {
                        cert: PathBuf::from(cert),
                        key: PathBuf::from(key),
                    });
                }
                other => {
                    warn!(node = other, "Ignoring unknown configuration node");
                }
            }
        }

        Ok(())
    }

    fn apply_vault_node(&mut self, node: &KdlNode) -> ConfigResult<()> {
        if let Some(addr) = get_string_prop(node, "addr") {
            self.vault.addr = addr;
        }
        if let Some(approle) = get_string_prop(node, "approle") {
            self.vault.approle = approle;
        }
        if let Some(secret) = get_string_prop(node, "secret") {
            self.vault.secret = secret;
        }
        if let Some(mount) = get_string_prop(node, "mount") {
            self.vault.mount = mount;
        }

        if let Some(children) = node.children() {
            for child in children.nodes() {
                if child.name().value() != "unseal" {
                    continue;
                }
                if let Some(attempts) = get_int_prop(child, "attempts") {
                    self.vault.unseal_attempts = u32::try_from(attempts)
                        .map_err(|_| ConfigError::invalid("unseal attempts", "out of range"))?;
                }
                if let Some(secs) = get_int_prop(child, "interval-secs") {
                    let secs = u64::try_from(secs)
                        .map_err(|_| ConfigError::invalid("unseal interval-secs", "out of range"))?;
                    self.vault.unseal_interval = Duration::from_secs(secs);
                }
            }
        }

        Ok(())
    }
}

fn required_string_arg(node: &KdlNode, field: &str) -> ConfigResult<String> {
    get_first_string_arg(node).ok_or_else(|| ConfigError::MissingField(field.to_string()))
}

fn required_count_arg(node: &KdlNode, field: &str) -> ConfigResult<usize> {
    let value = get_first_int_arg(node).ok_or_else(|| ConfigError::MissingField(field.to_string()))?;
    usize::try_from(value).map_err(|_| ConfigError::invalid(field, "must be a positive integer"))
}

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_first_int_arg(node: &KdlNode) -> Option<i128> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_integer())
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

fn get_int_prop(node: &KdlNode, name: &str) -> Option<i128> {
    node.get(name).and_then(|v| v.as_integer())
}
