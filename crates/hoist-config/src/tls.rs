//! TLS key material.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::path::PathBuf;

use crate::{ConfigError, ConfigResult};

/// Where the server certificate and key come from.
#[derive(Clone)]
pub enum TlsMaterial {
    /// PEM files on disk.
    Files { cert: PathBuf, key: PathBuf },
    /// Base64-encoded PEM, typically injected through the environment.
    Inline { cert: String, key: String },
}

impl std::fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TlsMaterial::Files { cert, key } => f
                .debug_struct("Files")
                .field("cert", cert)
                .field("key", key)
                .finish(),
            TlsMaterial::Inline { .. } => f.write_str("Inline(..)"),
        }
    }
}

/// Decoded PEM bytes.
pub struct TlsPem {
    pub cert: Vec<u8>,
    pub key: Vec<u8>,
}

impl TlsMaterial {
    /// Read or decode the PEM bytes.
    pub fn load(&self) -> ConfigResult<TlsPem> {
        match self {
            TlsMaterial::Files { cert, key } => Ok(TlsPem {
                cert: std::fs::read(cert)?,
                key: std::fs::read(key)?,
            }),
            TlsMaterial::Inline { cert, key } => Ok(TlsPem {
                cert: decode("HOIST_TLS_CERT_B64", cert)?,
                key: decode("HOIST_TLS_KEY_B64", key)?,
            }),
        }
    }
}

fn decode(field: &str, value: &str) -> ConfigResult<Vec<u8>> {
    STANDARD
        .decode(value.trim())
        .map_err(|e| ConfigError::invalid(field, e.to_string()))
}
