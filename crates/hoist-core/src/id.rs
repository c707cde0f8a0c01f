//! Request identifiers.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Caller-supplied identifier of an in-flight build.
///
/// The id doubles as the name of the request's working directory, so it must
/// be a single, non-empty path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(Error::Validation("Id cannot be blank".to_string()));
        }
        if raw == "." || raw == ".." || raw.starts_with('.') {
            return Err(Error::Validation(format!(
                "Id `{}` must not start with a dot",
                raw
            )));
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(Error::Validation(format!(
                "Id `{}` may only contain letters, digits, '-', '_' and '.'",
                raw
            )));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for RequestId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
