//! Git repository cloning.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{info, warn};
use url::Url;

/// User name GitHub expects alongside a token in clone URLs.
const TOKEN_USER: &str = "x-access-token";

/// Fetches a repository's working tree into a directory.
#[async_trait]
pub trait RepositoryCloner: Send + Sync {
    async fn clone_repository(
        &self,
        url: &Url,
        token: Option<&str>,
        dest: &Path,
    ) -> Result<(), CloneError>;
}

/// Clones with the `git` command line client.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: String,
}

impl Default for GitCli {
    fn default() -> Self {
        Self {
            program: "git".to_string(),
        }
    }
}

impl GitCli {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

/// `url` with the token set as basic-auth credentials (percent-encoded).
pub fn authenticated_url(url: &Url, token: Option<&str>) -> Result<Url, CloneError> {
    let mut url = url.clone();
    if let Some(token) = token {
        url.set_username(TOKEN_USER)
            .map_err(|_| CloneError::InvalidUrl)?;
        url.set_password(Some(token))
            .map_err(|_| CloneError::InvalidUrl)?;
    }
    Ok(url)
}

/// Replace every occurrence of each secret in `text`.
pub fn redact(text: &str, secrets: &[&str]) -> String {
    secrets
        .iter()
        .filter(|s| !s.is_empty())
        .fold(text.to_string(), |text, secret| text.replace(secret, "[REDACTED]"))
}

#[async_trait]
impl RepositoryCloner for GitCli {
    async fn clone_repository(
        &self,
        url: &Url,
        token: Option<&str>,
        dest: &Path,
    ) -> Result<(), CloneError> {
        let auth_url = authenticated_url(url, token)?;

        info!(url = %url, path = %dest.display(), "Cloning repository");

        let output = Command::new(&self.program)
            .arg("clone")
            .args(["--depth", "1", "--"])
            .arg(auth_url.as_str())
            .arg(dest)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(url = %url, "Git clone failed");
            // The raw token, and the form git echoes back from the URL.
            let secrets: Vec<&str> = token.into_iter().chain(auth_url.password()).collect();
            return Err(CloneError::CloneFailed(redact(stderr.trim(), &secrets)));
        }

        info!(path = %dest.display(), "Repository cloned");
        Ok(())
    }
}

/// Git operation errors.
#[derive(Debug, thiserror::Error)]
pub enum CloneError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Clone failed: {0}")]
    CloneFailed(String),

    #[error("Invalid repository URL")]
    InvalidUrl,
}
