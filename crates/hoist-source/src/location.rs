//! Source URI parsing.

use hoist_core::{Error, Result};
use std::path::PathBuf;
use url::Url;

/// Where a build's source tree comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    /// `dir:///absolute/path`
    Directory(PathBuf),
    /// `https://host/owner/repo.git`
    Git(Url),
    /// `s3://bucket/key.tar.gz`
    S3 { bucket: String, key: String },
}

impl SourceLocation {
    pub fn parse(source: &str) -> Result<Self> {
        let source = source.trim();
        if source.is_empty() {
            return Err(Error::Validation("Source cannot be blank".to_string()));
        }

        if let Some(path) = source.strip_prefix("dir://") {
            if path.is_empty() {
                return Err(Error::Validation(format!("Source `{}` has no path", source)));
            }
            return Ok(SourceLocation::Directory(PathBuf::from(path)));
        }

        let url = Url::parse(source)
            .map_err(|e| Error::Validation(format!("Unsupported source `{}`: {}", source, e)))?;

        match url.scheme() {
            "s3" => {
                let bucket = url
                    .host_str()
                    .filter(|b| !b.is_empty())
                    .ok_or_else(|| Error::Validation(format!("Source `{}` has no bucket", source)))?
                    .to_string();
                let key = urlencoding::decode(url.path().trim_start_matches('/'))
                    .map_err(|e| {
                        Error::Validation(format!("Source `{}` has a malformed key: {}", source, e))
                    })?
                    .into_owned();
                if key.is_empty() {
                    return Err(Error::Validation(format!("Source `{}` has no object key", source)));
                }
                Ok(SourceLocation::S3 { bucket, key })
            }
            scheme if url.path().trim_end_matches('/').ends_with(".git") => {
                if scheme != "https" {
                    return Err(Error::Validation(format!(
                        "Only https clone URLs are supported, got `{}`",
                        scheme
                    )));
                }
                if url.username() != "" || url.password().is_some() {
                    return Err(Error::Validation(
                        "Clone URLs must not embed credentials".to_string(),
                    ));
                }
                Ok(SourceLocation::Git(url))
            }
            _ => Err(Error::Validation(format!("Unsupported source `{}`", source))),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SourceLocation::Directory(_) => "dir",
            SourceLocation::Git(_) => "git",
            SourceLocation::S3 { .. } => "s3",
        }
    }
}
