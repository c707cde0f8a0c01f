//! Build requests and image references.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// A request to build (and push) one image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRequest {
    /// Unique identifier of the in-flight build.
    pub id: String,
    /// Glob patterns excluded from the retrieved source tree.
    #[serde(default)]
    pub ignores: Vec<String>,
    /// Image labels, in caller order.
    #[serde(default)]
    pub tags: Vec<Tag>,
    /// Build configuration.
    pub config: BuildConfig,
}

/// A name/value image label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

impl Tag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Per-build configuration supplied by the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Source URI: `dir://`, `s3://` or an `https://` URL ending in `.git`.
    pub source: String,
    pub namespace: String,
    pub name: String,
    pub framework: String,
    pub version: String,
    /// Python runtime version used in the base image tag.
    pub pyversion: String,
    /// Resource class (e.g. `cpu`, `gpu`) used in the base image tag.
    pub resource: String,
    /// Entry file, relative to the project root.
    pub entry: String,
    pub revision: String,
    /// Target registry service name (`dockerhub` or `ecr`).
    pub service: String,
    pub repository: String,
    /// Relative path of a user-supplied Dockerfile inside the source tree.
    pub dockerfile: Option<String>,
    /// Explicit base image; overrides the synthesized one.
    pub base_image: Option<String>,
}

impl BuildConfig {
    /// The local image this config builds.
    pub fn image_reference(&self) -> ImageReference {
        ImageReference::new(&self.repository, &self.revision)
    }
}

/// Registry services images can be pushed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum RegistryService {
    #[display("dockerhub")]
    DockerHub,
    #[display("ecr")]
    Ecr,
}

impl FromStr for RegistryService {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dockerhub" => Ok(RegistryService::DockerHub),
            "ecr" => Ok(RegistryService::Ecr),
            _ => Err(Error::Validation(
                "Service not one of dockerhub/ecr".to_string(),
            )),
        }
    }
}

/// A registry-qualified image name plus revision. The revision is either a
/// tag or a content digest (`sha256:<hex>`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    pub repository: String,
    pub revision: String,
}

impl ImageReference {
    pub fn new(repository: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            revision: revision.into(),
        }
    }

    /// Split `repo:tag` or `repo@digest` into its parts, defaulting the tag
    /// to `latest`. A tag alongside a digest is dropped; the digest pins.
    ///
    /// A trailing `:<digits>` segment that is followed by a path is a registry
    /// port, not a tag (`localhost:5000/app`).
    pub fn parse(image: &str) -> Self {
        if let Some((name, digest)) = image.split_once('@') {
            if !digest.is_empty() {
                return Self::new(Self::parse(name).repository, digest);
            }
        }
        if let Some(pos) = image.rfind(':') {
            let (repository, tag) = (&image[..pos], &image[pos + 1..]);
            if !tag.contains('/') && !tag.is_empty() {
                return Self::new(repository, tag);
            }
        }
        Self::new(image, "latest")
    }

    /// Tags cannot contain `:`; digests always do.
    pub fn is_digest(&self) -> bool {
        self.revision.contains(':')
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let separator = if self.is_digest() { '@' } else { ':' };
        write!(f, "{}{}{}", self.repository, separator, self.revision)
    }
}
