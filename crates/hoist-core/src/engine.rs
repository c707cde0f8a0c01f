//! Image engine trait and its structured event type.
//!
//! An image engine builds, pulls, tags, pushes and removes images (the local
//! Docker daemon in production). Long-running operations return a stream of
//! structured events that is polled lazily by the caller.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{RegistryCredentials, Result};

/// Stream of structured engine events.
pub type EventStream = BoxStream<'static, Result<EngineEvent>>;

/// One structured event emitted by the engine during build, pull or push.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineEvent {
    /// Raw build output.
    pub stream: Option<String>,
    /// Status text (pull/push progress).
    pub status: Option<String>,
    /// Layer or image id the status refers to.
    pub id: Option<String>,
    /// Pre-rendered progress bar.
    pub progress: Option<String>,
    pub progress_detail: Option<ProgressDetail>,
    pub aux: Option<AuxDetail>,
    /// Set when the engine reports a failure for this operation.
    pub error: Option<String>,
}

impl EngineEvent {
    pub fn stream(text: impl Into<String>) -> Self {
        Self {
            stream: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn status(text: impl Into<String>) -> Self {
        Self {
            status: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressDetail {
    pub current: Option<i64>,
    pub total: Option<i64>,
}

/// Summary the engine attaches once an image is written or pushed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxDetail {
    pub id: Option<String>,
    pub tag: Option<String>,
    pub digest: Option<String>,
    pub size: Option<i64>,
}

/// Options for a single image build.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Fully qualified tag (`repository:revision`).
    pub tag: String,
    /// Dockerfile path inside the context archive.
    pub dockerfile: String,
    pub labels: HashMap<String, String>,
    /// Let the engine pull the base image itself.
    pub pull: bool,
}

/// Trait for image engines.
#[async_trait]
pub trait ImageEngine: Send + Sync {
    /// Name of this engine.
    fn name(&self) -> &'static str;

    /// Check that the engine is reachable.
    async fn ping(&self) -> Result<()>;

    /// Build an image from an uncompressed tar context.
    ///
    /// Intermediate containers are always removed, on success and failure.
    fn build(&self, context: Bytes, options: BuildOptions) -> EventStream;

    /// Pull `image:tag`, authenticating with `credentials` when given.
    fn pull(
        &self,
        image: &str,
        tag: &str,
        credentials: Option<RegistryCredentials>,
    ) -> EventStream;

    /// Add the tag `repository:tag` to an existing local image.
    async fn tag(&self, source: &str, repository: &str, tag: &str) -> Result<()>;

    /// Push `repository:tag`.
    fn push(
        &self,
        repository: &str,
        tag: &str,
        credentials: Option<RegistryCredentials>,
    ) -> EventStream;

    /// Force-remove a local image. Returns `Error::NotFound` if it does not exist.
    async fn remove(&self, image: &str) -> Result<()>;
}
