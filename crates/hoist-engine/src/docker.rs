//! Local Docker engine implementation.

use async_trait::async_trait;
use bollard::Docker;
use bollard::auth::DockerCredentials;
use bollard::image::{
    BuildImageOptions, CreateImageOptions, PushImageOptions, RemoveImageOptions, TagImageOptions,
};
use bollard::models::{BuildInfo, CreateImageInfo, PushImageInfo};
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use hoist_core::engine::{
    AuxDetail, BuildOptions, EngineEvent, EventStream, ImageEngine, ProgressDetail,
};
use hoist_core::{Error, RegistryCredentials, Result};
use std::future::Future;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

/// Image engine backed by the local Docker daemon.
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connect to the local Docker daemon (socket or `DOCKER_HOST`).
    pub fn new() -> Result<Self> {
        let docker =
            Docker::connect_with_local_defaults().map_err(|e| Error::Engine(e.to_string()))?;
        Ok(Self { docker })
    }

    /// Create with a custom Docker client.
    pub fn with_client(docker: Docker) -> Self {
        Self { docker }
    }
}

fn docker_credentials(credentials: Option<RegistryCredentials>) -> Option<DockerCredentials> {
    credentials.map(|c| DockerCredentials {
        username: Some(c.username),
        password: Some(c.password),
        serveraddress: Some(c.server_address),
        ..Default::default()
    })
}

fn progress_detail(detail: Option<bollard::models::ProgressDetail>) -> Option<ProgressDetail> {
    detail.map(|d| ProgressDetail {
        current: d.current,
        total: d.total,
    })
}

fn engine_error(err: bollard::errors::Error) -> Error {
    Error::Engine(err.to_string())
}

/// Drive a daemon stream on its own task and hand its events over a
/// single-slot channel. The task starts on first poll and stops once the
/// returned stream is dropped.
fn relay<F, Fut>(drive: F) -> EventStream
where
    F: FnOnce(mpsc::Sender<Result<EngineEvent>>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(1);
    let start = stream::once(async move {
        tokio::spawn(drive(tx));
    })
    .filter_map(|()| async { None::<Result<EngineEvent>> });

    Box::pin(start.chain(ReceiverStream::new(rx)))
}

async fn forward<S, T>(events: S, convert: fn(T) -> EngineEvent, tx: mpsc::Sender<Result<EngineEvent>>)
where
    S: Stream<Item = std::result::Result<T, bollard::errors::Error>>,
{
    futures::pin_mut!(events);
    while let Some(item) = events.next().await {
        if tx.send(item.map(convert).map_err(engine_error)).await.is_err() {
            debug!("Event receiver dropped, abandoning daemon stream");
            break;
        }
    }
}

/// Convert a build output message.
pub fn from_build_info(info: BuildInfo) -> EngineEvent {
    EngineEvent {
        stream: info.stream,
        status: info.status,
        id: info.id,
        progress: info.progress,
        progress_detail: progress_detail(info.progress_detail),
        aux: info.aux.map(|aux| AuxDetail {
            id: aux.id,
            ..Default::default()
        }),
        error: info
            .error
            .or_else(|| info.error_detail.and_then(|d| d.message)),
    }
}

/// Convert a pull progress message.
pub fn from_create_image_info(info: CreateImageInfo) -> EngineEvent {
    EngineEvent {
        status: info.status,
        id: info.id,
        progress: info.progress,
        progress_detail: progress_detail(info.progress_detail),
        error: info
            .error
            .or_else(|| info.error_detail.and_then(|d| d.message)),
        ..Default::default()
    }
}

/// Convert a push progress message.
pub fn from_push_image_info(info: PushImageInfo) -> EngineEvent {
    EngineEvent {
        status: info.status,
        progress: info.progress,
        progress_detail: progress_detail(info.progress_detail),
        error: info.error,
        ..Default::default()
    }
}

#[async_trait]
impl ImageEngine for DockerEngine {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn ping(&self) -> Result<()> {
        self.docker.ping().await.map_err(engine_error)?;
        Ok(())
    }

    fn build(&self, context: Bytes, options: BuildOptions) -> EventStream {
        info!(tag = %options.tag, context_bytes = context.len(), "Building image");

        let build_options = BuildImageOptions::<String> {
            dockerfile: options.dockerfile,
            t: options.tag,
            labels: options.labels,
            pull: options.pull,
            rm: true,
            forcerm: true,
            ..Default::default()
        };

        let docker = self.docker.clone();
        relay(move |tx| async move {
            let events = docker.build_image(build_options, None, Some(context));
            forward(events, from_build_info, tx).await;
        })
    }

    fn pull(
        &self,
        image: &str,
        tag: &str,
        credentials: Option<RegistryCredentials>,
    ) -> EventStream {
        info!(image, tag, "Pulling image");

        let options = CreateImageOptions::<String> {
            from_image: image.to_string(),
            tag: tag.to_string(),
            ..Default::default()
        };

        let docker = self.docker.clone();
        let credentials = docker_credentials(credentials);
        relay(move |tx| async move {
            let events = docker.create_image(Some(options), None, credentials);
            forward(events, from_create_image_info, tx).await;
        })
    }

    async fn tag(&self, source: &str, repository: &str, tag: &str) -> Result<()> {
        debug!(source, repository, tag, "Tagging image");

        let options = TagImageOptions::<String> {
            repo: repository.to_string(),
            tag: tag.to_string(),
        };

        self.docker
            .tag_image(source, Some(options))
            .await
            .map_err(|e| match e {
                bollard::errors::Error::DockerResponseServerError {
                    status_code: 404,
                    message,
                } => Error::NotFound(message),
                other => engine_error(other),
            })
    }

    fn push(
        &self,
        repository: &str,
        tag: &str,
        credentials: Option<RegistryCredentials>,
    ) -> EventStream {
        info!(repository, tag, "Pushing image");

        let options = PushImageOptions::<String> {
            tag: tag.to_string(),
        };

        let docker = self.docker.clone();
        let credentials = docker_credentials(credentials);
        let repository = repository.to_string();
        relay(move |tx| async move {
            let events = docker.push_image(&repository, Some(options), credentials);
            forward(events, from_push_image_info, tx).await;
        })
    }

    async fn remove(&self, image: &str) -> Result<()> {
        let options = RemoveImageOptions {
            force: true,
            ..Default::default()
        };

        match self.docker.remove_image(image, Some(options), None).await {
            Ok(deleted) => {
                debug!(image, entries = deleted.len(), "Image removed");
                Ok(())
            }
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                message,
            }) => Err(Error::NotFound(message)),
            Err(e) => Err(engine_error(e)),
        }
    }
}



#[cfg(test)]
mod integration_tests {
    use super::*;

    #[tokio::test]
    #[ignore]
    async fn test_ping() {
        let engine = DockerEngine::new().unwrap();
        engine.ping().await.unwrap();
        assert_eq!(engine.name(), "docker");
    }

    #[tokio::test]
    #[ignore]
    async fn test_pull_tag_remove() {
        let engine = DockerEngine::new().unwrap();

        let events: Vec<_> = engine.pull("alpine", "3.19", None).collect().await;
        assert!(events.iter().all(|e| e.as_ref().is_ok_and(|e| !e.is_error())));

        engine.tag("alpine:3.19", "hoist-test/alpine", "it").await.unwrap();
        engine.remove("hoist-test/alpine:it").await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_remove_missing_image() {
        let engine = DockerEngine::new().unwrap();
        let err = engine.remove("hoist-test/does-not-exist:none").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
