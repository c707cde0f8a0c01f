//! Image builder: build, push and remove.

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use hoist_core::engine::{BuildOptions, ImageEngine};
use hoist_core::{BuildConfig, BuildEvent, Error, ImageReference, RegistryService, Result, Tag};
use hoist_credentials::{RegistryAuthenticator, is_private_registry};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::context::build_context;
use crate::dockerfile::{base_image, first_from, has_requirements, labels, read_custom, render_dockerfile};
use crate::output::{log_events, until_failure};

/// Lazy stream of build or push output, ending in a completion event.
pub type BuildStream = BoxStream<'static, Result<BuildEvent>>;

/// Lifecycle of one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderState {
    Idle,
    DockerfileReady,
    Pulled,
    Building,
    Built,
    Pushed,
    Removed,
}

/// Everything needed to build one image.
#[derive(Debug, Clone)]
pub struct BuildInput {
    /// Retrieved source tree.
    pub tree: PathBuf,
    pub config: BuildConfig,
    pub tags: Vec<Tag>,
}

/// Builds, pushes and removes images through an [`ImageEngine`].
#[derive(Clone)]
pub struct DockerImageBuilder {
    engine: Arc<dyn ImageEngine>,
    auth: Arc<dyn RegistryAuthenticator>,
    base_namespace: String,
}

fn transition(image: String, state: BuilderState) -> BuildStream {
    stream::once(async move {
        info!(image = %image, state = ?state, "Builder state changed");
    })
    .filter_map(|()| async { None })
    .boxed()
}

impl DockerImageBuilder {
    pub fn new(
        engine: Arc<dyn ImageEngine>,
        auth: Arc<dyn RegistryAuthenticator>,
        base_namespace: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            auth,
            base_namespace: base_namespace.into(),
        }
    }

    pub fn engine(&self) -> &Arc<dyn ImageEngine> {
        &self.engine
    }

    /// Build the image for `input`. Nothing happens until the stream is polled.
    pub fn build(&self, input: BuildInput) -> BuildStream {
        let builder = self.clone();
        let events = stream::once(async move { builder.prepare_build(input).await })
            .try_flatten()
            .boxed();
        until_failure(events)
    }

    async fn prepare_build(self, input: BuildInput) -> Result<BuildStream> {
        let BuildInput { tree, config, tags } = input;
        let image = config.image_reference();
        info!(image = %image, state = ?BuilderState::Idle, "Preparing build");

        let custom = config
            .dockerfile
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty());
        let (dockerfile, base) = match custom {
            Some(path) => {
                let dockerfile = read_custom(&tree, path).await?;
                let base = first_from(&dockerfile);
                (dockerfile, base)
            }
            None => {
                let manifest = has_requirements(&tree).await;
                let dockerfile = render_dockerfile(&config, &tags, manifest, &self.base_namespace)?;
                (dockerfile, Some(base_image(&config, &self.base_namespace)))
            }
        };
        info!(image = %image, state = ?BuilderState::DockerfileReady, "Builder state changed");

        let context = build_context(dockerfile, tree).await?;

        let pull = match base.filter(|b| is_private_registry(b)) {
            Some(base) => {
                let login = self.auth.login(RegistryService::Ecr).await?;
                let base = ImageReference::parse(&base);
                info!(image = %image, base = %base, "Pulling private base image");
                log_events(
                    self.engine
                        .pull(&base.repository, &base.revision, Some(login.credentials)),
                    Error::Build,
                )
            }
            None => stream::empty().boxed(),
        };

        let options = BuildOptions {
            tag: image.to_string(),
            dockerfile: "Dockerfile".to_string(),
            labels: labels(&config, &tags).into_iter().collect(),
            pull: false,
        };
        let engine = self.engine.clone();
        let build = stream::once(async move { log_events(engine.build(context, options), Error::Build) })
            .flatten()
            .boxed();

        let tag = image.to_string();
        let completed = stream::once(async move { Ok(BuildEvent::BuildCompleted { image }) });

        Ok(pull
            .chain(transition(tag.clone(), BuilderState::Pulled))
            .chain(transition(tag.clone(), BuilderState::Building))
            .chain(build)
            .chain(transition(tag, BuilderState::Built))
            .chain(completed)
            .boxed())
    }

    /// Push the image `config` describes to its registry.
    ///
    /// Credentials are resolved on every push; ECR tokens are short-lived.
    pub fn push(&self, config: &BuildConfig) -> BuildStream {
        let builder = self.clone();
        let config = config.clone();
        let events = stream::once(async move { builder.prepare_push(config).await })
            .try_flatten()
            .boxed();
        until_failure(events)
    }

    async fn prepare_push(self, config: BuildConfig) -> Result<BuildStream> {
        if config.repository.trim().is_empty() {
            return Err(Error::Push("Repository cannot be blank".to_string()));
        }
        let service: RegistryService = config.service.parse()?;
        let image = config.image_reference();
        let login = self.auth.login(service).await?;

        let target = match service {
            RegistryService::Ecr if !is_private_registry(&image.repository) => {
                let target = format!("{}/{}", login.host(), image.repository);
                self.engine
                    .tag(&image.to_string(), &target, &image.revision)
                    .await
                    .map_err(|e| Error::Push(format!("failed to tag {} as {}: {}", image, target, e)))?;
                ImageReference::new(target, image.revision.clone())
            }
            _ => image,
        };
        info!(image = %target, service = %service, "Pushing image");

        let events = log_events(
            self.engine
                .push(&target.repository, &target.revision, Some(login.credentials)),
            Error::Push,
        );
        let pushed = target.to_string();
        let completed = stream::once({
            let repository = pushed.clone();
            async move { Ok(BuildEvent::PushCompleted { repository }) }
        });

        Ok(events
            .chain(transition(pushed, BuilderState::Pushed))
            .chain(completed)
            .boxed())
    }

    /// Force-remove a local image. For an ECR-qualified reference the
    /// unqualified tag is removed too. Missing images are ignored.
    pub async fn remove(&self, image: &str) -> Result<()> {
        let mut result = self.remove_one(image).await;

        if is_private_registry(image) {
            if let Some((_, local)) = image.split_once('/') {
                let local = self.remove_one(local).await;
                result = result.and(local);
            }
        }

        if result.is_ok() {
            info!(image, state = ?BuilderState::Removed, "Builder state changed");
        }
        result
    }

    async fn remove_one(&self, image: &str) -> Result<()> {
        match self.engine.remove(image).await {
            Ok(()) => {
                debug!(image, "Removed image");
                Ok(())
            }
            Err(Error::NotFound(_)) => {
                debug!(image, "Image already gone");
                Ok(())
            }
            Err(e) => {
                warn!(image, error = %e, "Failed to remove image");
                Err(Error::Cleanup(format!("failed to remove image {}: {}", image, e)))
            }
        }
    }
}
