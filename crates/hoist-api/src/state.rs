//! Application state.

use hoist_builder::DockerImageBuilder;
use hoist_config::HoistConfig;
use hoist_core::Result;
use hoist_credentials::{DefaultRegistryAuthenticator, resolver_from_config};
use hoist_engine::DockerEngine;
use hoist_scheduler::BuildOrchestrator;
use hoist_source::WorkspaceRetriever;
use std::sync::Arc;
use tracing::info;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<BuildOrchestrator>,
}

impl AppState {
    pub fn new(orchestrator: BuildOrchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }

    /// Wire the production components: configured credential source,
    /// workspace retriever and the local Docker daemon.
    pub async fn from_config(config: &HoistConfig) -> Result<Self> {
        let resolver = resolver_from_config(config).await?;
        info!(credentials = resolver.name(), "Credential source ready");

        let retriever = Arc::new(WorkspaceRetriever::new(&config.work_dir, resolver.clone()));
        let engine = Arc::new(DockerEngine::new()?);
        let auth = Arc::new(DefaultRegistryAuthenticator::new(resolver));
        let builder = DockerImageBuilder::new(engine, auth, &config.base_image_namespace);

        Ok(Self::new(BuildOrchestrator::new(config, retriever, builder)))
    }
}
