//! Build orchestrator - runs Retrieve, Build, Push and Cleanup per request.

use futures::StreamExt;
use hoist_builder::{BuildInput, BuildStream, DockerImageBuilder};
use hoist_config::HoistConfig;
use hoist_core::{BuildEvent, BuildRequest, Error, ImageReference, RequestId, Result};
use hoist_source::SourceRetriever;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tracing::{error, info, warn};

use crate::inflight::{Claim, InFlight};
use crate::validate::{ValidatedRequest, validate_build, validate_push};

/// Receiving half of a request's output.
pub type EventReceiver = mpsc::Receiver<Result<BuildEvent>>;

/// State of a request on its worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Validating,
    Retrieving,
    Building,
    Pushing,
    CleaningUp,
    Done,
    Failed,
}

/// Accepts requests and runs each on the worker pool.
pub struct BuildOrchestrator {
    retriever: Arc<dyn SourceRetriever>,
    builder: DockerImageBuilder,
    workers: Arc<Semaphore>,
    inflight: InFlight,
    channel_capacity: usize,
    local: bool,
}

/// Everything a spawned worker owns.
struct Job {
    request: ValidatedRequest,
    retriever: Arc<dyn SourceRetriever>,
    builder: DockerImageBuilder,
    workers: Arc<Semaphore>,
    local: bool,
    tx: mpsc::Sender<Result<BuildEvent>>,
    _claim: Claim,
}

impl Job {
    fn id(&self) -> &RequestId {
        &self.request.id
    }

    fn state(&self, state: BuildState) {
        info!(request_id = %self.request.id, state = ?state, "Request state changed");
    }

    /// Forward non-completion events to the client. Completion events are
    /// collected so they can be sent last.
    async fn forward(&self, mut events: BuildStream, completions: &mut Vec<BuildEvent>) -> Result<()> {
        while let Some(item) = events.next().await {
            let event = item?;
            if event.is_completion() {
                completions.push(event);
            } else if self.tx.send(Ok(event)).await.is_err() {
                return Err(Error::Cancelled);
            }
        }
        Ok(())
    }

    async fn finish(&self, completions: Vec<BuildEvent>, result: Result<()>) {
        let result = match result {
            Ok(()) => {
                let mut delivered = Ok(());
                for event in completions {
                    if self.tx.send(Ok(event)).await.is_err() {
                        delivered = Err(Error::Cancelled);
                        break;
                    }
                }
                delivered
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => self.state(BuildState::Done),
            Err(Error::Cancelled) => {
                info!(request_id = %self.id(), "Client disconnected");
                self.state(BuildState::Failed);
            }
            Err(e) => {
                error!(request_id = %self.id(), error = %e, "Request failed");
                self.state(BuildState::Failed);
                let _ = self.tx.send(Err(e)).await;
            }
        }
    }

    async fn remove_image(&self, image: &str) {
        if self.local {
            return;
        }
        if let Err(e) = self.builder.remove(image).await {
            warn!(request_id = %self.id(), image, error = %e, "Image cleanup failed");
        }
    }

    async fn run_build(self) {
        let Ok(_permit) = self.workers.clone().acquire_owned().await else {
            let _ = self.tx.send(Err(Error::Internal("worker pool closed".to_string()))).await;
            return;
        };
        if self.tx.is_closed() {
            info!(request_id = %self.id(), "Client went away before work started");
            return;
        }

        let request = &self.request.request;
        self.state(BuildState::Retrieving);
        let tree = match self
            .retriever
            .retrieve(&request.config.source, &request.ignores, &self.request.id)
            .await
        {
            Ok(tree) => tree,
            Err(e) => return self.finish(Vec::new(), Err(e)).await,
        };

        let mut completions = Vec::new();
        let result = self.build_and_push(tree.clone(), &mut completions).await;

        self.state(BuildState::CleaningUp);
        if let Err(e) = self.retriever.cleanup(&tree).await {
            warn!(request_id = %self.id(), error = %e, "Working tree cleanup failed");
        }
        let built = completions
            .iter()
            .any(|e| matches!(e, BuildEvent::BuildCompleted { .. }));
        if built {
            let image = pushed_image(&completions).unwrap_or_else(|| request.config.image_reference().to_string());
            self.remove_image(&image).await;
        }

        self.finish(completions, result).await;
    }

    async fn build_and_push(&self, tree: PathBuf, completions: &mut Vec<BuildEvent>) -> Result<()> {
        let request = &self.request.request;

        self.state(BuildState::Building);
        let input = BuildInput {
            tree,
            config: request.config.clone(),
            tags: request.tags.clone(),
        };
        self.forward(self.builder.build(input), completions).await?;

        self.state(BuildState::Pushing);
        self.forward(self.builder.push(&request.config), completions).await
    }

    async fn run_push(self) {
        let Ok(_permit) = self.workers.clone().acquire_owned().await else {
            let _ = self.tx.send(Err(Error::Internal("worker pool closed".to_string()))).await;
            return;
        };

        let config = &self.request.request.config;
        self.state(BuildState::Pushing);
        let mut completions = Vec::new();
        let result = self.forward(self.builder.push(config), &mut completions).await;

        self.state(BuildState::CleaningUp);
        let image = pushed_image(&completions).unwrap_or_else(|| config.image_reference().to_string());
        self.remove_image(&image).await;

        self.finish(completions, result).await;
    }
}

fn pushed_image(completions: &[BuildEvent]) -> Option<String> {
    completions.iter().find_map(|e| match e {
        BuildEvent::PushCompleted { repository } => Some(repository.clone()),
        _ => None,
    })
}

impl BuildOrchestrator {
    pub fn new(
        config: &HoistConfig,
        retriever: Arc<dyn SourceRetriever>,
        builder: DockerImageBuilder,
    ) -> Self {
        Self {
            retriever,
            builder,
            workers: Arc::new(Semaphore::new(config.max_workers)),
            inflight: InFlight::new(),
            channel_capacity: config.channel_capacity,
            local: config.is_local(),
        }
    }

    pub fn builder(&self) -> &DockerImageBuilder {
        &self.builder
    }

    /// Ids of requests that are queued or running.
    pub fn in_flight(&self) -> &InFlight {
        &self.inflight
    }

    fn accept(&self, request: ValidatedRequest) -> Result<(Job, EventReceiver)> {
        let claim = self.inflight.claim(&request.id)?;
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        info!(request_id = %request.id, service = %request.service, "Request accepted");

        let job = Job {
            request,
            retriever: self.retriever.clone(),
            builder: self.builder.clone(),
            workers: self.workers.clone(),
            local: self.local,
            tx,
            _claim: claim,
        };
        Ok((job, rx))
    }

    /// Validate and start a build (retrieve, build, push, clean up).
    ///
    /// Validation and duplicate-id errors are returned before anything runs.
    /// The receiver yields build logs, push logs, then `BuildCompleted` and
    /// `PushCompleted`; a failure is the last item.
    pub fn build(&self, request: BuildRequest) -> Result<EventReceiver> {
        info!(request_id = %request.id, state = ?BuildState::Validating, "Request state changed");
        let validated = validate_build(request)?;
        let (job, rx) = self.accept(validated)?;
        tokio::spawn(job.run_build());
        Ok(rx)
    }

    /// Validate and start a push of an already-built image.
    pub fn push(&self, request: BuildRequest) -> Result<EventReceiver> {
        info!(request_id = %request.id, state = ?BuildState::Validating, "Request state changed");
        let validated = validate_push(request)?;
        let (job, rx) = self.accept(validated)?;
        tokio::spawn(job.run_push());
        Ok(rx)
    }

    /// Look up a built image. Not available yet.
    pub fn find(&self, _image: &ImageReference) -> Result<()> {
        Err(Error::Unimplemented("find is not implemented".to_string()))
    }

    /// Check that the image engine is reachable.
    pub async fn ready(&self) -> Result<()> {
        self.builder.engine().ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use hoist_config::{AwsSettings, DeploymentMode, LocalCredentials};
    use hoist_core::engine::{BuildOptions, EngineEvent, EventStream, ImageEngine};
    use hoist_core::{BuildConfig, RegistryCredentials, RegistryService};
    use hoist_credentials::{EnvCredentials, RegistryAuthenticator, RegistryLogin};
    use hoist_source::WorkspaceRetriever;
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeEngine {
        calls: Mutex<Vec<String>>,
        context_entries: Mutex<Vec<String>>,
        build_lines: usize,
    }

    impl FakeEngine {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn lines(prefix: &str, n: usize) -> EventStream {
        let events: Vec<_> = (0..n)
            .map(|i| Ok(EngineEvent::stream(format!("{} {}\n", prefix, i))))
            .collect();
        futures::stream::iter(events).boxed()
    }

    #[async_trait]
    impl ImageEngine for FakeEngine {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn ping(&self) -> Result<()> {
            Ok(())
        }

        fn build(&self, context: Bytes, options: BuildOptions) -> EventStream {
            self.calls.lock().unwrap().push(format!("build {}", options.tag));
            let mut archive = tar::Archive::new(&context[..]);
            let mut entries = self.context_entries.lock().unwrap();
            for entry in archive.entries().unwrap() {
                let entry = entry.unwrap();
                entries.push(entry.path().unwrap().to_string_lossy().to_string());
            }
            lines("build", self.build_lines.max(1))
        }

        fn pull(&self, image: &str, tag: &str, _: Option<RegistryCredentials>) -> EventStream {
            self.calls.lock().unwrap().push(format!("pull {}:{}", image, tag));
            lines("pull", 1)
        }

        async fn tag(&self, source: &str, repository: &str, tag: &str) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("tag {} {}:{}", source, repository, tag));
            Ok(())
        }

        fn push(&self, repository: &str, tag: &str, _: Option<RegistryCredentials>) -> EventStream {
            self.calls.lock().unwrap().push(format!("push {}:{}", repository, tag));
            lines("push", 1)
        }

        async fn remove(&self, image: &str) -> Result<()> {
            self.calls.lock().unwrap().push(format!("remove {}", image));
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeAuthenticator {
        logins: AtomicUsize,
    }

    #[async_trait]
    impl RegistryAuthenticator for FakeAuthenticator {
        async fn login(&self, _service: RegistryService) -> Result<RegistryLogin> {
            self.logins.fetch_add(1, Ordering::SeqCst);
            Ok(RegistryLogin {
                endpoint: "https://index.docker.io/v1/".to_string(),
                credentials: RegistryCredentials {
                    username: "user".to_string(),
                    password: "token".to_string(),
                    server_address: "https://index.docker.io/v1/".to_string(),
                },
            })
        }
    }

    /// Counts retrievals and delegates to a real workspace retriever.
    struct CountingRetriever {
        inner: WorkspaceRetriever,
        retrievals: AtomicUsize,
    }

    #[async_trait]
    impl SourceRetriever for CountingRetriever {
        async fn retrieve(&self, source: &str, ignores: &[String], id: &RequestId) -> Result<PathBuf> {
            self.retrievals.fetch_add(1, Ordering::SeqCst);
            self.inner.retrieve(source, ignores, id).await
        }

        async fn cleanup(&self, path: &Path) -> Result<()> {
            self.inner.cleanup(path).await
        }
    }

    struct Harness {
        orchestrator: BuildOrchestrator,
        engine: Arc<FakeEngine>,
        auth: Arc<FakeAuthenticator>,
        retriever: Arc<CountingRetriever>,
        work_dir: tempfile::TempDir,
        source: tempfile::TempDir,
    }

    fn harness(mode: DeploymentMode, engine: FakeEngine) -> Harness {
        let work_dir = tempfile::tempdir().unwrap();
        let source = tempfile::tempdir().unwrap();
        std::fs::write(source.path().join("train.py"), "print('hi')\n").unwrap();
        std::fs::write(source.path().join("train.pyc"), "bytecode").unwrap();
        std::fs::create_dir_all(source.path().join("pkg")).unwrap();
        std::fs::write(source.path().join("pkg/model.py"), "").unwrap();
        std::fs::write(source.path().join("pkg/model.pyc"), "bytecode").unwrap();

        let config = HoistConfig {
            mode,
            work_dir: work_dir.path().to_path_buf(),
            max_workers: 2,
            channel_capacity: 1,
            ..HoistConfig::default()
        };

        let resolver = Arc::new(EnvCredentials::new(
            LocalCredentials::default(),
            AwsSettings::default(),
        ));
        let retriever = Arc::new(CountingRetriever {
            inner: WorkspaceRetriever::new(work_dir.path(), resolver),
            retrievals: AtomicUsize::new(0),
        });
        let engine = Arc::new(engine);
        let auth = Arc::new(FakeAuthenticator::default());
        let builder = DockerImageBuilder::new(engine.clone(), auth.clone(), "hoist");

        Harness {
            orchestrator: BuildOrchestrator::new(&config, retriever.clone(), builder),
            engine,
            auth,
            retriever,
            work_dir,
            source,
        }
    }

    fn request(h: &Harness, id: &str) -> BuildRequest {
        BuildRequest {
            id: id.to_string(),
            ignores: vec!["*.pyc".to_string()],
            tags: vec![],
            config: BuildConfig {
                source: format!("dir://{}", h.source.path().display()),
                entry: "train.py".to_string(),
                revision: "v1".to_string(),
                service: "dockerhub".to_string(),
                repository: "acme/app".to_string(),
                ..BuildConfig::default()
            },
        }
    }

    async fn drain(mut rx: EventReceiver) -> Vec<Result<BuildEvent>> {
        let mut items = Vec::new();
        while let Some(item) = rx.recv().await {
            items.push(item);
        }
        items
    }

    async fn wait_until_idle(inflight: &InFlight) {
        for _ in 0..200 {
            if inflight.is_empty() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("requests still in flight");
    }

    #[tokio::test]
    async fn test_build_and_push_from_directory() {
        let h = harness(DeploymentMode::Production, FakeEngine::default());

        let rx = h.orchestrator.build(request(&h, "job-1")).unwrap();
        let items = drain(rx).await;

        let events: Vec<BuildEvent> = items.into_iter().map(|i| i.unwrap()).collect();
        let n = events.len();
        assert!(matches!(&events[0], BuildEvent::Log(l) if l.content == "build 0"));
        assert!(matches!(&events[n - 3], BuildEvent::Log(l) if l.content == "push 0"));
        assert!(matches!(
            &events[n - 2],
            BuildEvent::BuildCompleted { image } if image.to_string() == "acme/app:v1"
        ));
        assert!(matches!(
            &events[n - 1],
            BuildEvent::PushCompleted { repository } if repository == "acme/app:v1"
        ));

        let entries = h.engine.context_entries.lock().unwrap().clone();
        assert!(entries.iter().any(|e| e == "project/train.py"));
        assert!(entries.iter().any(|e| e == "project/pkg/model.py"));
        assert!(!entries.iter().any(|e| e.ends_with(".pyc")));

        assert_eq!(
            h.engine.calls(),
            vec!["build acme/app:v1", "push acme/app:v1", "remove acme/app:v1"]
        );
        assert!(!h.work_dir.path().join("job-1").exists());
        wait_until_idle(h.orchestrator.in_flight()).await;
    }

    #[tokio::test]
    async fn test_local_mode_keeps_image() {
        let h = harness(DeploymentMode::Local, FakeEngine::default());

        let items = drain(h.orchestrator.build(request(&h, "job-1")).unwrap()).await;

        assert!(items.iter().all(|i| i.is_ok()));
        assert!(!h.engine.calls().iter().any(|c| c.starts_with("remove")));
        assert!(!h.work_dir.path().join("job-1").exists());
    }

    #[tokio::test]
    async fn test_unknown_service_has_no_side_effects() {
        let h = harness(DeploymentMode::Production, FakeEngine::default());
        let mut req = request(&h, "job-1");
        req.config.service = "unknown".to_string();

        let err = h.orchestrator.build(req).unwrap_err();

        assert!(matches!(&err, Error::Validation(m) if m == "Service not one of dockerhub/ecr"));
        assert_eq!(h.retriever.retrievals.load(Ordering::SeqCst), 0);
        assert_eq!(h.auth.logins.load(Ordering::SeqCst), 0);
        assert!(h.orchestrator.in_flight().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_id_is_rejected() {
        let h = harness(DeploymentMode::Production, FakeEngine::default());

        let rx = h.orchestrator.build(request(&h, "job-1")).unwrap();
        let err = h.orchestrator.build(request(&h, "job-1")).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        drain(rx).await;
        wait_until_idle(h.orchestrator.in_flight()).await;
        let rx = h.orchestrator.build(request(&h, "job-1")).unwrap();
        drain(rx).await;
    }

    #[tokio::test]
    async fn test_retrieval_failure_is_reported() {
        let h = harness(DeploymentMode::Production, FakeEngine::default());
        let mut req = request(&h, "job-1");
        req.config.source = "dir:///nonexistent/hoist/source".to_string();

        let items = drain(h.orchestrator.build(req).unwrap()).await;

        assert_eq!(items.len(), 1);
        assert!(matches!(&items[0], Err(Error::Retrieval(m)) if m.contains("does not exist")));
        assert!(h.engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_still_cleans_up() {
        let h = harness(
            DeploymentMode::Production,
            FakeEngine {
                build_lines: 50,
                ..FakeEngine::default()
            },
        );

        let mut rx = h.orchestrator.build(request(&h, "job-1")).unwrap();
        assert!(rx.recv().await.unwrap().is_ok());
        drop(rx);

        wait_until_idle(h.orchestrator.in_flight()).await;
        assert!(!h.work_dir.path().join("job-1").exists());
        assert!(!h.engine.calls().iter().any(|c| c.starts_with("push")));
    }

    #[tokio::test]
    async fn test_push_only() {
        let h = harness(DeploymentMode::Production, FakeEngine::default());
        let mut req = request(&h, "job-2");
        req.config.source = String::new();

        let items = drain(h.orchestrator.push(req).unwrap()).await;

        assert!(matches!(
            items.last(),
            Some(Ok(BuildEvent::PushCompleted { repository })) if repository == "acme/app:v1"
        ));
        assert_eq!(h.engine.calls(), vec!["push acme/app:v1", "remove acme/app:v1"]);
        assert_eq!(h.retriever.retrievals.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_find_is_unimplemented() {
        let h = harness(DeploymentMode::Production, FakeEngine::default());
        let err = h
            .orchestrator
            .find(&ImageReference::new("acme/app", "v1"))
            .unwrap_err();
        assert!(matches!(err, Error::Unimplemented(_)));
    }
}
