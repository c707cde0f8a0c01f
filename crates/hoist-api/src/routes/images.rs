//! Image build, push and lookup endpoints.

use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::StreamExt;
use hoist_core::{BuildRequest, ImageReference};
use hoist_scheduler::EventReceiver;
use serde::Deserialize;
use std::convert::Infallible;
use tokio_stream::wrappers::ReceiverStream;

use crate::AppState;
use crate::error::ApiError;
use crate::frame::Frame;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/build", post(build))
        .route("/push", post(push))
        .route("/find", post(find))
}

fn ndjson(rx: EventReceiver) -> Response {
    let lines = ReceiverStream::new(rx).map(|item| Ok::<_, Infallible>(Frame::from(item).to_line()));
    (
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(lines),
    )
        .into_response()
}

async fn build(
    State(state): State<AppState>,
    Json(req): Json<BuildRequest>,
) -> Result<Response, ApiError> {
    let rx = state.orchestrator.build(req)?;
    Ok(ndjson(rx))
}

async fn push(
    State(state): State<AppState>,
    Json(req): Json<BuildRequest>,
) -> Result<Response, ApiError> {
    let rx = state.orchestrator.push(req)?;
    Ok(ndjson(rx))
}

#[derive(Debug, Deserialize)]
struct FindRequest {
    image: String,
}

async fn find(
    State(state): State<AppState>,
    Json(req): Json<FindRequest>,
) -> Result<Response, ApiError> {
    state.orchestrator.find(&ImageReference::parse(&req.image))?;
    Ok(Json(serde_json::json!({ "image": req.image })).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes;
    use async_trait::async_trait;
    use axum::http::{Request, StatusCode};
    use bytes::Bytes;
    use hoist_builder::DockerImageBuilder;
    use hoist_config::{AwsSettings, HoistConfig, LocalCredentials};
    use hoist_core::engine::{BuildOptions, EngineEvent, EventStream, ImageEngine};
    use hoist_core::{RegistryCredentials, RegistryService, Result};
    use hoist_credentials::{EnvCredentials, RegistryAuthenticator, RegistryLogin};
    use hoist_scheduler::BuildOrchestrator;
    use hoist_source::WorkspaceRetriever;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tower::ServiceExt;

    struct FakeEngine;

    fn one(line: &str) -> EventStream {
        futures::stream::iter(vec![Ok(EngineEvent::stream(format!("{}\n", line)))]).boxed()
    }

    #[async_trait]
    impl ImageEngine for FakeEngine {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn ping(&self) -> Result<()> {
            Ok(())
        }

        fn build(&self, _context: Bytes, _options: BuildOptions) -> EventStream {
            one("Successfully built 0123abcd")
        }

        fn pull(&self, _: &str, _: &str, _: Option<RegistryCredentials>) -> EventStream {
            one("Pull complete")
        }

        async fn tag(&self, _: &str, _: &str, _: &str) -> Result<()> {
            Ok(())
        }

        fn push(&self, _: &str, _: &str, _: Option<RegistryCredentials>) -> EventStream {
            one("Pushed")
        }

        async fn remove(&self, _: &str) -> Result<()> {
            Ok(())
        }
    }

    struct FakeAuthenticator;

    #[async_trait]
    impl RegistryAuthenticator for FakeAuthenticator {
        async fn login(&self, _: RegistryService) -> Result<RegistryLogin> {
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

    fn app(work_dir: &tempfile::TempDir) -> Router {
        let config = HoistConfig {
            work_dir: work_dir.path().to_path_buf(),
            ..HoistConfig::default()
        };
        let resolver = Arc::new(EnvCredentials::new(
            LocalCredentials::default(),
            AwsSettings::default(),
        ));
        let retriever = Arc::new(WorkspaceRetriever::new(work_dir.path(), resolver));
        let builder = DockerImageBuilder::new(Arc::new(FakeEngine), Arc::new(FakeAuthenticator), "hoist");
        let orchestrator = BuildOrchestrator::new(&config, retriever, builder);
        routes::router(AppState::new(orchestrator))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_lines(response: Response) -> Vec<Value> {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec())
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    fn build_body(source: &std::path::Path, service: &str) -> Value {
        json!({
            "id": "job-1",
            "ignores": ["*.pyc"],
            "tags": [{ "name": "team", "value": "vision" }],
            "config": {
                "source": format!("dir://{}", source.display()),
                "entry": "train.py",
                "revision": "v1",
                "service": service,
                "repository": "acme/app"
            }
        })
    }

    #[tokio::test]
    async fn test_build_streams_ndjson() {
        let work_dir = tempfile::tempdir().unwrap();
        let source = tempfile::tempdir().unwrap();
        std::fs::write(source.path().join("train.py"), "print('hi')\n").unwrap();

        let response = app(&work_dir)
            .oneshot(post_json("/api/v1/build", build_body(source.path(), "dockerhub")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/x-ndjson"
        );
        let lines = body_lines(response).await;
        assert_eq!(
            lines,
            vec![
                json!({ "type": "log", "line": "Successfully built 0123abcd" }),
                json!({ "type": "log", "line": "Pushed" }),
                json!({ "type": "build_completed", "image": "acme/app:v1" }),
                json!({ "type": "push_completed", "repository": "acme/app:v1" }),
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_service_is_bad_request() {
        let work_dir = tempfile::tempdir().unwrap();
        let source = tempfile::tempdir().unwrap();

        let response = app(&work_dir)
            .oneshot(post_json("/api/v1/build", build_body(source.path(), "unknown")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_lines(response).await;
        assert_eq!(body[0], json!({ "error": "Service not one of dockerhub/ecr" }));
    }

    #[tokio::test]
    async fn test_failure_is_last_line() {
        let work_dir = tempfile::tempdir().unwrap();
        let missing = work_dir.path().join("missing");

        let response = app(&work_dir)
            .oneshot(post_json("/api/v1/build", build_body(&missing, "dockerhub")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let lines = body_lines(response).await;
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["type"], "error");
        assert_eq!(lines[0]["kind"], "retrieval");
    }

    #[tokio::test]
    async fn test_find_not_implemented() {
        let work_dir = tempfile::tempdir().unwrap();

        let response = app(&work_dir)
            .oneshot(post_json("/api/v1/find", json!({ "image": "acme/app:v1" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn test_health() {
        let work_dir = tempfile::tempdir().unwrap();
        let router = app(&work_dir);

        let response = router
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
