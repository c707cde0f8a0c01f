//! API routes.

pub mod health;
pub mod images;

use crate::AppState;
use axum::Router;

/// Build the main API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", images::router())
        .merge(health::router())
        .with_state(state)
}
