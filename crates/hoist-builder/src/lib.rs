//! Image building for Hoist.
//!
//! [`DockerImageBuilder`] turns a retrieved source tree into an image:
//! Dockerfile generation (or a user-supplied one), an in-memory build
//! context, an optional authenticated base-image pull, the build itself, and
//! later the push and local removal. Build and push results are lazy streams
//! of [`hoist_core::BuildEvent`] that end with a typed completion value.

pub mod builder;
pub mod context;
pub mod dockerfile;
pub mod output;

pub use builder::{BuildInput, BuildStream, BuilderState, DockerImageBuilder};
pub use context::{CONTEXT_DIR, build_context};
pub use dockerfile::{PROJECT_DIR, base_image, render_dockerfile};
pub use output::normalize;
