//! Image engine backends for Hoist.
//!
//! Provides [`DockerEngine`], an [`ImageEngine`] over the local Docker daemon.

pub mod docker;

pub use docker::DockerEngine;
pub use hoist_core::engine::{BuildOptions, EngineEvent, EventStream, ImageEngine};
