//! Core domain types and traits for the Hoist image builder.
//!
//! This crate contains:
//! - Build requests, configuration and request identifiers
//! - Authentication material for registries, source hosts and object storage
//! - The image engine trait and its structured event type
//! - Log lines and typed stream completion events
//! - Secret storage abstraction
//! - A bounded retry combinator

pub mod auth;
pub mod engine;
pub mod error;
pub mod event;
pub mod id;
pub mod request;
pub mod retry;
pub mod secret;

pub use auth::{AuthConfig, AwsAuth, AwsIdentity, RegistryCredentials, ServiceKind};
pub use error::{Error, Result};
pub use event::{BuildEvent, LogLine};
pub use id::RequestId;
pub use request::{BuildConfig, BuildRequest, ImageReference, RegistryService, Tag};
