//! Request scheduling for Hoist.
//!
//! Validates requests, enforces one in-flight request per id and runs each
//! accepted request on a bounded worker pool. Output is delivered through a
//! bounded channel so a slow client slows the engine rather than buffering.

pub mod inflight;
pub mod orchestrator;
pub mod validate;

pub use inflight::{Claim, InFlight};
pub use orchestrator::{BuildOrchestrator, BuildState, EventReceiver};
pub use validate::{ValidatedRequest, validate_build, validate_push};
