//! HTTP API for Hoist.
//!
//! Build and push requests are answered with newline-delimited JSON streams
//! of log lines and completion records.

pub mod error;
pub mod frame;
pub mod routes;
pub mod state;

pub use state::AppState;
