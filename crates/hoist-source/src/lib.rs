//! Source retrieval for Hoist.
//!
//! Materializes a build's source tree under `<work_dir>/<request id>` from a
//! local directory, a git repository or a gzip tarball in S3, with ignore
//! patterns applied. Every request gets its own tree; the orchestrator removes
//! it with [`SourceRetriever::cleanup`].

pub mod archive;
pub mod copy;
pub mod filter;
pub mod git;
pub mod location;
pub mod retriever;

pub use archive::{ArchiveStore, S3ArchiveStore};
pub use filter::IgnoreFilter;
pub use git::{CloneError, GitCli, RepositoryCloner};
pub use location::SourceLocation;
pub use retriever::{SourceRetriever, WorkspaceRetriever};
