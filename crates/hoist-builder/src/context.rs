//! In-memory build context archives.

use bytes::Bytes;
use hoist_core::{Error, Result};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Directory of the source tree inside the context.
pub const CONTEXT_DIR: &str = "project";

const MAX_CONTEXT_SIZE: usize = 500 * 1024 * 1024;

/// Package `Dockerfile` plus the tree (under [`CONTEXT_DIR`]) as an
/// uncompressed tar archive.
pub async fn build_context(dockerfile: String, tree: PathBuf) -> Result<Bytes> {
    let archive = tokio::task::spawn_blocking(move || write_context(&dockerfile, &tree))
        .await
        .map_err(|e| Error::Internal(format!("context task failed: {}", e)))?
        .map_err(|e| Error::Build(format!("failed to package build context: {}", e)))?;

    debug!(bytes = archive.len(), "Build context created");
    if archive.len() > MAX_CONTEXT_SIZE {
        warn!(
            megabytes = archive.len() / 1024 / 1024,
            "Build context is very large; consider ignore patterns"
        );
    }

    Ok(Bytes::from(archive))
}

fn write_context(dockerfile: &str, tree: &Path) -> io::Result<Vec<u8>> {
    let mut tar = tar::Builder::new(Vec::new());
    tar.follow_symlinks(false);

    let mut header = tar::Header::new_gnu();
    header.set_size(dockerfile.len() as u64);
    header.set_mode(0o644);
    tar.append_data(&mut header, "Dockerfile", dockerfile.as_bytes())?;

    tar.append_dir_all(CONTEXT_DIR, tree)?;
    tar.into_inner()
}
