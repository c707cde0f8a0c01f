//! Materializing source trees into the working directory.

use async_trait::async_trait;
use hoist_core::{AuthConfig, Error, RequestId, Result, ServiceKind};
use hoist_credentials::CredentialResolver;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info};

use crate::archive::{ArchiveStore, S3ArchiveStore, unpack_tar_gz};
use crate::copy::copy_tree;
use crate::filter::IgnoreFilter;
use crate::git::{GitCli, RepositoryCloner};
use crate::location::SourceLocation;

const STAGING: &str = ".staging";

/// Fetches a build's source into a local, filtered working tree.
#[async_trait]
pub trait SourceRetriever: Send + Sync {
    /// Materialize `source` minus ignored entries. Returns the tree's path.
    async fn retrieve(&self, source: &str, ignores: &[String], id: &RequestId) -> Result<PathBuf>;

    /// Remove a tree returned by [`SourceRetriever::retrieve`].
    async fn cleanup(&self, path: &Path) -> Result<()>;
}

/// Retrieves into `<work_dir>/<id>`, staging under `<work_dir>/.staging`.
pub struct WorkspaceRetriever {
    work_dir: PathBuf,
    resolver: Arc<dyn CredentialResolver>,
    cloner: Arc<dyn RepositoryCloner>,
    archives: Arc<dyn ArchiveStore>,
}

impl WorkspaceRetriever {
    pub fn new(work_dir: impl Into<PathBuf>, resolver: Arc<dyn CredentialResolver>) -> Self {
        Self {
            work_dir: work_dir.into(),
            resolver,
            cloner: Arc::new(GitCli::default()),
            archives: Arc::new(S3ArchiveStore),
        }
    }

    pub fn with_cloner(mut self, cloner: Arc<dyn RepositoryCloner>) -> Self {
        self.cloner = cloner;
        self
    }

    pub fn with_archive_store(mut self, archives: Arc<dyn ArchiveStore>) -> Self {
        self.archives = archives;
        self
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn staging_dir(&self, id: &RequestId) -> Result<TempDir> {
        let parent = self.work_dir.join(STAGING);
        std::fs::create_dir_all(&parent)
            .map_err(|e| io_error("failed to create staging directory", e))?;
        tempfile::Builder::new()
            .prefix(&format!("{}-", id))
            .tempdir_in(&parent)
            .map_err(|e| io_error("failed to create staging directory", e))
    }

    /// Where our own working directory sits inside `source`, relative to it.
    /// A source that is the working directory itself only loses `.staging`.
    async fn nested_work_dir(&self, source: &Path) -> Result<Option<PathBuf>> {
        let source = tokio::fs::canonicalize(source)
            .await
            .map_err(|e| io_error("failed to resolve source directory", e))?;
        let work_dir = tokio::fs::canonicalize(&self.work_dir)
            .await
            .map_err(|e| io_error("failed to resolve working directory", e))?;

        Ok(match work_dir.strip_prefix(&source) {
            Ok(relative) if relative.as_os_str().is_empty() => Some(PathBuf::from(STAGING)),
            Ok(relative) => Some(relative.to_path_buf()),
            Err(_) => None,
        })
    }

    async fn stage(
        &self,
        location: &SourceLocation,
        filter: IgnoreFilter,
        staging: &Path,
        tree: &Path,
    ) -> Result<u64> {
        match location {
            SourceLocation::Directory(path) => {
                let filter = match self.nested_work_dir(path).await? {
                    Some(nested) => {
                        debug!(path = %nested.display(), "Pruning working directory from source");
                        filter.exclude_path(nested)
                    }
                    None => filter,
                };
                copy_tree(path, tree, &filter)
                    .await
                    .map_err(|e| io_error("failed to copy source directory", e))
            }

            SourceLocation::Git(url) => {
                let token = match self.resolver.resolve(ServiceKind::GitHub).await? {
                    AuthConfig::GitHub { token } => token,
                    other => return Err(unexpected_auth(&other)),
                };

                let clone = staging.join("clone");
                self.cloner
                    .clone_repository(url, Some(&token), &clone)
                    .await
                    .map_err(|e| Error::Retrieval(e.to_string()))?;

                copy_tree(&clone, tree, &filter.exclude_name(".git"))
                    .await
                    .map_err(|e| io_error("failed to copy cloned repository", e))
            }

            SourceLocation::S3 { bucket, key } => {
                let auth = match self.resolver.resolve(ServiceKind::S3).await? {
                    AuthConfig::S3(auth) => auth,
                    other => return Err(unexpected_auth(&other)),
                };

                let archive = self.archives.fetch(&auth, bucket, key).await?;
                let unpacked = staging.join("archive");
                unpack_tar_gz(archive, &unpacked).await?;

                copy_tree(&unpacked, tree, &filter)
                    .await
                    .map_err(|e| io_error("failed to copy unpacked archive", e))
            }
        }
    }
}

#[async_trait]
impl SourceRetriever for WorkspaceRetriever {
    async fn retrieve(&self, source: &str, ignores: &[String], id: &RequestId) -> Result<PathBuf> {
        let location = SourceLocation::parse(source)?;
        let filter = IgnoreFilter::new(ignores)?;

        if let SourceLocation::Directory(path) = &location {
            if !tokio::fs::metadata(path).await.is_ok_and(|m| m.is_dir()) {
                return Err(Error::Retrieval(format!(
                    "Directory `{}` does not exist",
                    path.display()
                )));
            }
        }

        info!(request_id = %id, kind = location.kind(), "Retrieving source");

        // Removed on drop, including when staging fails partway.
        let staging = self.staging_dir(id)?;
        let tree = staging.path().join("tree");

        let files = self.stage(&location, filter, staging.path(), &tree).await?;

        let target = self.work_dir.join(id.as_str());
        if tokio::fs::metadata(&target).await.is_ok() {
            debug!(path = %target.display(), "Replacing stale working tree");
            tokio::fs::remove_dir_all(&target)
                .await
                .map_err(|e| io_error("failed to remove stale working tree", e))?;
        }
        tokio::fs::rename(&tree, &target)
            .await
            .map_err(|e| io_error("failed to move working tree into place", e))?;

        info!(request_id = %id, path = %target.display(), files, "Source retrieved");
        Ok(target)
    }

    async fn cleanup(&self, path: &Path) -> Result<()> {
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Working tree removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Cleanup(format!(
                "failed to remove {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

fn io_error(context: &str, err: io::Error) -> Error {
    Error::Retrieval(format!("{}: {}", context, err))
}

fn unexpected_auth(auth: &AuthConfig) -> Error {
    Error::Internal(format!(
        "resolver returned {} credentials for source retrieval",
        auth.service()
    ))
}
