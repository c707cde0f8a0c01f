//! Gzip tarball sources in object storage.

use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use bytes::Bytes;
use flate2::read::GzDecoder;
use hoist_core::{AwsAuth, Error, Result};
use hoist_credentials::aws::sdk_config;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Downloads single archive objects.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    async fn fetch(&self, auth: &AwsAuth, bucket: &str, key: &str) -> Result<Bytes>;
}

/// [`ArchiveStore`] over Amazon S3. A client is built per fetch since the
/// session depends on the resolved credentials.
#[derive(Debug, Clone, Default)]
pub struct S3ArchiveStore;

#[async_trait]
impl ArchiveStore for S3ArchiveStore {
    async fn fetch(&self, auth: &AwsAuth, bucket: &str, key: &str) -> Result<Bytes> {
        let config = sdk_config(auth).await;
        let client = aws_sdk_s3::Client::new(&config);

        info!(bucket, key, "Downloading source archive");

        let output = client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                Error::Retrieval(format!(
                    "failed to download s3://{}/{}: {}",
                    bucket,
                    key,
                    DisplayErrorContext(e)
                ))
            })?;

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| Error::Retrieval(format!("failed to read s3://{}/{}: {}", bucket, key, e)))?
            .into_bytes();

        debug!(bucket, key, size = bytes.len(), "Archive downloaded");
        Ok(bytes)
    }
}

/// Unpack a gzip tarball into `dest`.
pub async fn unpack_tar_gz(archive: Bytes, dest: &Path) -> Result<()> {
    let dest: PathBuf = dest.to_path_buf();
    tokio::task::spawn_blocking(move || {
        std::fs::create_dir_all(&dest)?;
        let mut tar = tar::Archive::new(GzDecoder::new(Cursor::new(archive)));
        tar.set_preserve_permissions(true);
        tar.unpack(&dest)
    })
    .await
    .map_err(|e| Error::Internal(format!("unpack task failed: {}", e)))?
    .map_err(|e| Error::Retrieval(format!("failed to unpack source archive: {}", e)))
}
