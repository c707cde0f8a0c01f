//! Filtered recursive tree copy.

use async_recursion::async_recursion;
use std::io;
use std::path::Path;
use tracing::debug;

use crate::filter::IgnoreFilter;

/// Copy `src` into `dest`, skipping ignored entries and everything below an
/// ignored directory. Returns the number of files copied.
pub async fn copy_tree(src: &Path, dest: &Path, filter: &IgnoreFilter) -> io::Result<u64> {
    tokio::fs::create_dir_all(dest).await?;
    copy_dir(src, src, dest, filter).await
}

#[async_recursion]
async fn copy_dir(
    root: &Path,
    current: &Path,
    dest_root: &Path,
    filter: &IgnoreFilter,
) -> io::Result<u64> {
    let mut copied = 0;
    let mut entries = tokio::fs::read_dir(current).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(&path);

        if filter.is_ignored(relative) {
            debug!(path = %relative.display(), "Ignored");
            continue;
        }

        let target = dest_root.join(relative);
        let file_type = entry.file_type().await?;

        if file_type.is_dir() {
            tokio::fs::create_dir_all(&target).await?;
            copied += copy_dir(root, &path, dest_root, filter).await?;
        } else if file_type.is_file() {
            tokio::fs::copy(&path, &target).await?;
            copied += 1;
        } else if file_type.is_symlink() {
            copy_symlink(&path, &target).await?;
            copied += 1;
        } else {
            debug!(path = %relative.display(), "Skipping special file");
        }
    }

    Ok(copied)
}

#[cfg(unix)]
async fn copy_symlink(path: &Path, target: &Path) -> io::Result<()> {
    let link = tokio::fs::read_link(path).await?;
    tokio::fs::symlink(link, target).await
}

#[cfg(not(unix))]
async fn copy_symlink(path: &Path, _target: &Path) -> io::Result<()> {
    debug!(path = %path.display(), "Skipping symlink");
    Ok(())
}
