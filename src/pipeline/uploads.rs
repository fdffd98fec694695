//! Uploaded originals kept on disk for the lifetime of their analysis.
//!
//! Every request writes its own file, so concurrent uploads of the same
//! bytes never share a path and one request's cleanup cannot remove a file
//! another request's record points at.

use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Where upload `upload_id` of the content with this hash is stored.
pub fn upload_path(dir: &Path, content_hash: &str, upload_id: Uuid, extension: &str) -> PathBuf {
    dir.join(format!("{content_hash}_{}.{extension}", upload_id.simple()))
}

/// Write the upload under a fresh per-request name, creating the
/// directory if needed.
pub async fn store_upload(
    dir: &Path,
    content_hash: &str,
    extension: &str,
    bytes: &[u8],
) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = upload_path(dir, content_hash, Uuid::new_v4(), extension);
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}

/// Delete a stored upload. A file that is already gone is not an error.
pub async fn remove_upload(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
