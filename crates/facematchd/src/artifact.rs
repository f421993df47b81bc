//! Scoped temporary files for captured images.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

#[derive(Error, Debug)]
#[error("failed to write temporary image {}: {source}", .path.display())]
pub struct ArtifactError {
    path: PathBuf,
    #[source]
    source: io::Error,
}

/// A captured image on disk for the duration of one request.
///
/// The file is removed when the guard is released or dropped, whichever
/// comes first.
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
    released: bool,
}

impl TempArtifact {
    /// Write `bytes` to a new `captured_<uuid>.jpg` inside `dir`.
    pub async fn materialize(dir: &Path, bytes: &[u8]) -> Result<Self, ArtifactError> {
        let path = dir.join(format!("captured_{}.jpg", Uuid::new_v4()));

        if let Err(source) = write_new(&path, bytes).await {
            release(&path);
            return Err(ArtifactError { path, source });
        }

        tracing::debug!(path = %path.display(), bytes = bytes.len(), "captured image written");
        Ok(Self { path, released: false })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file now, without blocking the runtime.
    pub async fn release(mut self) {
        self.released = true;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => tracing::debug!(path = %self.path.display(), "temporary image removed"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "failed to remove temporary image")
            }
        }
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            release(&self.path);
        }
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        self.release_once();
    }
}

async fn write_new(path: &Path, bytes: &[u8]) -> io::Result<()> {
    // create_new: never clobber another request's file
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(bytes).await?;
    file.flush().await
}

/// Remove `path` if it exists. A file that is already gone is not an error.
///
/// Blocking; used from `Drop` and failed writes.
pub fn release(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "temporary image removed"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => tracing::warn!(path = %path.display(), error = %err, "failed to remove temporary image"),
    }
}
