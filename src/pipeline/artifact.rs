//! Transient artifacts: upload validation, materialization, and release.
//!
//! pdfium needs a file-system path, so uploaded bytes are written to a
//! uniquely named temp file for the duration of one request. The
//! [`TransientArtifact`] handle owns that file: [`TransientArtifact::release`]
//! deletes it, is idempotent, and never fails, and `Drop` calls it too so a
//! panicking or cancelled request still cleans up after itself.

use crate::error::ReaderError;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, warn};

const ARTIFACT_PREFIX: &str = "docreader-";

/// Validates uploads and owns the creation of transient artifacts.
#[derive(Debug, Clone)]
pub struct FileLifecycle {
    supported_extensions: Vec<String>,
    temp_dir: Option<PathBuf>,
}

impl FileLifecycle {
    /// `supported_extensions` must be lowercase with a leading dot.
    pub fn new(supported_extensions: Vec<String>, temp_dir: Option<PathBuf>) -> Self {
        Self {
            supported_extensions,
            temp_dir,
        }
    }

    /// True when `filename` ends in one of the supported extensions,
    /// compared case-insensitively.
    pub fn validate(&self, filename: &str) -> bool {
        let lower = filename.trim().to_lowercase();
        self.supported_extensions
            .iter()
            .any(|ext| lower.len() > ext.len() && lower.ends_with(ext.as_str()))
    }

    /// Write `bytes` to a fresh, uniquely named file.
    ///
    /// The suffix is the first supported extension so engines that sniff
    /// by name see the right type.
    pub async fn materialize(&self, bytes: Vec<u8>) -> Result<TransientArtifact, ReaderError> {
        let dir = self.temp_dir.clone();
        let suffix = self
            .supported_extensions
            .first()
            .cloned()
            .unwrap_or_default();

        tokio::task::spawn_blocking(move || materialize_blocking(dir.as_deref(), &suffix, &bytes))
            .await
            .map_err(|e| ReaderError::Storage {
                source: std::io::Error::other(format!("materialize task panicked: {e}")),
            })?
    }

    /// Best-effort deletion of the artifact. Never fails.
    pub fn release(&self, artifact: &mut TransientArtifact) {
        artifact.release();
    }
}

fn materialize_blocking(
    dir: Option<&Path>,
    suffix: &str,
    bytes: &[u8],
) -> Result<TransientArtifact, ReaderError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(ARTIFACT_PREFIX).suffix(suffix);

    let mut file = match dir {
        Some(d) => builder.tempfile_in(d),
        None => builder.tempfile(),
    }
    .map_err(|source| ReaderError::Storage { source })?;

    file.write_all(bytes)
        .and_then(|_| file.flush())
        .map_err(|source| ReaderError::Storage { source })?;

    // Closing the handle keeps the file on disk; deletion is tied to TempPath.
    let temp_path = file.into_temp_path();
    let path = temp_path.to_path_buf();
    debug!("Materialized {} bytes → {}", bytes.len(), path.display());

    Ok(TransientArtifact {
        path,
        temp: Some(temp_path),
    })
}

/// A request-scoped file holding the uploaded document.
#[derive(Debug)]
pub struct TransientArtifact {
    path: PathBuf,
    temp: Option<TempPath>,
}

impl TransientArtifact {
    /// Location of the backing file. Stays valid until release.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True once the backing file has been released.
    pub fn is_released(&self) -> bool {
        self.temp.is_none()
    }

    /// Delete the backing file.
    ///
    /// Calling this more than once is a no-op. A file that is already gone
    /// is not an error; any other failure is logged and swallowed.
    pub fn release(&mut self) {
        let Some(temp) = self.temp.take() else {
            return;
        };
        match temp.close() {
            Ok(()) => debug!("Released artifact {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Artifact {} already gone", self.path.display());
            }
            Err(e) => warn!("Failed to release artifact {}: {}", self.path.display(), e),
        }
    }
}

impl Drop for TransientArtifact {
    fn drop(&mut self) {
        self.release();
    }
}
