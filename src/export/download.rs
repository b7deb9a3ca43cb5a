// src/export/download.rs
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::error::{ClientError, ClientResult};

/// Where finished artifacts are delivered.
pub trait DownloadSink: Send + Sync {
    fn deliver(&self, file_name: &str, bytes: &[u8]) -> ClientResult<PathBuf>;
}

/// Writes artifacts into a directory. Nothing appears under the final name
/// unless the whole payload was written.
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DownloadSink for DirectorySink {
    fn deliver(&self, file_name: &str, bytes: &[u8]) -> ClientResult<PathBuf> {
        let name = Path::new(file_name)
            .file_name()
            .ok_or_else(|| ClientError::Export(format!("invalid file name: {}", file_name)))?;

        fs::create_dir_all(&self.dir)?;
        let staged = StagedDownload::stage(&self.dir, bytes)?;
        staged.commit(&self.dir.join(name))
    }
}

/// Transient handle for a payload on its way to the user. The staged file
/// is released when the handle drops, on every path.
pub struct StagedDownload {
    id: Uuid,
    file: Option<NamedTempFile>,
}

impl StagedDownload {
    pub fn stage(dir: &Path, bytes: &[u8]) -> ClientResult<Self> {
        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(bytes)?;
        file.flush()?;

        let id = Uuid::new_v4();
        log::debug!("Staged download {} ({} bytes)", id, bytes.len());
        Ok(Self { id, file: Some(file) })
    }

    pub fn path(&self) -> Option<&Path> {
        self.file.as_ref().map(|f| f.path())
    }

    pub fn commit(mut self, destination: &Path) -> ClientResult<PathBuf> {
        let file = self
            .file
            .take()
            .ok_or_else(|| ClientError::Export("download already released".into()))?;
        file.persist(destination).map_err(|e| ClientError::Io(e.error))?;
        Ok(destination.to_path_buf())
    }
}

impl Drop for StagedDownload {
    fn drop(&mut self) {
        match self.file.take() {
            Some(file) => {
                log::debug!("Releasing undelivered download {}", self.id);
                drop(file);
            }
            None => log::debug!("Released download {}", self.id),
        }
    }
}
