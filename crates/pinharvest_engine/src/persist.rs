use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use pinharvest_core::GroupKey;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::dirname::{dated_root_name, fallback_dir_name, image_file_name, is_legal_segment};

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("output directory missing or not writable: {0}")]
    OutputDir(String),
    #[error("image numbers start at 1")]
    InvalidNumber,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Ensure output directory exists; create if missing.
pub fn ensure_output_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::OutputDir("path is not a directory".into()));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    }
    // Basic writability probe: try creating a temp file.
    NamedTempFile::new_in(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    Ok(())
}

/// Writes a group's images as `<output>/<dated root>/<group>/img<N>.jpg`.
///
/// Groups whose key cannot be a directory name all share one fallback
/// directory named after the run's start time. Existing files with the same
/// number are overwritten; writes are plain, not atomic.
#[derive(Debug, Clone)]
pub struct ImageWriter {
    run_root: PathBuf,
    fallback: String,
}

impl ImageWriter {
    pub fn new(output_root: &Path, started_at: NaiveDateTime) -> Self {
        Self {
            run_root: output_root.join(dated_root_name(started_at.date())),
            fallback: fallback_dir_name(started_at.time()),
        }
    }

    pub fn run_root(&self) -> &Path {
        &self.run_root
    }

    pub fn fallback_dir(&self) -> PathBuf {
        self.run_root.join(&self.fallback)
    }

    /// Resolves and creates the directory for `group`.
    pub fn group_dir(&self, group: &GroupKey) -> Result<PathBuf, PersistError> {
        if is_legal_segment(group.as_str()) {
            let dir = self.run_root.join(group.as_str());
            if fs::create_dir_all(&dir).is_ok() {
                return Ok(dir);
            }
        }
        let dir = self.fallback_dir();
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Writes the `number`th image (1-based) of `group`.
    pub fn write_image(
        &self,
        group: &GroupKey,
        number: usize,
        bytes: &[u8],
    ) -> Result<PathBuf, PersistError> {
        if number == 0 {
            return Err(PersistError::InvalidNumber);
        }
        let target = self.group_dir(group)?.join(image_file_name(number));
        fs::write(&target, bytes)?;
        Ok(target)
    }
}
