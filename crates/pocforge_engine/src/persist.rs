use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("output directory {path} missing or not writable: {message}")]
    OutputDir { path: PathBuf, message: String },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

fn output_dir_error(dir: &Path, message: impl ToString) -> PersistError {
    PersistError::OutputDir {
        path: dir.to_path_buf(),
        message: message.to_string(),
    }
}

/// Ensure output directory exists; create if missing.
pub fn ensure_output_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| output_dir_error(dir, e))?;
        if !meta.is_dir() {
            return Err(output_dir_error(dir, "path is not a directory"));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| output_dir_error(dir, e))?;
    }
    NamedTempFile::new_in(dir).map_err(|e| output_dir_error(dir, e))?;
    Ok(())
}

/// Replaces `path` wholesale: temp file in the same directory, fsync, rename.
pub fn write_atomic(path: &Path, content: &str) -> Result<(), PersistError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    ensure_output_dir(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.flush()?;
    tmp.as_file_mut().sync_all()?;
    tmp.persist(path).map_err(|e| PersistError::Io(e.error))?;
    Ok(())
}

/// Writes named files into one directory, each atomically.
#[derive(Debug, Clone)]
pub struct AtomicFileWriter {
    dir: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write(&self, filename: &str, content: &str) -> Result<PathBuf, PersistError> {
        let target = self.dir.join(filename);
        write_atomic(&target, content)?;
        Ok(target)
    }
}
