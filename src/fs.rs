// Filesystem access used by documents and projects
use crate::error::{Result, SubmythError};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tempfile::NamedTempFile;
use tracing::debug;

pub trait FileSystem: Send + Sync {
    /// Checked on every call, never cached.
    fn exists(&self, path: &Path) -> bool;
    fn read_to_string(&self, path: &Path) -> Result<String>;
    fn write(&self, path: &Path, contents: &str) -> Result<()>;
}

/// The real filesystem. Writes go through a temp file in the target directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

impl FileSystem for LocalFs {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        match fs::read_to_string(path) {
            Ok(contents) => Ok(contents),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(SubmythError::FileNotFound(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, path: &Path, contents: &str) -> Result<()> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        debug!("Wrote {} bytes to {}", contents.len(), path.display());
        Ok(())
    }
}

/// In-memory filesystem for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryFs {
    files: Mutex<HashMap<PathBuf, String>>,
    fail_writes: AtomicBool,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        self.insert(path, contents);
        self
    }

    pub fn insert(&self, path: impl Into<PathBuf>, contents: impl Into<String>) {
        self.lock().insert(path.into(), contents.into());
    }

    pub fn remove(&self, path: &Path) -> Option<String> {
        self.lock().remove(path)
    }

    pub fn contents(&self, path: &Path) -> Option<String> {
        self.lock().get(path).cloned()
    }

    /// Make every following write fail with a permission error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, String>> {
        self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl FileSystem for MemoryFs {
    fn exists(&self, path: &Path) -> bool {
        self.lock().contains_key(path)
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        self.contents(path)
            .ok_or_else(|| SubmythError::FileNotFound(path.display().to_string()))
    }

    fn write(&self, path: &Path, contents: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("write to {} refused", path.display()),
            )
            .into());
        }
        self.insert(path, contents);
        Ok(())
    }
}
