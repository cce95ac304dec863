//! Atomic persistence of the memory document.
//!
//! Writes go to a temp file in the target directory, are fsynced, and then
//! renamed over the old document, so a crash mid-write leaves the previous
//! version intact. Writers are serialized by an in-process mutex and an
//! advisory lock on `<path>.lock` for other processes.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs4::FileExt;
use tempfile::NamedTempFile;

use crate::error::MemoryError;
use crate::memory::document::SynthesizedMemory;

/// Reads and writes the persisted memory document.
#[derive(Debug)]
pub struct MemoryStorage {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl MemoryStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a document has been written.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Load the document. A missing file is an empty memory.
    pub fn read(&self) -> Result<SynthesizedMemory, MemoryError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(SynthesizedMemory::from_markdown(&text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(SynthesizedMemory::default()),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => Err(MemoryError::Serialization {
                path: self.path.clone(),
                reason: e.to_string(),
            }),
            Err(source) => Err(MemoryError::Persistence {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Atomically replace the document.
    pub fn write(&self, memory: &SynthesizedMemory) -> Result<(), MemoryError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.write_locked(&memory.to_markdown())
            .map_err(|source| MemoryError::Persistence {
                path: self.path.clone(),
                source,
            })?;
        tracing::debug!(
            "Wrote memory document {} ({} words)",
            self.path.display(),
            memory.word_count()
        );
        Ok(())
    }

    fn write_locked(&self, contents: &str) -> io::Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        // Released when the file is closed.
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(lock_path(&self.path))?;
        lock_file.lock_exclusive()?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        sync_dir(&dir);
        drop(lock_file);
        Ok(())
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// Make the rename durable. Best effort; not all platforms allow opening a
/// directory.
fn sync_dir(dir: &Path) {
    if let Ok(handle) = File::open(dir)
        && let Err(e) = handle.sync_all()
    {
        tracing::debug!("Directory fsync failed for {}: {}", dir.display(), e);
    }
}
