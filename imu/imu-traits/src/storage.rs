//! Blob persistence used by sensors to keep their configuration.
//!
//! Paths are slash-separated and namespace-relative, e.g.
//! `settings/sen/MPU6050IMU.json`. A leading `/` is ignored.

use log::debug;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no blob stored at {0}")]
    NotFound(String),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("store is read-only, cannot write {0}")]
    ReadOnly(String),
}

/// Key-value blob store keyed by path.
pub trait ConfigStore {
    fn exists(&self, path: &str) -> bool;

    fn read_blob(&self, path: &str) -> Result<String, StoreError>;

    fn write_blob(&mut self, path: &str, blob: &str) -> Result<(), StoreError>;
}

fn normalize(path: &str) -> &str {
    path.trim_start_matches('/')
}

/// Stores blobs as files below a root directory, creating parents on write.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(normalize(path))
    }
}

impl ConfigStore for FileStore {
    fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_file()
    }

    fn read_blob(&self, path: &str) -> Result<String, StoreError> {
        let file = self.resolve(path);
        fs::read_to_string(&file).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(path.to_string()),
            _ => StoreError::Io {
                path: path.to_string(),
                source: e,
            },
        })
    }

    fn write_blob(&mut self, path: &str, blob: &str) -> Result<(), StoreError> {
        let file = self.resolve(path);
        let io_err = |source| StoreError::Io {
            path: path.to_string(),
            source,
        };
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(&file, blob).map_err(io_err)?;
        debug!("Wrote {} bytes to {}", blob.len(), file.display());
        Ok(())
    }
}

/// In-memory store. Counts writes and can be switched read-only, which makes
/// it handy for exercising persistence failures.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    blobs: HashMap<String, String>,
    writes: usize,
    read_only: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(mut self, path: &str, blob: &str) -> Self {
        self.blobs
            .insert(normalize(path).to_string(), blob.to_string());
        self
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    /// Number of successful writes so far.
    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.blobs.get(normalize(path)).map(String::as_str)
    }
}

impl ConfigStore for MemoryStore {
    fn exists(&self, path: &str) -> bool {
        self.blobs.contains_key(normalize(path))
    }

    fn read_blob(&self, path: &str) -> Result<String, StoreError> {
        self.get(path)
            .map(str::to_string)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    fn write_blob(&mut self, path: &str, blob: &str) -> Result<(), StoreError> {
        if self.read_only {
            return Err(StoreError::ReadOnly(path.to_string()));
        }
        self.blobs
            .insert(normalize(path).to_string(), blob.to_string());
        self.writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_ignores_leading_slash() {
        let mut store = MemoryStore::new();
        store.write_blob("/settings/sen/a.json", "{}").unwrap();
        assert!(store.exists("settings/sen/a.json"));
        assert_eq!(store.read_blob("settings/sen/a.json").unwrap(), "{}");
        assert_eq!(store.writes(), 1);
    }

    #[test]
    fn memory_store_missing_blob_is_not_found() {
        let store = MemoryStore::new();
        assert!(!store.exists("settings/sen/a.json"));
        assert!(matches!(
            store.read_blob("settings/sen/a.json"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn read_only_memory_store_rejects_writes() {
        let mut store = MemoryStore::new();
        store.set_read_only(true);
        assert!(matches!(
            store.write_blob("a.json", "{}"),
            Err(StoreError::ReadOnly(_))
        ));
        assert_eq!(store.writes(), 0);
        assert!(!store.exists("a.json"));
    }

    #[test]
    fn file_store_creates_namespace_directories() {
        let root = std::env::temp_dir().join(format!("imu-traits-store-{}", std::process::id()));
        let mut store = FileStore::new(&root);
        let path = "/settings/sen/test.json";

        assert!(!store.exists(path));
        assert!(matches!(store.read_blob(path), Err(StoreError::NotFound(_))));

        store.write_blob(path, "{\"a\":1}").unwrap();
        assert!(store.exists(path));
        assert_eq!(store.read_blob(path).unwrap(), "{\"a\":1}");
        assert!(root.join("settings/sen/test.json").is_file());

        let _ = fs::remove_dir_all(&root);
    }
}
