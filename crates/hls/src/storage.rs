use std::fs;
use std::io::Write;
use std::path::PathBuf;

use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::playlist::Segment;

/// Errors surfaced by a storage backend.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Backend(String),
}

/// The storage collaborator contract.
///
/// Each call is synchronous; the returned URI is used verbatim in
/// manifests. Segment, part and init URIs are resolved relative to the
/// variant's media playlist; playlist URIs relative to the master
/// playlist.
pub trait Storage {
    /// Persist the multivariant playlist.
    fn store_master_playlist(&mut self, data: &[u8]) -> Result<(), StorageError>;

    /// Persist a variant's media playlist; returns its URI.
    fn store_playlist(&mut self, variant: &str, data: &[u8]) -> Result<String, StorageError>;

    /// Persist an init header; returns its URI.
    fn store_init_header(
        &mut self,
        variant: &str,
        name: &str,
        data: &[u8],
    ) -> Result<String, StorageError>;

    /// Persist a media segment; returns its URI.
    fn store_segment(
        &mut self,
        variant: &str,
        name: &str,
        data: &[u8],
    ) -> Result<String, StorageError>;

    /// Persist a partial segment; returns its URI.
    fn store_part(&mut self, variant: &str, name: &str, data: &[u8])
        -> Result<String, StorageError>;

    /// Delete an evicted segment's payload.
    fn delete_segment(&mut self, variant: &str, segment: &Segment) -> Result<(), StorageError>;
}

/// Filesystem storage under a root directory.
///
/// Layout: `master.m3u8` at the root, one subdirectory per variant holding
/// `media.m3u8`, init headers, segments and parts.
pub struct DirStorage {
    root: PathBuf,
}

impl DirStorage {
    /// Create the backing directory tree lazily per variant.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn write_file(&self, relative: &str, data: &[u8]) -> Result<(), StorageError> {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(&path)?;
        file.write_all(data)?;
        debug!(path = %path.display(), bytes = data.len(), "stored");
        Ok(())
    }
}

impl Storage for DirStorage {
    fn store_master_playlist(&mut self, data: &[u8]) -> Result<(), StorageError> {
        self.write_file("master.m3u8", data)
    }

    fn store_playlist(&mut self, variant: &str, data: &[u8]) -> Result<String, StorageError> {
        self.write_file(&format!("{variant}/media.m3u8"), data)?;
        Ok(format!("{variant}/media.m3u8"))
    }

    fn store_init_header(
        &mut self,
        variant: &str,
        name: &str,
        data: &[u8],
    ) -> Result<String, StorageError> {
        self.write_file(&format!("{variant}/{name}"), data)?;
        Ok(name.to_string())
    }

    fn store_segment(
        &mut self,
        variant: &str,
        name: &str,
        data: &[u8],
    ) -> Result<String, StorageError> {
        self.write_file(&format!("{variant}/{name}"), data)?;
        Ok(name.to_string())
    }

    fn store_part(
        &mut self,
        variant: &str,
        name: &str,
        data: &[u8],
    ) -> Result<String, StorageError> {
        self.write_file(&format!("{variant}/{name}"), data)?;
        Ok(name.to_string())
    }

    fn delete_segment(&mut self, variant: &str, segment: &Segment) -> Result<(), StorageError> {
        let path = self.root.join(variant).join(&segment.uri);
        if let Err(error) = fs::remove_file(&path) {
            // A missing file is not fatal; the window only shrinks.
            warn!(path = %path.display(), %error, "failed to delete evicted segment");
        }
        Ok(())
    }
}

/// In-memory storage for tests: keeps every object and an operation log.
#[derive(Default)]
pub struct MemoryStorage {
    /// Objects keyed by `{variant}/{name}` (master playlist under
    /// `master.m3u8`).
    pub objects: FxHashMap<String, Vec<u8>>,
    /// Chronological operation log, e.g. `store_segment v0/segment_0.m4s`.
    pub log: Vec<String>,
    /// Segment URIs deleted per variant.
    pub deleted: Vec<String>,
}

impl MemoryStorage {
    /// Fresh empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch an object as UTF-8 (playlists).
    pub fn text(&self, key: &str) -> Option<String> {
        self.objects.get(key).map(|data| String::from_utf8_lossy(data).into_owned())
    }

    /// Count of log entries starting with `prefix`.
    pub fn count_ops(&self, prefix: &str) -> usize {
        self.log.iter().filter(|op| op.starts_with(prefix)).count()
    }
}

impl Storage for MemoryStorage {
    fn store_master_playlist(&mut self, data: &[u8]) -> Result<(), StorageError> {
        self.objects.insert("master.m3u8".to_string(), data.to_vec());
        self.log.push("store_master_playlist".to_string());
        Ok(())
    }

    fn store_playlist(&mut self, variant: &str, data: &[u8]) -> Result<String, StorageError> {
        let key = format!("{variant}/media.m3u8");
        self.objects.insert(key.clone(), data.to_vec());
        self.log.push(format!("store_playlist {key}"));
        Ok(key)
    }

    fn store_init_header(
        &mut self,
        variant: &str,
        name: &str,
        data: &[u8],
    ) -> Result<String, StorageError> {
        self.objects.insert(format!("{variant}/{name}"), data.to_vec());
        self.log.push(format!("store_init_header {variant}/{name}"));
        Ok(name.to_string())
    }

    fn store_segment(
        &mut self,
        variant: &str,
        name: &str,
        data: &[u8],
    ) -> Result<String, StorageError> {
        self.objects.insert(format!("{variant}/{name}"), data.to_vec());
        self.log.push(format!("store_segment {variant}/{name}"));
        Ok(name.to_string())
    }

    fn store_part(
        &mut self,
        variant: &str,
        name: &str,
        data: &[u8],
    ) -> Result<String, StorageError> {
        self.objects.insert(format!("{variant}/{name}"), data.to_vec());
        self.log.push(format!("store_part {variant}/{name}"));
        Ok(name.to_string())
    }

    fn delete_segment(&mut self, variant: &str, segment: &Segment) -> Result<(), StorageError> {
        let key = format!("{variant}/{}", segment.uri);
        self.objects.remove(&key);
        self.deleted.push(key.clone());
        self.log.push(format!("delete_segment {key}"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(uri: &str) -> Segment {
        Segment {
            index: 0,
            uri: uri.to_string(),
            size: 3,
            duration: 2.0,
            wallclock_ms: None,
            media_init: None,
            discontinuity: false,
            parts: Vec::new(),
        }
    }

    #[test]
    fn dir_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = DirStorage::new(dir.path()).unwrap();

        let uri = storage.store_segment("v0", "segment_0.m4s", &[1, 2, 3]).unwrap();
        assert_eq!(uri, "segment_0.m4s");
        assert_eq!(fs::read(dir.path().join("v0/segment_0.m4s")).unwrap(), vec![1, 2, 3]);

        storage.store_master_playlist(b"#EXTM3U\n").unwrap();
        assert!(dir.path().join("master.m3u8").exists());

        storage.delete_segment("v0", &segment("segment_0.m4s")).unwrap();
        assert!(!dir.path().join("v0/segment_0.m4s").exists());
    }

    #[test]
    fn memory_storage_logs_operations() {
        let mut storage = MemoryStorage::new();
        storage.store_segment("v0", "segment_0.m4s", &[0; 4]).unwrap();
        storage.store_playlist("v0", b"#EXTM3U\n").unwrap();
        storage.delete_segment("v0", &segment("segment_0.m4s")).unwrap();

        assert_eq!(storage.count_ops("store_segment"), 1);
        assert_eq!(storage.count_ops("delete_segment"), 1);
        assert!(storage.objects.get("v0/segment_0.m4s").is_none());
        assert_eq!(storage.text("v0/media.m3u8").unwrap(), "#EXTM3U\n");
    }
}
