//! Screenshot image storage
//!
//! Screenshots never travel inside a `PageResult`; the renderer stores the
//! PNG bytes here and the result carries the returned [`ImageHandle`].

use crate::storage::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Opaque name of a stored screenshot
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageHandle(String);

impl ImageHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Backend for screenshot bytes
pub trait ImageStore: Send + Sync {
    /// Stores PNG bytes and returns their handle
    fn put(&self, png: &[u8]) -> StorageResult<ImageHandle>;

    /// Loads the bytes behind a handle
    fn get(&self, handle: &ImageHandle) -> StorageResult<Vec<u8>>;

    /// Releases an image nothing refers to any more
    ///
    /// Durable stores keep their files; the default does nothing.
    fn release(&self, _handle: &ImageHandle) -> StorageResult<()> {
        Ok(())
    }
}

/// Opens the store for a configured screenshot directory
///
/// Without a directory, images are kept in memory for the life of the
/// process and released when their job is deleted.
pub fn open_image_store(directory: Option<&str>) -> StorageResult<Arc<dyn ImageStore>> {
    match directory {
        Some(dir) => Ok(Arc::new(FsImageStore::new(dir)?)),
        None => Ok(Arc::new(MemoryImageStore::new())),
    }
}

/// Content address used by both stores: SHA-256 hex plus `.png`
fn content_name(png: &[u8]) -> String {
    let digest = Sha256::digest(png);
    format!("{}.png", hex::encode(digest))
}

/// Content-addressed PNG files under a directory
///
/// Storing identical bytes twice yields the same handle and one file.
#[derive(Debug)]
pub struct FsImageStore {
    root: PathBuf,
}

impl FsImageStore {
    /// Opens the store, creating the directory if needed
    pub fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, handle: &ImageHandle) -> StorageResult<PathBuf> {
        let name = handle.as_str();
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(StorageError::ImageNotFound(name.to_string()));
        }
        Ok(self.root.join(name))
    }
}

impl ImageStore for FsImageStore {
    fn put(&self, png: &[u8]) -> StorageResult<ImageHandle> {
        let handle = ImageHandle::new(content_name(png));
        let path = self.path_for(&handle)?;
        if !path.exists() {
            std::fs::write(&path, png)?;
        }
        Ok(handle)
    }

    fn get(&self, handle: &ImageHandle) -> StorageResult<Vec<u8>> {
        let path = self.path_for(handle)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::ImageNotFound(handle.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process store, used when no screenshot directory is configured
#[derive(Debug, Default)]
pub struct MemoryImageStore {
    images: Mutex<HashMap<ImageHandle, Vec<u8>>>,
}

impl MemoryImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.images.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ImageStore for MemoryImageStore {
    fn put(&self, png: &[u8]) -> StorageResult<ImageHandle> {
        let handle = ImageHandle::new(content_name(png));
        let mut images = self
            .images
            .lock()
            .map_err(|_| StorageError::Database("image store lock poisoned".to_string()))?;
        images.entry(handle.clone()).or_insert_with(|| png.to_vec());
        Ok(handle)
    }

    fn get(&self, handle: &ImageHandle) -> StorageResult<Vec<u8>> {
        let images = self
            .images
            .lock()
            .map_err(|_| StorageError::Database("image store lock poisoned".to_string()))?;
        images
            .get(handle)
            .cloned()
            .ok_or_else(|| StorageError::ImageNotFound(handle.to_string()))
    }

    fn release(&self, handle: &ImageHandle) -> StorageResult<()> {
        let mut images = self
            .images
            .lock()
            .map_err(|_| StorageError::Database("image store lock poisoned".to_string()))?;
        images.remove(handle);
        Ok(())
    }
}
