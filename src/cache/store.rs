//! Cache stores
//!
//! A store persists built artifacts with their metadata. Writes are staged:
//! [`CacheStore::begin`] hands out a writer that only replaces the entry on
//! [`EntryWriter::commit`], so an aborted build never leaves partial content
//! behind.

use crate::cache::entry::EntryMetadata;
use crate::cache::key::CacheKey;
use crate::error::{ClientlibError, ClientlibResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// Reader over a stored artifact
pub type EntryReader = Box<dyn AsyncRead + Send + Unpin>;

/// Persistence for built artifacts
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Metadata of the entry at `key`, if any
    async fn get(&self, key: &CacheKey) -> ClientlibResult<Option<EntryMetadata>>;

    /// Open the content of the entry at `key`, if any
    async fn open(&self, key: &CacheKey) -> ClientlibResult<Option<EntryReader>>;

    /// Start writing a new entry at `key`
    async fn begin(&self, key: &CacheKey) -> ClientlibResult<Box<dyn EntryWriter>>;

    /// Remove the entry at `key`, returning whether one existed
    async fn delete(&self, key: &CacheKey) -> ClientlibResult<bool>;
}

/// Staged write of one cache entry
#[async_trait]
pub trait EntryWriter: Send {
    /// Append content
    async fn write_chunk(&mut self, chunk: &[u8]) -> ClientlibResult<()>;

    /// Replace the entry with the staged content and `metadata`
    async fn commit(self: Box<Self>, metadata: &EntryMetadata) -> ClientlibResult<()>;

    /// Discard the staged content
    async fn abort(self: Box<Self>);
}

/// Store keeping entries as files below a base directory
///
/// The key `/var/cache/clientlibs/app.js.gzip` lives at
/// `<base>/var/cache/clientlibs/app.js.gzip` with its metadata in
/// `app.js.gzip.meta.json` next to it.
#[derive(Debug, Clone)]
pub struct FsCacheStore {
    base: PathBuf,
}

impl FsCacheStore {
    /// Create a store below `base`
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Base directory
    pub fn base(&self) -> &Path {
        &self.base
    }

    fn data_path(&self, key: &CacheKey) -> ClientlibResult<PathBuf> {
        let relative = Path::new(key.as_str().trim_start_matches('/'));
        let valid = relative.components().next().is_some()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(ClientlibError::InvalidKey(key.to_string()));
        }
        Ok(self.base.join(relative))
    }

    fn meta_path(data: &Path) -> PathBuf {
        let mut name = data.file_name().unwrap_or_default().to_os_string();
        name.push(".meta.json");
        data.with_file_name(name)
    }
}

#[async_trait]
impl CacheStore for FsCacheStore {
    async fn get(&self, key: &CacheKey) -> ClientlibResult<Option<EntryMetadata>> {
        let data = self.data_path(key)?;
        let meta = Self::meta_path(&data);

        let content = match fs::read_to_string(&meta).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ClientlibError::io(
                    format!("reading cache metadata {}", meta.display()),
                    e,
                ))
            }
        };

        if !fs::try_exists(&data).await.unwrap_or(false) {
            debug!("Cache entry {} has metadata but no content", key);
            return Ok(None);
        }

        // Unreadable metadata makes the entry invalid, the next build replaces it
        match serde_json::from_str(&content) {
            Ok(metadata) => Ok(Some(metadata)),
            Err(e) => {
                warn!("Ignoring corrupt cache metadata {}: {}", meta.display(), e);
                Ok(None)
            }
        }
    }

    async fn open(&self, key: &CacheKey) -> ClientlibResult<Option<EntryReader>> {
        let data = self.data_path(key)?;
        match fs::File::open(&data).await {
            Ok(file) => Ok(Some(Box::new(file))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ClientlibError::io(
                format!("opening cache entry {}", data.display()),
                e,
            )),
        }
    }

    async fn begin(&self, key: &CacheKey) -> ClientlibResult<Box<dyn EntryWriter>> {
        let data = self.data_path(key)?;
        let parent = data
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| ClientlibError::InvalidKey(key.to_string()))?;

        fs::create_dir_all(&parent).await.map_err(|e| {
            ClientlibError::io(format!("creating cache folder {}", parent.display()), e)
        })?;

        let staging = parent.join(format!(
            ".{}.{}.tmp",
            data.file_name().unwrap_or_default().to_string_lossy(),
            uuid::Uuid::new_v4().simple()
        ));
        let file = fs::File::create(&staging).await.map_err(|e| {
            ClientlibError::io(format!("creating staging file {}", staging.display()), e)
        })?;

        debug!("Staging cache entry {} in {}", key, staging.display());
        Ok(Box::new(FsEntryWriter {
            file: Some(file),
            staging,
            data,
            finished: false,
        }))
    }

    async fn delete(&self, key: &CacheKey) -> ClientlibResult<bool> {
        let data = self.data_path(key)?;
        let meta = Self::meta_path(&data);

        let mut existed = false;
        for path in [&meta, &data] {
            match fs::remove_file(path).await {
                Ok(()) => existed = true,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(ClientlibError::io(
                        format!("removing cache file {}", path.display()),
                        e,
                    ))
                }
            }
        }

        if existed {
            debug!("Deleted cache entry {}", key);
        }
        Ok(existed)
    }
}

struct FsEntryWriter {
    file: Option<fs::File>,
    staging: PathBuf,
    data: PathBuf,
    finished: bool,
}

impl FsEntryWriter {
    async fn write_metadata(&self, metadata: &EntryMetadata) -> ClientlibResult<()> {
        let meta = FsCacheStore::meta_path(&self.data);
        let staged_meta = meta.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(metadata)?;

        fs::write(&staged_meta, content).await.map_err(|e| {
            ClientlibError::io(format!("writing cache metadata {}", meta.display()), e)
        })?;
        fs::rename(&staged_meta, &meta).await.map_err(|e| {
            ClientlibError::io(format!("replacing cache metadata {}", meta.display()), e)
        })
    }
}

#[async_trait]
impl EntryWriter for FsEntryWriter {
    async fn write_chunk(&mut self, chunk: &[u8]) -> ClientlibResult<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| ClientlibError::Internal("entry writer already closed".to_string()))?;
        file.write_all(chunk).await.map_err(|e| {
            ClientlibError::io(format!("writing {}", self.staging.display()), e)
        })
    }

    async fn commit(mut self: Box<Self>, metadata: &EntryMetadata) -> ClientlibResult<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()
                .await
                .map_err(|e| ClientlibError::io("flushing staged cache entry", e))?;
            file.sync_all()
                .await
                .map_err(|e| ClientlibError::io("syncing staged cache entry", e))?;
        }

        // Without metadata the entry reads as absent while content is swapped
        let meta = FsCacheStore::meta_path(&self.data);
        if let Err(e) = fs::remove_file(&meta).await {
            if e.kind() != ErrorKind::NotFound {
                return Err(ClientlibError::io(
                    format!("removing cache metadata {}", meta.display()),
                    e,
                ));
            }
        }

        fs::rename(&self.staging, &self.data).await.map_err(|e| {
            ClientlibError::io(format!("replacing cache entry {}", self.data.display()), e)
        })?;
        self.finished = true;

        self.write_metadata(metadata).await
    }

    async fn abort(mut self: Box<Self>) {
        drop(self.file.take());
        if let Err(e) = fs::remove_file(&self.staging).await {
            if e.kind() != ErrorKind::NotFound {
                warn!(
                    "Failed to remove staging file {}: {}",
                    self.staging.display(),
                    e
                );
            }
        }
        self.finished = true;
    }
}

impl Drop for FsEntryWriter {
    fn drop(&mut self) {
        // Writer dropped mid-build, e.g. when the request was cancelled
        if self.finished {
            return;
        }
        drop(self.file.take());

        let staging = std::mem::take(&mut self.staging);
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = fs::remove_file(&staging).await {
                        if e.kind() != ErrorKind::NotFound {
                            warn!("Failed to remove staging file {}: {}", staging.display(), e);
                        }
                    }
                });
            }
            Err(_) => {
                let _ = std::fs::remove_file(&staging);
            }
        }
    }
}

#[derive(Debug, Clone)]
struct StoredEntry {
    metadata: EntryMetadata,
    content: Vec<u8>,
}

type Entries = Arc<RwLock<HashMap<CacheKey, StoredEntry>>>;

/// Store keeping entries in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStore {
    entries: Entries,
}

impl MemoryCacheStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        read_entries(&self.entries).len()
    }

    /// True when nothing is stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn read_entries(
    entries: &Entries,
) -> std::sync::RwLockReadGuard<'_, HashMap<CacheKey, StoredEntry>> {
    entries.read().unwrap_or_else(|e| e.into_inner())
}

fn write_entries(
    entries: &Entries,
) -> std::sync::RwLockWriteGuard<'_, HashMap<CacheKey, StoredEntry>> {
    entries.write().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &CacheKey) -> ClientlibResult<Option<EntryMetadata>> {
        Ok(read_entries(&self.entries)
            .get(key)
            .map(|entry| entry.metadata.clone()))
    }

    async fn open(&self, key: &CacheKey) -> ClientlibResult<Option<EntryReader>> {
        let content = read_entries(&self.entries)
            .get(key)
            .map(|entry| entry.content.clone());
        Ok(content.map(|c| Box::new(std::io::Cursor::new(c)) as EntryReader))
    }

    async fn begin(&self, key: &CacheKey) -> ClientlibResult<Box<dyn EntryWriter>> {
        Ok(Box::new(MemoryEntryWriter {
            entries: Arc::clone(&self.entries),
            key: key.clone(),
            content: Vec::new(),
        }))
    }

    async fn delete(&self, key: &CacheKey) -> ClientlibResult<bool> {
        Ok(write_entries(&self.entries).remove(key).is_some())
    }
}

struct MemoryEntryWriter {
    entries: Entries,
    key: CacheKey,
    content: Vec<u8>,
}

#[async_trait]
impl EntryWriter for MemoryEntryWriter {
    async fn write_chunk(&mut self, chunk: &[u8]) -> ClientlibResult<()> {
        self.content.extend_from_slice(chunk);
        Ok(())
    }

    async fn commit(self: Box<Self>, metadata: &EntryMetadata) -> ClientlibResult<()> {
        let MemoryEntryWriter {
            entries,
            key,
            content,
        } = *self;
        write_entries(&entries).insert(
            key,
            StoredEntry {
                metadata: metadata.clone(),
                content,
            },
        );
        Ok(())
    }

    async fn abort(self: Box<Self>) {}
}
