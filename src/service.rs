//! Clientlib service
//!
//! Builds clientlibs into the cache on demand and serves them from there.
//! A build for a cache key only runs while holding that key's build lock, and
//! the cache entry is checked again once the lock is held, so callers that
//! queued behind a build find the fresh entry and return it.

use crate::asset::{
    Asset, AssetKind, ContentProcessor, CssProcessor, JavascriptProcessor, LinkRenderer,
};
use crate::cache::entry::{is_valid, EntryMetadata};
use crate::cache::key::{resolve_cache_key, CacheKey};
use crate::cache::lock::BuildLockTable;
use crate::cache::store::CacheStore;
use crate::config::Config;
use crate::error::{ClientlibError, ClientlibResult};
use crate::pipeline::{BuildPipeline, Encoding, WorkerPool};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

/// Metadata returned by [`ClientlibService::prepare_content`]
pub type ContentHints = EntryMetadata;

/// Builds, caches and delivers clientlibs
pub struct ClientlibService {
    gzip_enabled: bool,
    cache_root: String,
    store: Arc<dyn CacheStore>,
    locks: BuildLockTable,
    pipeline: BuildPipeline,
    processors: HashMap<AssetKind, Arc<dyn ContentProcessor>>,
    renderer: LinkRenderer,
}

impl ClientlibService {
    /// Create a service over a cache store
    pub fn new(config: &Config, store: Arc<dyn CacheStore>) -> ClientlibResult<Self> {
        let pool = WorkerPool::new(&config.threadpool)?;
        let pipeline = BuildPipeline::new(pool, config.cache.pipe_buffer_bytes());

        let mut processors: HashMap<AssetKind, Arc<dyn ContentProcessor>> = HashMap::new();
        processors.insert(AssetKind::Js, Arc::new(JavascriptProcessor));
        processors.insert(AssetKind::Css, Arc::new(CssProcessor));

        debug!(
            "Clientlib service: cache root {}, gzip {}",
            config.cache.root,
            if config.cache.gzip_enabled { "enabled" } else { "disabled" }
        );

        Ok(Self {
            gzip_enabled: config.cache.gzip_enabled,
            cache_root: config.cache.root.clone(),
            store,
            locks: BuildLockTable::new(),
            pipeline,
            processors,
            renderer: LinkRenderer::new(config.library.url_prefix.clone()),
        })
    }

    /// Downgrade gzip to identity when compression is disabled
    pub fn adjust_encoding(&self, requested: Encoding) -> Encoding {
        match requested {
            Encoding::Gzip if !self.gzip_enabled => Encoding::Identity,
            other => other,
        }
    }

    /// Cache key an asset is stored under for a requested encoding
    pub fn cache_key(&self, asset: &Asset, encoding: Encoding) -> CacheKey {
        let encoding = self.adjust_encoding(encoding);
        resolve_cache_key(&self.cache_root, &asset.path, encoding.suffix())
    }

    fn processor_for(&self, asset: &Asset) -> ClientlibResult<Arc<dyn ContentProcessor>> {
        self.processors
            .get(&asset.kind)
            .cloned()
            .ok_or_else(|| ClientlibError::Unprocessable {
                path: asset.path.clone(),
                kind: asset.kind.to_string(),
            })
    }

    /// Make sure a valid cache entry exists and return its metadata
    ///
    /// Builds the asset when the entry is missing or older than the asset.
    /// Concurrent calls for the same entry build it once.
    pub async fn prepare_content(
        &self,
        asset: &Asset,
        encoding: Encoding,
    ) -> ClientlibResult<ContentHints> {
        let encoding = self.adjust_encoding(encoding);
        let key = self.cache_key(asset, encoding);
        let processor = self.processor_for(asset)?;

        self.locks
            .with_build_lock(&key, || async {
                let cached = self.store.get(&key).await?;
                if is_valid(cached.as_ref(), asset) {
                    if let Some(metadata) = cached {
                        debug!("Cache hit for {}", key);
                        return Ok(metadata);
                    }
                }

                info!("Building {} into {}", asset.path, key);
                debug!(
                    "{} build slots free before {}",
                    self.pipeline.pool().available(),
                    key
                );
                if cached.is_some() {
                    self.store.delete(&key).await?;
                }
                let writer = self.store.begin(&key).await?;
                self.pipeline
                    .build(&key, asset, processor, encoding, writer)
                    .await
            })
            .await
    }

    /// Stream the cached content of `asset` into `sink`
    ///
    /// Copies nothing when there is no valid entry; call
    /// [`prepare_content`](Self::prepare_content) first. Returns the number
    /// of bytes written.
    pub async fn deliver_content<W>(
        &self,
        asset: &Asset,
        sink: &mut W,
        encoding: Encoding,
    ) -> ClientlibResult<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let key = self.cache_key(asset, encoding);
        let cached = self.store.get(&key).await?;
        if !is_valid(cached.as_ref(), asset) {
            debug!("No valid cache entry for {}, nothing delivered", key);
            return Ok(0);
        }

        let Some(mut reader) = self.store.open(&key).await? else {
            return Ok(0);
        };
        let copied = tokio::io::copy(&mut reader, sink)
            .await
            .map_err(|e| ClientlibError::io(format!("delivering {}", key), e))?;
        sink.flush()
            .await
            .map_err(|e| ClientlibError::io(format!("delivering {}", key), e))?;

        debug!("Delivered {} ({} bytes)", key, copied);
        Ok(copied)
    }

    /// Drop the cached entry of `asset`, returning whether one was removed
    ///
    /// Only a valid entry is removed; a stale one is replaced by the next
    /// build anyway.
    pub async fn reset_content(&self, asset: &Asset, encoding: Encoding) -> ClientlibResult<bool> {
        let key = self.cache_key(asset, encoding);

        self.locks
            .with_build_lock(&key, || async {
                let cached = self.store.get(&key).await?;
                if !is_valid(cached.as_ref(), asset) {
                    return Ok(false);
                }
                let removed = self.store.delete(&key).await?;
                if removed {
                    info!("Reset {}", key);
                }
                Ok::<_, ClientlibError>(removed)
            })
            .await
    }

    /// Write the HTML tag referencing `asset`
    pub fn render_links<W: fmt::Write + ?Sized>(
        &self,
        asset: &Asset,
        properties: &BTreeMap<String, String>,
        out: &mut W,
    ) -> fmt::Result {
        self.renderer.render(asset, properties, out)
    }

    /// Keys currently being built or waited for
    pub fn pending_builds(&self) -> usize {
        self.locks.len()
    }

    /// Release all waiting callers and stop the worker pool
    ///
    /// Builds already running finish; callers queued for a build lock fail
    /// with [`ClientlibError::ServiceShutdown`].
    pub fn shutdown(&self) {
        info!("Shutting down clientlib service");
        self.locks.shutdown();
        self.pipeline.shutdown();
    }
}
