//! Streaming build pipeline
//!
//! A build runs the asset's processor on the worker pool, writing into one
//! end of an in-memory pipe. The caller drains the other end concurrently,
//! optionally gzip compresses, and streams the bytes into a staged cache
//! entry. Production and persistence overlap; a slow store backs up the
//! producer once the pipe buffer is full.
//!
//! A failing producer fails the build: the staged entry is aborted so a
//! truncated artifact is never committed.

use crate::asset::{Asset, ContentProcessor};
use crate::cache::entry::EntryMetadata;
use crate::cache::key::CacheKey;
use crate::cache::store::EntryWriter;
use crate::config::schema::ThreadPoolConfig;
use crate::error::{ClientlibError, ClientlibResult};
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::runtime::{Handle, Runtime};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const READ_CHUNK: usize = 16 * 1024;

/// How long a shut down pool waits for running builds
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Content encoding of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Encoding {
    /// Stored as produced
    #[default]
    Identity,
    /// Gzip compressed
    Gzip,
}

impl Encoding {
    /// Parse a requested encoding; blank means identity
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "identity" => Some(Self::Identity),
            "gzip" => Some(Self::Gzip),
            _ => None,
        }
    }

    /// Suffix appended to the cache key
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Identity => "",
            Self::Gzip => "gzip",
        }
    }

    /// Encoding recorded in entry metadata
    pub fn metadata_value(&self) -> Option<String> {
        match self {
            Self::Identity => None,
            Self::Gzip => Some("gzip".to_string()),
        }
    }
}

/// Worker pool running builds off the request tasks
///
/// Backed by a dedicated runtime with `min` worker threads. At most `max`
/// builds run at once; further builds queue without bound.
pub struct WorkerPool {
    runtime: Mutex<Option<Runtime>>,
    handle: Handle,
    permits: Arc<Semaphore>,
    max: usize,
    closed: AtomicBool,
}

impl WorkerPool {
    /// Start a pool sized from configuration
    pub fn new(config: &ThreadPoolConfig) -> ClientlibResult<Self> {
        let (min, max) = config.clamped();
        // Builds are async tasks on the workers; file reads of their
        // sources run on the blocking threads bounded below.
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(min)
            .max_blocking_threads(max)
            .thread_keep_alive(config.idle_timeout())
            .thread_name("clientlib-build")
            .enable_all()
            .build()
            .map_err(|e| ClientlibError::io("starting build worker pool", e))?;

        info!("Build worker pool started ({} workers, {} concurrent builds)", min, max);
        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Mutex::new(Some(runtime)),
            permits: Arc::new(Semaphore::new(max)),
            max,
            closed: AtomicBool::new(false),
        })
    }

    /// Queue `task` on the pool
    pub fn spawn<F, T>(&self, task: F) -> ClientlibResult<JoinHandle<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(ClientlibError::WorkerPool("pool is shut down".to_string()));
        }

        let permits = Arc::clone(&self.permits);
        Ok(self.handle.spawn(async move {
            let _permit = permits.acquire_owned().await;
            task.await
        }))
    }

    /// Builds that could start right now without queueing
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Stop accepting builds and retire the pool once running builds finish
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let runtime = self
            .runtime
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(runtime) = runtime else {
            return;
        };

        // Dropping a runtime is not allowed from async context, retire it on
        // its own thread.
        let permits = Arc::clone(&self.permits);
        let max = u32::try_from(self.max).unwrap_or(u32::MAX);
        let spawned = std::thread::Builder::new()
            .name("clientlib-build-shutdown".to_string())
            .spawn(move || {
                runtime.block_on(async {
                    let drained =
                        tokio::time::timeout(DRAIN_TIMEOUT, permits.acquire_many(max)).await;
                    if drained.is_err() {
                        warn!("Build worker pool shut down with builds still running");
                    }
                });
                runtime.shutdown_timeout(Duration::from_secs(1));
                debug!("Build worker pool stopped");
            });
        if let Err(e) = spawned {
            error!("Failed to retire build worker pool: {}", e);
        }
    }

    /// Whether the pool still accepts builds
    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Runs builds through the pipe into a cache entry
pub struct BuildPipeline {
    pool: WorkerPool,
    pipe_capacity: usize,
}

impl BuildPipeline {
    /// Create a pipeline on a worker pool
    pub fn new(pool: WorkerPool, pipe_capacity: usize) -> Self {
        Self {
            pool,
            pipe_capacity: pipe_capacity.max(1),
        }
    }

    /// Worker pool the builds run on
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Build `asset` into `writer` and commit it
    ///
    /// Returns the metadata the entry was committed with. Any production,
    /// compression or persistence failure aborts the writer.
    pub async fn build(
        &self,
        key: &CacheKey,
        asset: &Asset,
        processor: Arc<dyn ContentProcessor>,
        encoding: Encoding,
        mut writer: Box<dyn EntryWriter>,
    ) -> ClientlibResult<EntryMetadata> {
        let (mut producer_end, mut consumer_end) = tokio::io::duplex(self.pipe_capacity);
        let mime_type = processor.mime_type();

        let producer = {
            let asset = asset.clone();
            self.pool.spawn(async move {
                let produced = processor.process(&asset, &mut producer_end).await;
                let closed = producer_end.shutdown().await;
                produced?;
                closed.map_err(|e| ClientlibError::io("closing build pipe", e))
            })
        };
        let producer = match producer {
            Ok(handle) => handle,
            Err(e) => {
                writer.abort().await;
                return Err(e);
            }
        };

        let consumed = consume(&mut consumer_end, encoding, writer.as_mut()).await;
        // Unblocks a producer still writing after a consumer failure
        drop(consumer_end);

        let produced = match producer.await {
            Ok(result) => result,
            Err(e) => Err(ClientlibError::Internal(format!("build task failed: {}", e))),
        };

        // A consumer failure breaks the pipe, so its error is the cause
        let summary = match (consumed, produced) {
            (Err(e), produced) => {
                if let Err(side_effect) = produced {
                    debug!("Producer for {} stopped after: {}", key, side_effect);
                }
                warn!("Persisting {} failed: {}", key, e);
                writer.abort().await;
                return Err(e);
            }
            (Ok(_), Err(e)) => {
                error!("Producing {} for {} failed: {}", asset.path, key, e);
                writer.abort().await;
                return Err(ClientlibError::build_failed(key.as_str(), e));
            }
            (Ok(summary), Ok(())) => summary,
        };

        let metadata = EntryMetadata {
            last_modified: Some(asset.last_modified),
            mime_type: mime_type.to_string(),
            encoding: encoding.metadata_value(),
            size: summary.size,
            digest: summary.digest,
        };
        writer.commit(&metadata).await?;

        debug!("Built {} ({} bytes)", key, metadata.size);
        Ok(metadata)
    }

    /// Stop accepting builds
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }
}

struct Consumed {
    size: u64,
    digest: String,
}

/// Counts and hashes what reaches the entry writer
struct DigestSink<'a> {
    writer: &'a mut dyn EntryWriter,
    hasher: Sha256,
    size: u64,
}

impl DigestSink<'_> {
    async fn write(&mut self, bytes: &[u8]) -> ClientlibResult<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.hasher.update(bytes);
        self.size += bytes.len() as u64;
        self.writer.write_chunk(bytes).await
    }

    fn finish(self) -> Consumed {
        Consumed {
            size: self.size,
            digest: hex::encode(self.hasher.finalize()),
        }
    }
}

async fn consume<R>(
    reader: &mut R,
    encoding: Encoding,
    writer: &mut dyn EntryWriter,
) -> ClientlibResult<Consumed>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut sink = DigestSink {
        writer,
        hasher: Sha256::new(),
        size: 0,
    };
    let mut gzip = match encoding {
        Encoding::Gzip => Some(GzEncoder::new(Vec::new(), Compression::default())),
        Encoding::Identity => None,
    };
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        let n = reader
            .read(&mut buf)
            .await
            .map_err(|e| ClientlibError::io("reading build pipe", e))?;
        if n == 0 {
            break;
        }

        match gzip.as_mut() {
            Some(encoder) => {
                encoder
                    .write_all(&buf[..n])
                    .map_err(|e| ClientlibError::io("compressing build output", e))?;
                let compressed = std::mem::take(encoder.get_mut());
                sink.write(&compressed).await?;
            }
            None => sink.write(&buf[..n]).await?,
        }
    }

    if let Some(encoder) = gzip {
        let tail = encoder
            .finish()
            .map_err(|e| ClientlibError::io("finishing gzip stream", e))?;
        sink.write(&tail).await?;
    }

    Ok(sink.finish())
}
