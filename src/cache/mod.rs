//! Build cache for clientlib artifacts
//!
//! Built bundles are stored under a cache key derived from the asset path and
//! encoding. An entry is served while its timestamp is not older than the
//! asset's; otherwise the next request rebuilds it under the key's build lock.
//!
//! # Entry States
//!
//! | State | Served | Description |
//! |-------|--------|-------------|
//! | Absent | no | Never built, reset, or build failed |
//! | Stale | no | Asset changed after the entry was built |
//! | Valid | yes | Timestamp not older than the asset |

pub mod entry;
pub mod key;
pub mod lock;
pub mod store;

pub use entry::{is_valid, EntryMetadata};
pub use key::{resolve_cache_key, CacheKey};
pub use lock::{BuildGuard, BuildLockTable};
pub use store::{CacheStore, EntryReader, EntryWriter, FsCacheStore, MemoryCacheStore};
