//! Cache entry metadata and staleness checking

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::asset::Asset;

/// Metadata persisted next to a built artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Last-modified time of the asset the entry was built from
    pub last_modified: Option<DateTime<Utc>>,

    /// Mime type of the (decoded) content
    pub mime_type: String,

    /// Content encoding of the stored bytes, `None` for identity
    pub encoding: Option<String>,

    /// Stored size in bytes
    pub size: u64,

    /// SHA256 of the stored bytes, hex encoded
    pub digest: String,
}

/// Check whether a cache entry may be served for an asset
///
/// The entry must exist and carry a timestamp that is not older than the
/// asset's current last-modified time. A missing timestamp forces a rebuild.
pub fn is_valid(entry: Option<&EntryMetadata>, asset: &Asset) -> bool {
    let Some(entry) = entry else {
        return false;
    };
    match entry.last_modified {
        Some(cached) => cached >= asset.last_modified,
        None => false,
    }
}
