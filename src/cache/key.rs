//! Cache key resolution
//!
//! A cache key is the cache root, the asset path and an optional encoding
//! suffix: `/var/cache/clientlibs` + `/libs/app.js` + `.gzip`.

use std::fmt;

/// Deterministic location of a built artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Borrow the key as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Compute the cache key for an asset path and encoding
///
/// The asset path is normalized to start with `/`. A blank encoding adds no
/// suffix.
pub fn resolve_cache_key(cache_root: &str, asset_path: &str, encoding: &str) -> CacheKey {
    let root = cache_root.trim_end_matches('/');
    let mut key = String::with_capacity(root.len() + asset_path.len() + encoding.len() + 2);
    key.push_str(root);
    if !asset_path.starts_with('/') {
        key.push('/');
    }
    key.push_str(asset_path);

    let encoding = encoding.trim();
    if !encoding.is_empty() {
        key.push('.');
        key.push_str(encoding);
    }
    CacheKey(key)
}
