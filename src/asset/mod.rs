//! Clientlib assets
//!
//! An asset is a named bundle of script or style sources. It knows its kind,
//! when any of its sources last changed and how to read each source member.
//! Turning the members into one artifact is the job of a
//! [`ContentProcessor`](processor::ContentProcessor).

pub mod fs;
pub mod processor;
pub mod render;

pub use fs::FsAssetResolver;
pub use processor::{ContentProcessor, CssProcessor, JavascriptProcessor};
pub use render::LinkRenderer;

use crate::error::{ClientlibError, ClientlibResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::io::AsyncRead;

/// Reader over one source member
pub type MemberReader = Box<dyn AsyncRead + Send + Unpin>;

/// Kind of clientlib
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    /// JavaScript bundle
    Js,
    /// Stylesheet bundle
    Css,
    /// Plain link to a resource, never bundled
    Link,
}

impl AssetKind {
    /// File extension of sources and built artifacts of this kind
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            Self::Js => Some("js"),
            Self::Css => Some("css"),
            Self::Link => None,
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Js => "js",
            Self::Css => "css",
            Self::Link => "link",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for AssetKind {
    type Err = ClientlibError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "js" | "javascript" => Ok(Self::Js),
            "css" => Ok(Self::Css),
            "link" => Ok(Self::Link),
            other => Err(ClientlibError::UnknownKind(other.to_string())),
        }
    }
}

/// Where the members of an asset come from
#[async_trait]
pub trait AssetSource: Send + Sync {
    /// Member names in bundle order
    fn members(&self) -> &[String];

    /// Open a member for reading
    async fn open(&self, member: &str) -> ClientlibResult<MemberReader>;
}

/// Resolves logical clientlib paths to assets
#[async_trait]
pub trait AssetResolver: Send + Sync {
    /// Resolve `path` as an asset of `kind`
    async fn resolve(&self, path: &str, kind: AssetKind) -> ClientlibResult<Asset>;
}

/// A resolved clientlib
#[derive(Clone)]
pub struct Asset {
    /// Logical path, also the base of the cache key
    pub path: String,

    /// Kind of bundle
    pub kind: AssetKind,

    /// Newest modification time of any member
    pub last_modified: DateTime<Utc>,

    source: Arc<dyn AssetSource>,
}

impl Asset {
    /// Create an asset over a source
    pub fn new(
        path: impl Into<String>,
        kind: AssetKind,
        last_modified: DateTime<Utc>,
        source: impl AssetSource + 'static,
    ) -> Self {
        Self {
            path: path.into(),
            kind,
            last_modified,
            source: Arc::new(source),
        }
    }

    /// Source the members are read from
    pub fn source(&self) -> &dyn AssetSource {
        self.source.as_ref()
    }

    /// Same asset with a different modification time
    pub fn touched(&self, last_modified: DateTime<Utc>) -> Self {
        Self {
            last_modified,
            ..self.clone()
        }
    }
}

impl fmt::Debug for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Asset")
            .field("path", &self.path)
            .field("kind", &self.kind)
            .field("last_modified", &self.last_modified)
            .field("members", &self.source.members())
            .finish()
    }
}

/// In-memory source, for embedding and tests
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    names: Vec<String>,
    contents: Vec<Vec<u8>>,
}

impl StaticSource {
    /// Create a source from `(name, content)` pairs
    pub fn new<N, C>(members: Vec<(N, C)>) -> Self
    where
        N: Into<String>,
        C: Into<Vec<u8>>,
    {
        let (names, contents) = members
            .into_iter()
            .map(|(name, content)| (name.into(), content.into()))
            .unzip();
        Self { names, contents }
    }
}

#[async_trait]
impl AssetSource for StaticSource {
    fn members(&self) -> &[String] {
        &self.names
    }

    async fn open(&self, member: &str) -> ClientlibResult<MemberReader> {
        let idx = self
            .names
            .iter()
            .position(|name| name == member)
            .ok_or_else(|| ClientlibError::AssetNotFound(member.to_string()))?;
        Ok(Box::new(std::io::Cursor::new(self.contents[idx].clone())))
    }
}
