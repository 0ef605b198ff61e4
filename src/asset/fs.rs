//! Filesystem clientlib library
//!
//! A clientlib path resolves under the library root either to a directory,
//! whose files of the matching extension are bundled in name order, or to a
//! single file.

use super::{Asset, AssetKind, AssetResolver, AssetSource, MemberReader};
use crate::error::{ClientlibError, ClientlibResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tracing::debug;

/// Resolves clientlibs from a directory tree
#[derive(Debug, Clone)]
pub struct FsAssetResolver {
    root: PathBuf,
}

impl FsAssetResolver {
    /// Create a resolver over a library root
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Library root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a logical path below the root, refusing to leave it
    fn local_path(&self, logical: &str) -> ClientlibResult<PathBuf> {
        let relative = Path::new(logical.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(ClientlibError::AssetNotFound(logical.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl AssetResolver for FsAssetResolver {
    async fn resolve(&self, path: &str, kind: AssetKind) -> ClientlibResult<Asset> {
        let trimmed = path.trim_start_matches('/');
        let logical = match kind.extension() {
            Some(ext) => trimmed
                .strip_suffix(&format!(".{}", ext))
                .unwrap_or(trimmed),
            None => trimmed,
        };
        let local = self.local_path(logical)?;

        let (base, members, last_modified) = if is_dir(&local).await {
            let (members, newest) = collect_members(&local, kind.extension()).await?;
            (local, members, newest)
        } else {
            let mut file = local;
            if let Some(ext) = kind.extension() {
                if !is_file(&file).await {
                    let name = format!(
                        "{}.{}",
                        file.file_name().unwrap_or_default().to_string_lossy(),
                        ext
                    );
                    file.set_file_name(name);
                }
            }
            if !is_file(&file).await {
                return Err(ClientlibError::AssetNotFound(path.to_string()));
            }
            let modified = modified_at(&file).await?;
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let base = file.parent().map(Path::to_path_buf).unwrap_or_default();
            (base, vec![name], modified)
        };

        let asset_path = match kind.extension() {
            Some(ext) => format!("/{}.{}", logical, ext),
            None => format!("/{}", logical),
        };
        debug!(
            "Resolved {} clientlib {} with {} members",
            kind,
            asset_path,
            members.len()
        );

        Ok(Asset::new(
            asset_path,
            kind,
            DateTime::<Utc>::from(last_modified),
            FsSource { base, members },
        ))
    }
}

/// Members read from files below a base directory
#[derive(Debug, Clone)]
pub struct FsSource {
    base: PathBuf,
    members: Vec<String>,
}

#[async_trait]
impl AssetSource for FsSource {
    fn members(&self) -> &[String] {
        &self.members
    }

    async fn open(&self, member: &str) -> ClientlibResult<MemberReader> {
        let path = self.base.join(member);
        let file = fs::File::open(&path)
            .await
            .map_err(|e| ClientlibError::io(format!("opening {}", path.display()), e))?;
        Ok(Box::new(file))
    }
}

async fn is_dir(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
}

async fn is_file(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
}

async fn modified_at(path: &Path) -> ClientlibResult<SystemTime> {
    fs::metadata(path)
        .await
        .and_then(|m| m.modified())
        .map_err(|e| ClientlibError::io(format!("reading mtime of {}", path.display()), e))
}

/// Walk `dir` and return the relative member paths plus the newest mtime
///
/// Directory mtimes count too, so removing a member invalidates the bundle.
async fn collect_members(
    dir: &Path,
    extension: Option<&str>,
) -> ClientlibResult<(Vec<String>, SystemTime)> {
    let mut members = Vec::new();
    let mut newest = modified_at(dir).await?;
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let mut entries = fs::read_dir(&current).await.map_err(|e| {
            ClientlibError::io(format!("reading directory {}", current.display()), e)
        })?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ClientlibError::io("reading directory entry", e))?
        {
            let path = entry.path();
            let metadata = entry
                .metadata()
                .await
                .map_err(|e| ClientlibError::io(format!("reading {}", path.display()), e))?;
            if let Ok(modified) = metadata.modified() {
                newest = newest.max(modified);
            }

            if metadata.is_dir() {
                pending.push(path);
                continue;
            }

            let matches = match extension {
                Some(ext) => path.extension().is_some_and(|e| e == ext),
                None => true,
            };
            if matches {
                if let Ok(relative) = path.strip_prefix(dir) {
                    members.push(relative.to_string_lossy().replace('\\', "/"));
                }
            }
        }
    }

    members.sort();
    Ok((members, newest))
}
