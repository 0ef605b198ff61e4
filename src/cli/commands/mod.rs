//! CLI command implementations

pub mod config;
pub mod deliver;
pub mod links;
pub mod prepare;
pub mod reset;

pub use config::execute as config;
pub use deliver::execute as deliver;
pub use links::execute as links;
pub use prepare::execute as prepare;
pub use reset::execute as reset;

use crate::asset::{Asset, AssetResolver, FsAssetResolver};
use crate::cache::FsCacheStore;
use crate::cli::args::AssetArgs;
use crate::config::{Config, ConfigManager};
use crate::error::ClientlibResult;
use crate::service::ClientlibService;
use std::sync::Arc;
use tracing::debug;

/// Service over the configured filesystem cache
fn open_service(config: &Config) -> ClientlibResult<ClientlibService> {
    let cache_dir = ConfigManager::cache_dir(config);
    debug!("Using cache store at {}", cache_dir.display());
    ClientlibService::new(config, Arc::new(FsCacheStore::new(cache_dir)))
}

/// Resolve the clientlib selected on the command line
async fn resolve_asset(args: &AssetArgs, config: &Config) -> ClientlibResult<Asset> {
    FsAssetResolver::new(config.library.root.clone())
        .resolve(&args.path, args.kind)
        .await
}
