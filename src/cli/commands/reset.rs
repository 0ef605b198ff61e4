//! Reset command - drop a clientlib from the cache

use super::{open_service, resolve_asset};
use crate::cli::args::AssetArgs;
use crate::config::Config;
use crate::error::ClientlibResult;
use console::style;

/// Execute the reset command
pub async fn execute(args: AssetArgs, config: &Config) -> ClientlibResult<()> {
    let asset = resolve_asset(&args, config).await?;
    let service = open_service(config)?;

    let encoding = args.requested_encoding();
    let key = service.cache_key(&asset, encoding);
    let removed = service.reset_content(&asset, encoding).await?;
    service.shutdown();

    if removed {
        println!("{} Removed {}", style("[OK]").green(), key);
    } else {
        println!("{} Nothing cached for {}", style("[--]").dim(), key);
    }

    Ok(())
}
