//! Links command - render the tag referencing a clientlib

use super::resolve_asset;
use crate::asset::LinkRenderer;
use crate::cli::args::LinksArgs;
use crate::config::Config;
use crate::error::{ClientlibError, ClientlibResult};
use std::collections::BTreeMap;

/// Execute the links command
pub async fn execute(args: LinksArgs, config: &Config) -> ClientlibResult<()> {
    let asset = resolve_asset(&args.asset, config).await?;
    let properties: BTreeMap<String, String> = args.attrs.into_iter().collect();

    // Rendering needs no cache, so no service (and worker pool) is started
    let mut tag = String::new();
    LinkRenderer::new(config.library.url_prefix.clone())
        .render(&asset, &properties, &mut tag)
        .map_err(|e| ClientlibError::Internal(format!("rendering link: {}", e)))?;

    println!("{}", tag);
    Ok(())
}
