//! Deliver command - stream a cached clientlib

use super::{open_service, resolve_asset};
use crate::cli::args::DeliverArgs;
use crate::config::Config;
use crate::error::{ClientlibError, ClientlibResult};
use tokio::fs;
use tokio::io::AsyncWrite;
use tracing::{info, warn};

/// Execute the deliver command
pub async fn execute(args: DeliverArgs, config: &Config) -> ClientlibResult<()> {
    let asset = resolve_asset(&args.asset, config).await?;
    let service = open_service(config)?;
    let encoding = args.asset.requested_encoding();

    if !args.no_build {
        service.prepare_content(&asset, encoding).await?;
    }

    let mut sink: Box<dyn AsyncWrite + Unpin + Send> = match &args.output {
        Some(path) => Box::new(fs::File::create(path).await.map_err(|e| {
            ClientlibError::io(format!("creating {}", path.display()), e)
        })?),
        None => Box::new(tokio::io::stdout()),
    };

    let copied = service
        .deliver_content(&asset, sink.as_mut(), encoding)
        .await?;
    service.shutdown();

    if copied == 0 {
        warn!("Nothing cached for {}", asset.path);
    } else if let Some(path) = &args.output {
        info!("Wrote {} bytes to {}", copied, path.display());
    }

    Ok(())
}
