//! Prepare command - build a clientlib into the cache

use super::{open_service, resolve_asset};
use crate::cli::args::{OutputFormat, PrepareArgs};
use crate::config::Config;
use crate::error::ClientlibResult;
use crate::service::ContentHints;
use console::style;

/// Execute the prepare command
pub async fn execute(args: PrepareArgs, config: &Config) -> ClientlibResult<()> {
    let asset = resolve_asset(&args.asset, config).await?;
    let service = open_service(config)?;

    let encoding = args.asset.requested_encoding();
    let key = service.cache_key(&asset, encoding);
    let hints = service.prepare_content(&asset, encoding).await?;
    service.shutdown();

    match args.format {
        OutputFormat::Table => print_table(key.as_str(), &hints),
        OutputFormat::Json => print_json(key.as_str(), &hints)?,
        OutputFormat::Plain => println!("{}", key),
    }

    Ok(())
}

fn print_table(key: &str, hints: &ContentHints) {
    let modified = hints
        .last_modified
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());

    println!("{:<15} {}", style("CACHE KEY").bold(), key);
    println!("{:<15} {}", style("MIME TYPE").bold(), hints.mime_type);
    println!(
        "{:<15} {}",
        style("ENCODING").bold(),
        hints.encoding.as_deref().unwrap_or("identity")
    );
    println!("{:<15} {}", style("SIZE").bold(), hints.size);
    println!("{:<15} {}", style("MODIFIED").bold(), modified);
    println!("{:<15} {}", style("DIGEST").bold(), style(&hints.digest).dim());
}

fn print_json(key: &str, hints: &ContentHints) -> ClientlibResult<()> {
    #[derive(serde::Serialize)]
    struct PreparedJson<'a> {
        key: &'a str,
        #[serde(flatten)]
        hints: &'a ContentHints,
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&PreparedJson { key, hints })?
    );
    Ok(())
}
