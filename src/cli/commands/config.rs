//! Config command - show or initialize configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager};
use crate::error::ClientlibResult;
use console::style;

/// Execute the config command
pub async fn execute(
    args: ConfigArgs,
    config: &Config,
    manager: &ConfigManager,
) -> ClientlibResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
    }

    Ok(())
}

fn show_config(config: &Config) -> ClientlibResult<()> {
    println!("{}", toml::to_string_pretty(config)?);
    println!(
        "{} cache store at {}",
        style("#").dim(),
        ConfigManager::cache_dir(config).display()
    );
    Ok(())
}

async fn init_config(manager: &ConfigManager, force: bool) -> ClientlibResult<()> {
    let path = manager.path();

    if path.exists() && !force {
        println!(
            "{} Config already exists at {}",
            style("[!!]").yellow(),
            path.display()
        );
        println!("     {}", style("Use --force to overwrite").dim());
        return Ok(());
    }

    manager.save(&Config::default()).await?;
    println!(
        "{} Configuration initialized at {}",
        style("[OK]").green(),
        path.display()
    );

    Ok(())
}
