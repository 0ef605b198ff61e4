//! CLI argument definitions using clap derive

use crate::asset::AssetKind;
use crate::pipeline::Encoding;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Clientlib - bundled, compressed and cached clientlibs
///
/// Builds script and style bundles into a persistent cache and serves them
/// from there.
#[derive(Parser, Debug)]
#[command(name = "clientlib")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "CLIENTLIB_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a clientlib into the cache if needed and show its metadata
    Prepare(PrepareArgs),

    /// Write a cached clientlib to stdout or a file
    Deliver(DeliverArgs),

    /// Remove a clientlib from the cache
    Reset(AssetArgs),

    /// Render the HTML tag referencing a clientlib
    Links(LinksArgs),

    /// Show or edit configuration
    Config(ConfigArgs),
}

/// Clientlib selection shared by all asset commands
#[derive(Args, Debug, Clone)]
pub struct AssetArgs {
    /// Clientlib path below the library root
    pub path: String,

    /// Clientlib type: js, css or link
    #[arg(short = 't', long = "type", default_value = "js", value_parser = parse_kind)]
    pub kind: AssetKind,

    /// Requested content encoding: identity or gzip
    #[arg(short, long, default_value = "identity", value_parser = parse_encoding)]
    pub encoding: Encoding,

    /// Shorthand for --encoding gzip
    #[arg(long, conflicts_with = "encoding")]
    pub gzip: bool,
}

impl AssetArgs {
    /// Requested content encoding
    pub fn requested_encoding(&self) -> Encoding {
        if self.gzip {
            Encoding::Gzip
        } else {
            self.encoding
        }
    }
}

/// Arguments for the prepare command
#[derive(Parser, Debug)]
pub struct PrepareArgs {
    #[command(flatten)]
    pub asset: AssetArgs,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the deliver command
#[derive(Parser, Debug)]
pub struct DeliverArgs {
    #[command(flatten)]
    pub asset: AssetArgs,

    /// Write to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Only deliver what is cached, never build
    #[arg(long)]
    pub no_build: bool,
}

/// Arguments for the links command
#[derive(Parser, Debug)]
pub struct LinksArgs {
    #[command(flatten)]
    pub asset: AssetArgs,

    /// Extra tag attributes (KEY=VALUE, or KEY for a boolean attribute)
    #[arg(short, long = "attr", value_parser = parse_attribute)]
    pub attrs: Vec<(String, String)>,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for metadata
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (cache key only)
    Plain,
}

fn parse_kind(s: &str) -> Result<AssetKind, String> {
    s.parse::<AssetKind>().map_err(|e| e.to_string())
}

fn parse_encoding(s: &str) -> Result<Encoding, String> {
    Encoding::parse(s).ok_or_else(|| format!("Unsupported encoding '{}': use identity or gzip", s))
}

/// Parse a tag attribute in KEY=VALUE or KEY form
fn parse_attribute(s: &str) -> Result<(String, String), String> {
    let (key, value) = match s.split_once('=') {
        Some((key, value)) => (key, value),
        None => (s, ""),
    };
    if key.is_empty() {
        return Err(format!("Invalid attribute '{}': empty name", s));
    }
    Ok((key.to_string(), value.to_string()))
}
