//! Clientlib cache - bundled, compressed and cached script/style assets
//!
//! Builds clientlib bundles on demand into a persistent cache, with at most
//! one build per cache entry in flight, and serves them from there.

pub mod asset;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod service;

pub use error::{ClientlibError, ClientlibResult};
pub use pipeline::Encoding;
pub use service::{ClientlibService, ContentHints};
