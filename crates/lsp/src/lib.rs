//! LSP front end for the graphref language server.
//!
//! A thin adapter over the core crates: a synchronous `lsp-server` main
//! loop over stdio owns all mutable state (document store, schema resolver,
//! workspace map), while registry fetches run on a small tokio runtime and
//! report back over a crossbeam channel.

mod conversions;
mod registry;
mod server;
mod workspace;

use std::path::PathBuf;

use anyhow::Context as _;
use lsp_server::Connection;

pub use server::Server;

/// Endpoint used when neither the CLI nor a project config names one.
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.graphref.dev/graphql";

/// Startup options, filled in from the CLI.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Explicit config file; skips per-document discovery when set.
    pub config: Option<PathBuf>,
    /// On-disk schema cache location.
    pub cache_dir: Option<PathBuf>,
    /// Default registry endpoint.
    pub registry_url: Option<String>,
}

/// Install the stderr tracing subscriber.
///
/// The LSP protocol owns stdin/stdout, so all logs go to stderr. `RUST_LOG`
/// overrides `default_level`.
pub fn init_tracing(default_level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .try_init();
}

/// Run the language server over stdio until the client disconnects.
pub fn run_server(options: Options) -> anyhow::Result<()> {
    let (connection, io_threads) = Connection::stdio();

    Server::new(connection, options)?.run()?;

    io_threads.join().context("joining stdio threads")?;
    tracing::info!("server shut down");
    Ok(())
}
