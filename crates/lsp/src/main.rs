//! Standalone language server binary, speaking LSP over stdio.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "graphref-lsp", version, about = "GraphQL language server backed by a schema registry")]
struct Cli {
    /// Use this config file for every document instead of discovering one.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory for the on-disk schema cache.
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Default registry endpoint; project configs may override it.
    #[arg(long, value_name = "URL")]
    registry_url: Option<String>,

    /// Log level when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    graphref_lsp::init_tracing(&cli.log_level);

    graphref_lsp::run_server(graphref_lsp::Options {
        config: cli.config,
        cache_dir: cli.cache_dir,
        registry_url: cli.registry_url,
    })
}
