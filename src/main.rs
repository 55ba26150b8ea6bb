use std::path::PathBuf;

use anyhow::Result;
use book_chat::config::Config;
use clap::Parser;

/// Chat with and summarize uploaded PDFs.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// TOML configuration file; built-in defaults are used when omitted.
    #[arg(long, short)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    config.apply_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.filter)),
        )
        .init();

    if let Err(err) = book_chat::run(config).await {
        tracing::error!("{err:#}");
        std::process::exit(1);
    }
    Ok(())
}
