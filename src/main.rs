//! terrastep CLI entrypoint

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use terrastep::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // TERRASTEP_LOG takes precedence over RUST_LOG; logs go to stderr so
    // command output on stdout stays machine-readable
    let filter = EnvFilter::try_from_env("TERRASTEP_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    Cli::parse().execute().await
}
