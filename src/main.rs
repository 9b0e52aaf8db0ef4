//! datawizard entry point

use clap::Parser;
use datawizard::cli::{run, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "datawizard=info".into()),
        )
        .init();

    run(Cli::parse()).await
}
