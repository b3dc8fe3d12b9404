use anyhow::{Context, Result};
use clap::Parser;
use pcap_exporter::cli::{commands, Cli};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Starting pcap_exporter v{}", pcap_exporter::VERSION);

    commands::handle_command(cli)
        .await
        .context("pcap_exporter failed")
}
