//! relaynet-node binary
//!
//! Reads its configuration from flags and environment variables, runs one
//! relay node and stops it cleanly on Ctrl-C.

use anyhow::Context;
use clap::Parser;
use relaynet_logging::RelaySubscriberBuilder;
use relaynet_node::{Cli, RelayNode};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let _log_guard = RelaySubscriberBuilder::new()
        .with_config(cli.log_config())
        .init()
        .context("failed to initialize logging")?;

    let config = cli.node_config().context("invalid node configuration")?;

    let node = RelayNode::new(config).context("failed to create node")?;
    node.start().await.context("failed to start node")?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    node.span().in_scope(|| info!("Shutdown requested"));

    node.stop().await?;
    Ok(())
}
