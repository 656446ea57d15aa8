mod bindings;
mod commands;
mod config;

use anyhow::Context;
use clap::Parser;
use tokio::task::LocalSet;

use crate::config::CliConfig;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = CliConfig::parse();

    // Session state is Rc-based; keep every task on this thread.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    LocalSet::new().block_on(&runtime, commands::run(config))
}
