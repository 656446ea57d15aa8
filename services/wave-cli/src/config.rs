use clap::{Parser, Subcommand};
use std::time::Duration;
use wp_api_types::DEFAULT_GAS_LIMIT;
use wp_sync_core::{SessionOptions, WriterConfig};

#[derive(Debug, Parser)]
#[command(name = "wave", version, about = "Wave Portal command-line client")]
pub(crate) struct CliConfig {
    /// Ethereum JSON-RPC endpoint.
    #[arg(long, env = "WAVE_PORTAL_RPC_URL", default_value = "http://localhost:8545")]
    pub(crate) rpc_url: String,

    /// Deployed Wave Portal contract address.
    #[arg(long, env = "WAVE_PORTAL_CONTRACT")]
    pub(crate) contract: Option<String>,

    #[arg(long, env = "WAVE_PORTAL_GAS_LIMIT", default_value_t = DEFAULT_GAS_LIMIT)]
    pub(crate) gas_limit: u64,

    /// Receipt and log-filter polling interval.
    #[arg(long = "poll-interval-ms", env = "WAVE_PORTAL_POLL_MS", default_value_t = 4000)]
    pub(crate) poll_interval_ms: u64,

    /// Give up waiting for a wave to be mined after this many seconds.
    #[arg(long)]
    pub(crate) confirm_timeout_secs: Option<u64>,

    /// Run against an in-process ledger instead of a node.
    #[arg(long)]
    pub(crate) simulate: bool,

    /// Read the full history right after connecting.
    #[arg(long)]
    pub(crate) hydrate_history: bool,

    /// Skip pushed waves already listed.
    #[arg(long)]
    pub(crate) dedupe: bool,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub(crate) enum Command {
    /// Authorize an account (prompts the wallet if none is authorized yet).
    Connect,
    /// Print the ledger's total wave count.
    Count,
    /// Print the full wave history.
    List,
    /// Send a wave with the given message.
    Wave { message: String },
    /// Print waves as they are pushed until interrupted.
    Watch,
}

impl CliConfig {
    pub(crate) fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub(crate) fn session_options(&self) -> SessionOptions {
        SessionOptions {
            writer: WriterConfig {
                gas_limit: self.gas_limit,
                confirmation_timeout: self.confirm_timeout_secs.map(Duration::from_secs),
            },
            hydrate_history_on_mount: self.hydrate_history,
            dedupe_live_events: self.dedupe,
        }
    }
}
