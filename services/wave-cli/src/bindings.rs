use futures::FutureExt;
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use std::time::Duration;
use tracing::{info, warn};
use wp_api_types::{WalletAddress, WaveRecord};
use wp_ledger_client::Timer;
use wp_ledger_evm::{Eip1193Wallet, HttpTransport, WavePortalContract};
use wp_ledger_memory::{GENESIS_TIMESTAMP, InMemoryLedger, InMemoryWallet, MiningMode};
use wp_sync_core::{Bindings, Spawner};

use crate::config::CliConfig;

pub(crate) const SIMULATED_ACCOUNT: &str = "0x00000000000000000000000000000000000000a1";
const SIMULATED_NEIGHBOUR: &str = "0x00000000000000000000000000000000000000b2";

pub(crate) struct TokioSpawner;

impl Spawner for TokioSpawner {
    fn spawn_local(&self, task: LocalBoxFuture<'static, ()>) {
        tokio::task::spawn_local(task);
    }
}

pub(crate) struct TokioTimer;

impl Timer for TokioTimer {
    fn delay(&self, duration: Duration) -> LocalBoxFuture<'static, ()> {
        tokio::time::sleep(duration).boxed_local()
    }
}

/// Handles kept alongside the session; only the simulated ledger has one.
pub(crate) enum Backend {
    Rpc,
    Simulated(InMemoryLedger),
}

pub(crate) fn build(config: &CliConfig) -> (Bindings, Backend) {
    if config.simulate {
        return simulated();
    }

    let transport = Rc::new(HttpTransport::new(Some(config.rpc_url.clone())));
    info!(endpoint = transport.endpoint(), "using JSON-RPC node");
    let wallet = Rc::new(Eip1193Wallet::new(transport.clone()));

    let Some(address) = &config.contract else {
        warn!("no contract address configured; ledger reads and writes are unavailable");
        let bindings = Bindings {
            wallet: Some(wallet),
            ..Bindings::detached(Rc::new(TokioSpawner))
        };
        return (bindings, Backend::Rpc);
    };

    let contract =
        Rc::new(WavePortalContract::new(transport.clone(), address.clone()).with_poll_interval(config.poll_interval()));
    let bindings = Bindings {
        wallet: Some(wallet),
        ledger: Some(contract.clone()),
        events: Some(contract),
        timer: Some(transport),
        spawner: Rc::new(TokioSpawner),
    };
    (bindings, Backend::Rpc)
}

fn simulated() -> (Bindings, Backend) {
    let account = WalletAddress::new(SIMULATED_ACCOUNT);
    let ledger = InMemoryLedger::new(MiningMode::Instant);
    ledger.set_sender(account.clone());
    ledger.seed(vec![WaveRecord {
        waver: WalletAddress::new(SIMULATED_NEIGHBOUR),
        timestamp: GENESIS_TIMESTAMP,
        message: "first!".to_owned(),
    }]);
    info!(account = %account, "using simulated ledger");

    let shared = Rc::new(ledger.clone());
    let bindings = Bindings {
        wallet: Some(Rc::new(InMemoryWallet::approving(account))),
        ledger: Some(shared.clone()),
        events: Some(shared),
        timer: Some(Rc::new(TokioTimer)),
        spawner: Rc::new(TokioSpawner),
    };
    (bindings, Backend::Simulated(ledger))
}

/// Has the simulated neighbour wave every `period` so `watch` has something to show.
pub(crate) async fn simulate_neighbour(ledger: InMemoryLedger, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;
    let mut n = 1u64;
    loop {
        ticker.tick().await;
        ledger.external_wave(WalletAddress::new(SIMULATED_NEIGHBOUR), &format!("wave #{n} from next door"));
        n += 1;
    }
}
