use anyhow::Context;
use std::cell::Cell;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;
use tracing::{info, warn};
use wp_api_types::{WalletAddress, Wave};
use wp_sync_core::Session;

use crate::bindings::{self, Backend};
use crate::config::{CliConfig, Command};

pub(crate) async fn run(config: CliConfig) -> anyhow::Result<()> {
    let (bindings, backend) = bindings::build(&config);
    let session = Session::new(bindings, config.session_options());
    let period = config.poll_interval();

    match config.command {
        Command::Connect => {
            let account = ensure_account(&session).await?;
            println!("connected: {account}");
        }
        Command::Count => {
            let count = session.reader().read_total_count().await.context("could not read the wave count")?;
            println!("{count}");
        }
        Command::List => {
            let waves = session.reader().read_all_waves().await.context("could not read wave history")?;
            for wave in &waves {
                println!("{}", format_wave(wave));
            }
        }
        Command::Wave { message } => {
            ensure_account(&session).await?;
            let hash = session.submit(&message).await?;
            println!("mined {hash}");
            println!("total waves: {}", session.snapshot().wave_count);
        }
        Command::Watch => {
            watch_until(&session, backend, period, async {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    warn!(error = %err, "ctrl-c handler failed");
                }
            })
            .await?;
        }
    }

    Ok(())
}

/// Silent lookup first; prompts the wallet only when nothing is authorized.
async fn ensure_account(session: &Session) -> anyhow::Result<WalletAddress> {
    if let Some(account) = session.check_existing_connection().await {
        return Ok(account);
    }
    session.connect().await.context("wallet connection failed")
}

/// Mounts the session and prints every wave that lands in the list until
/// `shutdown` resolves. Returns how many were printed.
pub(crate) async fn watch_until(
    session: &Session,
    backend: Backend,
    period: Duration,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<usize> {
    let printed = Rc::new(Cell::new(0usize));
    let seen = printed.clone();
    let observer = session.store().observe(move |snapshot| {
        for wave in snapshot.waves.iter().skip(seen.get()) {
            println!("{}", format_wave(wave));
        }
        seen.set(snapshot.waves.len());
    });

    match session.mount().await {
        Some(account) => info!(account = %account, "watching as connected account"),
        None => info!("watching without a connected account"),
    }

    let neighbour = match backend {
        Backend::Simulated(ledger) => Some(tokio::task::spawn_local(bindings::simulate_neighbour(ledger, period))),
        Backend::Rpc => None,
    };

    shutdown.await;

    if let Some(task) = neighbour {
        task.abort();
    }
    session.teardown();
    session.store().unobserve(observer);
    Ok(printed.get())
}

pub(crate) fn format_wave(wave: &Wave) -> String {
    format!(
        "{}  {}  {}",
        wave.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        wave.address,
        wave.message
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tokio::task::LocalSet;
    use wp_ledger_client::SyncError;
    use wp_sync_core::SessionOptions;

    fn parse(args: &[&str]) -> anyhow::Result<CliConfig> {
        Ok(CliConfig::try_parse_from(std::iter::once("wave").chain(args.iter().copied()))?)
    }

    #[test]
    fn waves_print_as_one_line() {
        let wave = Wave::new(WalletAddress::new("0xabc"), 1_700_000_000, "hello".to_owned());
        assert_eq!(format_wave(&wave), "2023-11-14 22:13:20 UTC  0xabc  hello");
    }

    #[tokio::test]
    async fn simulated_commands_run_to_completion() -> anyhow::Result<()> {
        LocalSet::new()
            .run_until(async {
                for args in [
                    &["--simulate", "connect"][..],
                    &["--simulate", "count"][..],
                    &["--simulate", "list"][..],
                    &["--simulate", "wave", "hello"][..],
                ] {
                    run(parse(args)?).await?;
                }
                Ok::<(), anyhow::Error>(())
            })
            .await
    }

    #[tokio::test]
    async fn empty_wave_is_refused() -> anyhow::Result<()> {
        LocalSet::new()
            .run_until(async {
                let err = run(parse(&["--simulate", "wave", ""])?)
                    .await
                    .expect_err("empty message must be refused");
                assert_eq!(err.downcast_ref::<SyncError>(), Some(&SyncError::EmptyMessage));
                Ok::<(), anyhow::Error>(())
            })
            .await
    }

    #[tokio::test]
    async fn watch_prints_pushed_waves_until_shutdown() -> anyhow::Result<()> {
        LocalSet::new()
            .run_until(async {
                let config = parse(&["--simulate", "watch"])?;
                let (bindings, backend) = bindings::build(&config);
                let session = Session::new(bindings, SessionOptions::default());

                let printed = watch_until(
                    &session,
                    backend,
                    Duration::from_millis(10),
                    tokio::time::sleep(Duration::from_millis(200)),
                )
                .await?;

                assert!(printed >= 1);
                assert_eq!(session.snapshot().waves.len(), printed);
                Ok::<(), anyhow::Error>(())
            })
            .await
    }
}
