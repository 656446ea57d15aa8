use futures::future::{Either, select};
use std::rc::Rc;
use std::time::Duration;
use tracing::{info, warn};
use wp_api_types::{DEFAULT_GAS_LIMIT, TxHash};
use wp_ledger_client::{PendingWave, ProviderError, SyncError, Timer, WaveLedger};

use crate::store::ViewStore;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriterConfig {
    pub gas_limit: u64,
    /// `None` waits for inclusion indefinitely.
    pub confirmation_timeout: Option<Duration>,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            gas_limit: DEFAULT_GAS_LIMIT,
            confirmation_timeout: None,
        }
    }
}

/// Submits waves and refreshes the count once they are mined.
pub struct LedgerWriter {
    store: Rc<ViewStore>,
    ledger: Option<Rc<dyn WaveLedger>>,
    timer: Option<Rc<dyn Timer>>,
    config: WriterConfig,
}

impl LedgerWriter {
    pub fn new(
        store: Rc<ViewStore>,
        ledger: Option<Rc<dyn WaveLedger>>,
        timer: Option<Rc<dyn Timer>>,
        config: WriterConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            timer,
            config,
        }
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Sends `wave(message)`, waits for it to be mined, then re-reads the
    /// total count. The message is expected to be validated already.
    ///
    /// Concurrent calls are not serialized here; callers gate on the busy
    /// flag.
    pub async fn submit_wave(&self, message: &str) -> Result<TxHash, SyncError> {
        let Some(ledger) = &self.ledger else {
            warn!("no contract binding; wave not sent");
            return Err(SyncError::LedgerUnavailable("no contract binding".to_owned()));
        };
        let Some(account) = self.store.account() else {
            warn!("no connected account; wave not sent");
            return Err(SyncError::LedgerUnavailable("no connected account".to_owned()));
        };

        let _busy = self.store.acquire_busy();

        let pending = ledger
            .wave(message, self.config.gas_limit)
            .await
            .map_err(|err| {
                warn!(error = %err, account = %account, "wave submission failed");
                SyncError::from_write(err)
            })?;
        let hash = pending.hash().clone();
        info!(tx_hash = %hash, "mining");

        self.confirm(pending.as_ref()).await.map_err(|err| {
            warn!(error = %err, tx_hash = %hash, "wave confirmation failed");
            SyncError::from_write(err)
        })?;
        info!(tx_hash = %hash, "mined");

        match ledger.get_total_waves().await {
            Ok(count) => {
                info!(count, "retrieved total wave count");
                self.store.set_wave_count(count);
            }
            Err(err) => warn!(error = %err, "count refresh after mining failed"),
        }

        Ok(hash)
    }

    async fn confirm(&self, pending: &dyn PendingWave) -> Result<(), ProviderError> {
        let (Some(timeout), Some(timer)) = (self.config.confirmation_timeout, &self.timer) else {
            return pending.wait().await;
        };

        match select(pending.wait(), timer.delay(timeout)).await {
            Either::Left((outcome, _)) => outcome,
            Either::Right(_) => Err(ProviderError::TimedOut(timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use futures::future::LocalBoxFuture;
    use std::cell::RefCell;
    use wp_api_types::WalletAddress;
    use wp_ledger_memory::{InMemoryLedger, MiningMode};

    fn connected_store() -> Rc<ViewStore> {
        let store = ViewStore::new();
        store.set_account(WalletAddress::new("0xABC"));
        store
    }

    fn ledger(mode: MiningMode) -> Rc<InMemoryLedger> {
        let ledger = Rc::new(InMemoryLedger::new(mode));
        ledger.set_sender(WalletAddress::new("0xABC"));
        ledger
    }

    fn record_busy(store: &Rc<ViewStore>) -> Rc<RefCell<Vec<bool>>> {
        let transitions = Rc::new(RefCell::new(Vec::new()));
        let seen = transitions.clone();
        let last = Rc::new(std::cell::Cell::new(store.is_busy()));
        store.observe(move |snapshot| {
            if snapshot.busy != last.get() {
                last.set(snapshot.busy);
                seen.borrow_mut().push(snapshot.busy);
            }
        });
        transitions
    }

    /// Elapses as soon as it is polled.
    struct ImmediateTimer;

    impl Timer for ImmediateTimer {
        fn delay(&self, _duration: Duration) -> LocalBoxFuture<'static, ()> {
            futures::future::ready(()).boxed_local()
        }
    }

    #[tokio::test]
    async fn successful_wave_refreshes_count_and_toggles_busy_once() -> anyhow::Result<()> {
        let store = connected_store();
        let busy = record_busy(&store);
        let ledger = ledger(MiningMode::Instant);
        let writer = LedgerWriter::new(store.clone(), Some(ledger.clone()), None, WriterConfig::default());

        writer.submit_wave("hello").await?;

        assert_eq!(store.wave_count(), 1);
        assert_eq!(*busy.borrow(), vec![true, false]);
        Ok(())
    }

    #[tokio::test]
    async fn rejected_submission_still_clears_busy_once() {
        let store = connected_store();
        let busy = record_busy(&store);
        let ledger = ledger(MiningMode::Instant);
        ledger.fail_next_submit(ProviderError::UserRejected);
        let writer = LedgerWriter::new(store.clone(), Some(ledger.clone()), None, WriterConfig::default());

        assert!(matches!(
            writer.submit_wave("hello").await,
            Err(SyncError::TransactionFailed(_))
        ));
        assert_eq!(*busy.borrow(), vec![true, false]);
        assert_eq!(store.wave_count(), 0);
    }

    #[tokio::test]
    async fn reverted_wave_is_a_transaction_failure() {
        let store = connected_store();
        let busy = record_busy(&store);
        let ledger = ledger(MiningMode::Instant);
        ledger.revert_next();
        let writer = LedgerWriter::new(store.clone(), Some(ledger.clone()), None, WriterConfig::default());

        assert!(matches!(
            writer.submit_wave("hello").await,
            Err(SyncError::TransactionFailed(_))
        ));
        assert_eq!(*busy.borrow(), vec![true, false]);
    }

    #[tokio::test]
    async fn missing_account_or_binding_is_ledger_unavailable() {
        let ledger = ledger(MiningMode::Instant);
        let unconnected = LedgerWriter::new(ViewStore::new(), Some(ledger.clone()), None, WriterConfig::default());
        assert!(matches!(
            unconnected.submit_wave("hello").await,
            Err(SyncError::LedgerUnavailable(_))
        ));

        let unbound = LedgerWriter::new(connected_store(), None, None, WriterConfig::default());
        assert!(matches!(
            unbound.submit_wave("hello").await,
            Err(SyncError::LedgerUnavailable(_))
        ));
        assert_eq!(ledger.submit_calls(), 0);
    }

    #[tokio::test]
    async fn gas_ceiling_comes_from_config() -> anyhow::Result<()> {
        let ledger = ledger(MiningMode::Instant);
        let writer = LedgerWriter::new(
            connected_store(),
            Some(ledger.clone()),
            None,
            WriterConfig {
                gas_limit: 500_000,
                ..WriterConfig::default()
            },
        );
        assert_eq!(writer.config().gas_limit, 500_000);
        writer.submit_wave("hello").await?;
        assert_eq!(ledger.last_gas_limit(), Some(500_000));
        Ok(())
    }

    #[tokio::test]
    async fn confirmation_timeout_fails_the_wave_and_clears_busy() {
        let store = connected_store();
        let ledger = ledger(MiningMode::Manual);
        let writer = LedgerWriter::new(
            store.clone(),
            Some(ledger.clone()),
            Some(Rc::new(ImmediateTimer)),
            WriterConfig {
                confirmation_timeout: Some(Duration::from_secs(30)),
                ..WriterConfig::default()
            },
        );

        let outcome = writer.submit_wave("hello").await;
        assert!(matches!(outcome, Err(SyncError::TransactionFailed(_))));
        assert!(!store.is_busy());
        assert_eq!(ledger.pending_count(), 1);
    }

    #[tokio::test]
    async fn dropping_an_in_flight_submission_clears_busy() {
        let store = connected_store();
        let ledger = ledger(MiningMode::Manual);
        let writer = LedgerWriter::new(store.clone(), Some(ledger.clone()), None, WriterConfig::default());

        {
            let mut submission = Box::pin(writer.submit_wave("hello"));
            assert!(futures::poll!(submission.as_mut()).is_pending());
            assert!(store.is_busy());
        }

        assert!(!store.is_busy());
    }

    #[tokio::test]
    async fn failed_count_refresh_keeps_the_mined_wave() -> anyhow::Result<()> {
        let store = connected_store();
        let ledger = ledger(MiningMode::Manual);
        let writer = LedgerWriter::new(store.clone(), Some(ledger.clone()), None, WriterConfig::default());

        let mut submission = Box::pin(writer.submit_wave("hello"));
        assert!(futures::poll!(submission.as_mut()).is_pending());
        ledger.set_reads_unavailable(true);
        ledger.mine_pending();

        submission.await?;
        assert_eq!(ledger.total(), 1);
        assert_eq!(store.wave_count(), 0);
        assert!(!store.is_busy());
        Ok(())
    }
}
