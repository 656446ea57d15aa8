use std::rc::Rc;
use tracing::{debug, warn};
use wp_api_types::Wave;
use wp_ledger_client::{SyncError, WaveLedger};

use crate::store::ViewStore;

/// Point-in-time reads against the ledger.
pub struct LedgerReader {
    store: Rc<ViewStore>,
    ledger: Option<Rc<dyn WaveLedger>>,
}

impl LedgerReader {
    pub fn new(store: Rc<ViewStore>, ledger: Option<Rc<dyn WaveLedger>>) -> Self {
        Self { store, ledger }
    }

    fn binding(&self) -> Result<&Rc<dyn WaveLedger>, SyncError> {
        self.ledger.as_ref().ok_or_else(|| {
            warn!("no contract binding; read skipped");
            SyncError::LedgerUnavailable("no contract binding".to_owned())
        })
    }

    /// Reads the ledger's wave counter into the store.
    pub async fn read_total_count(&self) -> Result<u64, SyncError> {
        let ledger = self.binding()?;
        let _busy = self.store.acquire_busy();

        match ledger.get_total_waves().await {
            Ok(count) => {
                debug!(count, "retrieved total wave count");
                self.store.set_wave_count(count);
                Ok(count)
            }
            Err(err) => {
                warn!(error = %err, "getTotalWaves failed");
                Err(SyncError::from_read(err))
            }
        }
    }

    /// Reads the full wave history. The store is not modified.
    pub async fn read_all_waves(&self) -> Result<Vec<Wave>, SyncError> {
        let ledger = self.binding()?;
        let _busy = self.store.acquire_busy();

        match ledger.get_all_waves().await {
            Ok(records) => {
                debug!(count = records.len(), "retrieved wave history");
                Ok(records.into_iter().map(Wave::from).collect())
            }
            Err(err) => {
                warn!(error = %err, "getAllWaves failed");
                Err(SyncError::from_read(err))
            }
        }
    }

    /// Appends history entries the store does not hold yet, in ledger order.
    ///
    /// Matching is by occurrence: each wave already in the store accounts for
    /// one identical history entry, so repeated identical waves all survive.
    pub async fn hydrate_history(&self) -> Result<usize, SyncError> {
        let history = self.read_all_waves().await?;
        let mut held = self.store.snapshot().waves;
        let missing: Vec<Wave> = history
            .into_iter()
            .filter(|wave| match held.iter().position(|seen| seen == wave) {
                Some(index) => {
                    held.swap_remove(index);
                    false
                }
                None => true,
            })
            .collect();
        Ok(self.store.extend_waves(missing))
    }
}
