use std::cell::RefCell;
use std::rc::Rc;
use tracing::{info, warn};
use wp_api_types::{Account, MAX_MESSAGE_LEN, TxHash, ViewSnapshot, WalletAddress};
use wp_ledger_client::{SyncError, Timer, WalletProvider, WaveEventSource, WaveLedger};

use crate::connection::ConnectionManager;
use crate::reader::LedgerReader;
use crate::store::ViewStore;
use crate::subscriber::{LiveSubscriber, Spawner, SubscriberState, SubscriptionHandle};
use crate::writer::{LedgerWriter, WriterConfig};

/// External collaborators available to a session. Any of the ledger-facing
/// bindings may be absent, e.g. when the page has no injected wallet.
pub struct Bindings {
    pub wallet: Option<Rc<dyn WalletProvider>>,
    pub ledger: Option<Rc<dyn WaveLedger>>,
    pub events: Option<Rc<dyn WaveEventSource>>,
    pub timer: Option<Rc<dyn Timer>>,
    pub spawner: Rc<dyn Spawner>,
}

impl Bindings {
    /// No provider present: every ledger-facing binding is absent.
    pub fn detached(spawner: Rc<dyn Spawner>) -> Self {
        Self {
            wallet: None,
            ledger: None,
            events: None,
            timer: None,
            spawner,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionOptions {
    pub writer: WriterConfig,
    /// Also read the full history on mount, not just the count.
    pub hydrate_history_on_mount: bool,
    /// Drop pushed waves identical to one already listed.
    pub dedupe_live_events: bool,
}

/// Rejects messages the contract would not accept before anything is sent.
pub fn validate_message(message: &str) -> Result<(), SyncError> {
    if message.is_empty() {
        return Err(SyncError::EmptyMessage);
    }
    let len = message.chars().count();
    if len > MAX_MESSAGE_LEN {
        return Err(SyncError::MessageTooLong {
            len,
            max: MAX_MESSAGE_LEN,
        });
    }
    Ok(())
}

/// One UI session: owns the store and wires every component to it.
pub struct Session {
    store: Rc<ViewStore>,
    connection: ConnectionManager,
    reader: LedgerReader,
    writer: LedgerWriter,
    subscriber: LiveSubscriber,
    subscription: RefCell<Option<SubscriptionHandle>>,
    options: SessionOptions,
}

impl Session {
    pub fn new(bindings: Bindings, options: SessionOptions) -> Self {
        let store = ViewStore::new();
        Self {
            connection: ConnectionManager::new(store.clone(), bindings.wallet),
            reader: LedgerReader::new(store.clone(), bindings.ledger.clone()),
            writer: LedgerWriter::new(
                store.clone(),
                bindings.ledger,
                bindings.timer,
                options.writer.clone(),
            ),
            subscriber: LiveSubscriber::new(store.clone(), bindings.events, bindings.spawner)
                .with_dedupe(options.dedupe_live_events),
            subscription: RefCell::new(None),
            store,
            options,
        }
    }

    pub fn store(&self) -> &Rc<ViewStore> {
        &self.store
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        self.store.snapshot()
    }

    pub fn reader(&self) -> &LedgerReader {
        &self.reader
    }

    pub fn has_provider(&self) -> bool {
        self.connection.has_provider()
    }

    pub fn subscriber_state(&self) -> SubscriberState {
        self.subscription
            .borrow()
            .as_ref()
            .map_or(SubscriberState::Unattached, SubscriptionHandle::state)
    }

    /// Attaches the live subscriber, then looks for an authorized account.
    pub async fn mount(&self) -> Account {
        self.attach_live();
        let account = self.check_existing_connection().await;
        if account.is_some() && self.options.hydrate_history_on_mount {
            if let Err(err) = self.reader.hydrate_history().await {
                warn!(error = %err, "history hydration on mount failed");
            }
        }
        account
    }

    /// Idempotent; a second call keeps the existing subscription.
    pub fn attach_live(&self) -> SubscriberState {
        let mut subscription = self.subscription.borrow_mut();
        if subscription.is_none() {
            *subscription = self.subscriber.attach();
        }
        subscription
            .as_ref()
            .map_or(SubscriberState::Unattached, SubscriptionHandle::state)
    }

    /// Silent account lookup; on success the wave count is hydrated.
    pub async fn check_existing_connection(&self) -> Account {
        let account = self.connection.check_existing_connection().await?;
        // Failures are logged by the reader.
        let _ = self.reader.read_total_count().await;
        Some(account)
    }

    pub async fn connect(&self) -> Result<WalletAddress, SyncError> {
        self.connection.request_connection().await
    }

    pub async fn submit(&self, message: &str) -> Result<TxHash, SyncError> {
        if let Err(err) = validate_message(message) {
            info!(error = %err, "wave rejected before submission");
            return Err(err);
        }
        self.writer.submit_wave(message).await
    }

    pub fn teardown(&self) {
        if let Some(handle) = self.subscription.borrow_mut().take() {
            handle.detach();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}
