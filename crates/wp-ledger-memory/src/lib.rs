//! In-process wallet and Wave Portal ledger.
//!
//! Both implement the same ports as the JSON-RPC adapter, so the sync
//! engine can be driven end to end without a node. Failures and mining
//! are scriptable for tests.

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::{mpsc, oneshot};
use futures::stream::LocalBoxStream;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use tracing::debug;
use wp_api_types::{NewWaveEvent, TxHash, WalletAddress, WaveRecord};
use wp_ledger_client::{PendingWave, ProviderError, WalletProvider, WaveEventSource, WaveLedger};

pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000;

// ── Wallet ──

#[derive(Default)]
pub struct InMemoryWallet {
    authorized: RefCell<Vec<WalletAddress>>,
    prompt_account: RefCell<Option<WalletAddress>>,
    reject_prompts: Cell<bool>,
    silent_calls: Cell<usize>,
    prompt_calls: Cell<usize>,
}

impl InMemoryWallet {
    /// A wallet with no authorized accounts whose prompt approves `account`.
    pub fn approving(account: WalletAddress) -> Self {
        let wallet = Self::default();
        wallet.prompt_account.replace(Some(account));
        wallet
    }

    /// A wallet that already authorized `account` for this origin.
    pub fn authorized(account: WalletAddress) -> Self {
        let wallet = Self::default();
        wallet.authorized.replace(vec![account]);
        wallet
    }

    pub fn reject_prompts(&self, reject: bool) {
        self.reject_prompts.set(reject);
    }

    pub fn set_authorized(&self, accounts: Vec<WalletAddress>) {
        self.authorized.replace(accounts);
    }

    pub fn silent_calls(&self) -> usize {
        self.silent_calls.get()
    }

    pub fn prompt_calls(&self) -> usize {
        self.prompt_calls.get()
    }
}

#[async_trait(?Send)]
impl WalletProvider for InMemoryWallet {
    async fn request_accounts(&self, prompt: bool) -> Result<Vec<WalletAddress>, ProviderError> {
        if !prompt {
            self.silent_calls.set(self.silent_calls.get() + 1);
            return Ok(self.authorized.borrow().clone());
        }

        self.prompt_calls.set(self.prompt_calls.get() + 1);
        if self.reject_prompts.get() {
            return Err(ProviderError::UserRejected);
        }

        if let Some(account) = self.prompt_account.borrow().clone() {
            let mut authorized = self.authorized.borrow_mut();
            if !authorized.contains(&account) {
                authorized.insert(0, account);
            }
        }
        Ok(self.authorized.borrow().clone())
    }
}

// ── Ledger ──

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MiningMode {
    /// Transactions are included as soon as they are submitted.
    Instant,
    /// Transactions wait for `mine_pending`.
    Manual,
}

struct QueuedWave {
    hash: TxHash,
    record: WaveRecord,
    revert: bool,
    done: oneshot::Sender<Result<(), ProviderError>>,
}

struct LedgerState {
    waves: RefCell<Vec<WaveRecord>>,
    queue: RefCell<VecDeque<QueuedWave>>,
    listeners: RefCell<Vec<mpsc::UnboundedSender<NewWaveEvent>>>,
    clock: Cell<u64>,
    nonce: Cell<u64>,
    mode: Cell<MiningMode>,
    sender: RefCell<Option<WalletAddress>>,
    reads_unavailable: Cell<bool>,
    fail_next_submit: RefCell<Option<ProviderError>>,
    revert_next: Cell<bool>,
    read_calls: Cell<usize>,
    submit_calls: Cell<usize>,
    last_gas_limit: Cell<Option<u64>>,
}

/// Simulated Wave Portal contract. Clones share the same chain.
#[derive(Clone)]
pub struct InMemoryLedger {
    state: Rc<LedgerState>,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new(MiningMode::Instant)
    }
}

impl InMemoryLedger {
    pub fn new(mode: MiningMode) -> Self {
        Self {
            state: Rc::new(LedgerState {
                waves: RefCell::new(Vec::new()),
                queue: RefCell::new(VecDeque::new()),
                listeners: RefCell::new(Vec::new()),
                clock: Cell::new(GENESIS_TIMESTAMP),
                nonce: Cell::new(0),
                mode: Cell::new(mode),
                sender: RefCell::new(None),
                reads_unavailable: Cell::new(false),
                fail_next_submit: RefCell::new(None),
                revert_next: Cell::new(false),
                read_calls: Cell::new(0),
                submit_calls: Cell::new(0),
                last_gas_limit: Cell::new(None),
            }),
        }
    }

    /// Account that signs transactions submitted through `wave`.
    pub fn set_sender(&self, account: WalletAddress) {
        self.state.sender.replace(Some(account));
    }

    pub fn set_mode(&self, mode: MiningMode) {
        self.state.mode.set(mode);
    }

    pub fn set_reads_unavailable(&self, unavailable: bool) {
        self.state.reads_unavailable.set(unavailable);
    }

    pub fn fail_next_submit(&self, err: ProviderError) {
        self.state.fail_next_submit.replace(Some(err));
    }

    /// The next submitted transaction is mined but reverts.
    pub fn revert_next(&self) {
        self.state.revert_next.set(true);
    }

    /// Records a wave from another client and notifies listeners.
    pub fn external_wave(&self, from: WalletAddress, message: &str) {
        let record = WaveRecord {
            waver: from,
            timestamp: self.tick(),
            message: message.to_owned(),
        };
        self.include(record);
    }

    /// Seeds history without emitting events, as if mined before the session.
    pub fn seed(&self, records: Vec<WaveRecord>) {
        self.state.waves.borrow_mut().extend(records);
    }

    /// Includes every queued transaction in submission order.
    pub fn mine_pending(&self) -> usize {
        let mut mined = 0;
        loop {
            let next = self.state.queue.borrow_mut().pop_front();
            let Some(queued) = next else { break };
            mined += 1;
            if queued.revert {
                debug!(tx_hash = %queued.hash, "simulated transaction reverted");
                let _ = queued.done.send(Err(ProviderError::Reverted(queued.hash)));
                continue;
            }
            debug!(tx_hash = %queued.hash, "simulated transaction mined");
            self.include(queued.record);
            let _ = queued.done.send(Ok(()));
        }
        mined
    }

    /// Drops every queued transaction as if the network lost them; their
    /// `wait` fails.
    pub fn drop_pending(&self) -> usize {
        let dropped: Vec<QueuedWave> = self.state.queue.borrow_mut().drain(..).collect();
        dropped.len()
    }

    pub fn pending_count(&self) -> usize {
        self.state.queue.borrow().len()
    }

    pub fn total(&self) -> u64 {
        self.state.waves.borrow().len() as u64
    }

    pub fn read_calls(&self) -> usize {
        self.state.read_calls.get()
    }

    pub fn submit_calls(&self) -> usize {
        self.state.submit_calls.get()
    }

    /// Gas ceiling passed with the most recent `wave` call.
    pub fn last_gas_limit(&self) -> Option<u64> {
        self.state.last_gas_limit.get()
    }

    pub fn listener_count(&self) -> usize {
        let mut listeners = self.state.listeners.borrow_mut();
        listeners.retain(|tx| !tx.is_closed());
        listeners.len()
    }

    fn tick(&self) -> u64 {
        let now = self.state.clock.get();
        self.state.clock.set(now + 1);
        now
    }

    fn include(&self, record: WaveRecord) {
        let event = NewWaveEvent {
            from: record.waver.clone(),
            timestamp: record.timestamp,
            message: record.message.clone(),
        };
        self.state.waves.borrow_mut().push(record);
        self.state
            .listeners
            .borrow_mut()
            .retain(|tx| tx.unbounded_send(event.clone()).is_ok());
    }

    fn check_readable(&self) -> Result<(), ProviderError> {
        self.state.read_calls.set(self.state.read_calls.get() + 1);
        if self.state.reads_unavailable.get() {
            return Err(ProviderError::Transport("simulated ledger offline".to_owned()));
        }
        Ok(())
    }
}

struct InMemoryPendingWave {
    hash: TxHash,
    done: RefCell<Option<oneshot::Receiver<Result<(), ProviderError>>>>,
}

#[async_trait(?Send)]
impl PendingWave for InMemoryPendingWave {
    fn hash(&self) -> &TxHash {
        &self.hash
    }

    async fn wait(&self) -> Result<(), ProviderError> {
        let Some(done) = self.done.borrow_mut().take() else {
            return Ok(());
        };
        match done.await {
            Ok(outcome) => outcome,
            Err(_) => Err(ProviderError::Transport(format!(
                "transaction {} dropped before inclusion",
                self.hash
            ))),
        }
    }
}

#[async_trait(?Send)]
impl WaveLedger for InMemoryLedger {
    async fn get_total_waves(&self) -> Result<u64, ProviderError> {
        self.check_readable()?;
        Ok(self.total())
    }

    async fn get_all_waves(&self) -> Result<Vec<WaveRecord>, ProviderError> {
        self.check_readable()?;
        Ok(self.state.waves.borrow().clone())
    }

    async fn wave(&self, message: &str, gas_limit: u64) -> Result<Box<dyn PendingWave>, ProviderError> {
        self.state.submit_calls.set(self.state.submit_calls.get() + 1);
        self.state.last_gas_limit.set(Some(gas_limit));
        if let Some(err) = self.state.fail_next_submit.borrow_mut().take() {
            return Err(err);
        }
        let Some(sender) = self.state.sender.borrow().clone() else {
            return Err(ProviderError::rpc(-32000, "no sender account"));
        };

        let nonce = self.state.nonce.get() + 1;
        self.state.nonce.set(nonce);
        let hash = TxHash(format!("0x{nonce:064x}"));
        debug!(tx_hash = %hash, gas_limit, "simulated transaction submitted");

        let (done, receiver) = oneshot::channel();
        self.state.queue.borrow_mut().push_back(QueuedWave {
            hash: hash.clone(),
            record: WaveRecord {
                waver: sender,
                timestamp: self.tick(),
                message: message.to_owned(),
            },
            revert: self.state.revert_next.replace(false),
            done,
        });

        if self.state.mode.get() == MiningMode::Instant {
            self.mine_pending();
        }

        Ok(Box::new(InMemoryPendingWave {
            hash,
            done: RefCell::new(Some(receiver)),
        }))
    }
}

impl WaveEventSource for InMemoryLedger {
    fn new_wave_events(&self) -> Result<LocalBoxStream<'static, NewWaveEvent>, ProviderError> {
        let (tx, rx) = mpsc::unbounded();
        self.state.listeners.borrow_mut().push(tx);
        Ok(rx.boxed_local())
    }
}
