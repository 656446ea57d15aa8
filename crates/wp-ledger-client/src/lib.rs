use async_trait::async_trait;
use futures::future::LocalBoxFuture;
use futures::stream::LocalBoxStream;
use std::time::Duration;
use thiserror::Error;
use wp_api_types::{NewWaveEvent, TxHash, WalletAddress, WaveRecord};

/// EIP-1193 error code for a request the user dismissed in the wallet.
pub const USER_REJECTED_CODE: i64 = 4001;

/// Failures reported by a wallet provider or ledger binding.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("no wallet provider is installed")]
    Missing,

    #[error("request rejected by the user")]
    UserRejected,

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("transaction {0} reverted")]
    Reverted(TxHash),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

impl ProviderError {
    pub fn rpc(code: i64, message: impl Into<String>) -> Self {
        if code == USER_REJECTED_CODE {
            ProviderError::UserRejected
        } else {
            ProviderError::Rpc {
                code,
                message: message.into(),
            }
        }
    }
}

/// Outcomes the sync engine distinguishes at its operation boundaries.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("no wallet detected; install a wallet extension to continue")]
    ProviderMissing,

    #[error("wallet authorization was rejected")]
    UserRejected,

    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    #[error("message cannot be empty")]
    EmptyMessage,

    #[error("message is {len} characters; the limit is {max}")]
    MessageTooLong { len: usize, max: usize },
}

impl SyncError {
    /// Whether the failure should be shown to the user rather than only logged.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            SyncError::ProviderMissing | SyncError::EmptyMessage | SyncError::MessageTooLong { .. }
        )
    }

    /// Classifies a provider failure raised while authorizing accounts.
    pub fn from_connection(err: ProviderError) -> Self {
        match err {
            ProviderError::Missing => SyncError::ProviderMissing,
            ProviderError::UserRejected => SyncError::UserRejected,
            other => SyncError::LedgerUnavailable(other.to_string()),
        }
    }

    /// Classifies a provider failure raised by a point read.
    pub fn from_read(err: ProviderError) -> Self {
        SyncError::LedgerUnavailable(err.to_string())
    }

    /// Classifies a provider failure raised while submitting or confirming.
    pub fn from_write(err: ProviderError) -> Self {
        match err {
            ProviderError::Missing => SyncError::LedgerUnavailable(err.to_string()),
            other => SyncError::TransactionFailed(other.to_string()),
        }
    }
}

/// Suspends for a duration on whatever executor hosts the engine.
pub trait Timer {
    fn delay(&self, duration: Duration) -> LocalBoxFuture<'static, ()>;
}

#[async_trait(?Send)]
pub trait WalletProvider {
    /// `eth_requestAccounts` when `prompt` is set, `eth_accounts` otherwise.
    async fn request_accounts(&self, prompt: bool) -> Result<Vec<WalletAddress>, ProviderError>;
}

/// A submitted `wave()` transaction awaiting inclusion.
#[async_trait(?Send)]
pub trait PendingWave {
    fn hash(&self) -> &TxHash;

    /// Resolves once the transaction is mined. No deadline is applied here.
    async fn wait(&self) -> Result<(), ProviderError>;
}

#[async_trait(?Send)]
pub trait WaveLedger {
    async fn get_total_waves(&self) -> Result<u64, ProviderError>;
    async fn get_all_waves(&self) -> Result<Vec<WaveRecord>, ProviderError>;
    async fn wave(&self, message: &str, gas_limit: u64) -> Result<Box<dyn PendingWave>, ProviderError>;
}

pub trait WaveEventSource {
    /// Stream of `NewWave` notifications from the moment of the call onward.
    fn new_wave_events(&self) -> Result<LocalBoxStream<'static, NewWaveEvent>, ProviderError>;
}
