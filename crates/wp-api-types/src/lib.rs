use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest message the Wave Portal contract accepts, in characters.
pub const MAX_MESSAGE_LEN: usize = 100;

/// Gas ceiling attached to every `wave()` transaction.
pub const DEFAULT_GAS_LIMIT: u64 = 300_000;

#[derive(Debug, Clone, Serialize, Deserialize, Eq)]
pub struct WalletAddress(pub String);

impl WalletAddress {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Checksummed and lowercase hex spell the same account.
impl PartialEq for WalletAddress {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub type Account = Option<WalletAddress>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TxHash(pub String);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A wave as the contract stores it: timestamp in integer seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WaveRecord {
    pub waver: WalletAddress,
    pub timestamp: u64,
    pub message: String,
}

/// Payload of the contract's `NewWave(from, timestamp, message)` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewWaveEvent {
    pub from: WalletAddress,
    pub timestamp: u64,
    pub message: String,
}

/// A wave in display form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Wave {
    pub address: WalletAddress,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl Wave {
    pub fn new(address: WalletAddress, timestamp_secs: u64, message: String) -> Self {
        Self {
            address,
            timestamp: instant_from_secs(timestamp_secs),
            message,
        }
    }
}

impl From<WaveRecord> for Wave {
    fn from(record: WaveRecord) -> Self {
        Wave::new(record.waver, record.timestamp, record.message)
    }
}

impl From<NewWaveEvent> for Wave {
    fn from(event: NewWaveEvent) -> Self {
        Wave::new(event.from, event.timestamp, event.message)
    }
}

/// Converts ledger seconds to an instant; values chrono cannot represent
/// fall back to the Unix epoch so one bad row never sinks a whole read.
pub fn instant_from_secs(secs: u64) -> DateTime<Utc> {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Observable state handed to renderers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ViewSnapshot {
    pub account: Account,
    pub waves: Vec<Wave>,
    pub wave_count: u64,
    pub busy: bool,
}
