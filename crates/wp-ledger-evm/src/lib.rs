//! Wave Portal binding over an EIP-1193 / Ethereum JSON-RPC endpoint.
//!
//! The same contract code runs against a node over HTTP (native) or the
//! wallet injected into a browser page (wasm32); only the `Transport`
//! differs.

pub mod abi;
mod contract;
#[cfg(not(target_arch = "wasm32"))]
mod http;
mod wallet;

use async_trait::async_trait;
use serde_json::Value;
use wp_ledger_client::{ProviderError, Timer};

pub use contract::{DEFAULT_POLL_INTERVAL, EvmPendingWave, WavePortalContract};
#[cfg(not(target_arch = "wasm32"))]
pub use http::HttpTransport;
pub use wallet::Eip1193Wallet;

/// A JSON-RPC request channel plus the timer its polling loops sleep on.
#[async_trait(?Send)]
pub trait Transport: Timer {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError>;

    /// Sends a request nobody awaits; used for cleanup from `Drop`.
    /// Failures are only logged.
    fn notify(&self, method: &'static str, params: Value);
}

pub(crate) fn expect_str(value: &Value, what: &str) -> Result<String, ProviderError> {
    value
        .as_str()
        .map(ToOwned::to_owned)
        .ok_or_else(|| ProviderError::Decode(format!("{what}: expected string, got {value}")))
}
