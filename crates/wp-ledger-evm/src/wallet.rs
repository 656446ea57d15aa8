use async_trait::async_trait;
use serde_json::{Value, json};
use std::rc::Rc;
use tracing::debug;
use wp_api_types::WalletAddress;
use wp_ledger_client::{ProviderError, WalletProvider};

use crate::{Transport, expect_str};

/// `WalletProvider` speaking the EIP-1193 account methods.
pub struct Eip1193Wallet<T> {
    transport: Rc<T>,
}

impl<T> Eip1193Wallet<T> {
    pub fn new(transport: Rc<T>) -> Self {
        Self { transport }
    }
}

#[async_trait(?Send)]
impl<T: Transport> WalletProvider for Eip1193Wallet<T> {
    async fn request_accounts(&self, prompt: bool) -> Result<Vec<WalletAddress>, ProviderError> {
        let method = if prompt { "eth_requestAccounts" } else { "eth_accounts" };
        let result = self.transport.request(method, json!([])).await?;
        let items = match result {
            Value::Array(items) => items,
            other => {
                return Err(ProviderError::Decode(format!("{method}: expected array, got {other}")));
            }
        };

        let accounts = items
            .iter()
            .map(|item| expect_str(item, method).map(WalletAddress))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(method, count = accounts.len(), "accounts returned");
        Ok(accounts)
    }
}
