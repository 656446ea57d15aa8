use std::rc::Rc;
use tracing::{info, warn};
use wp_api_types::{Account, WalletAddress};
use wp_ledger_client::{SyncError, WalletProvider};

use crate::store::ViewStore;

/// Reads and requests the wallet's active account.
///
/// State only changes in response to these two calls; account switches
/// made inside the wallet mid-session are not observed.
pub struct ConnectionManager {
    store: Rc<ViewStore>,
    wallet: Option<Rc<dyn WalletProvider>>,
}

impl ConnectionManager {
    pub fn new(store: Rc<ViewStore>, wallet: Option<Rc<dyn WalletProvider>>) -> Self {
        Self { store, wallet }
    }

    pub fn has_provider(&self) -> bool {
        self.wallet.is_some()
    }

    /// Looks up an already-authorized account without prompting.
    pub async fn check_existing_connection(&self) -> Account {
        let Some(wallet) = &self.wallet else {
            warn!("no wallet provider detected");
            return None;
        };

        let accounts = match wallet.request_accounts(false).await {
            Ok(accounts) => accounts,
            Err(err) => {
                warn!(error = %err, "eth_accounts failed");
                return None;
            }
        };

        match accounts.into_iter().next() {
            Some(account) => {
                info!(account = %account, "found an authorized account");
                self.store.set_account(account.clone());
                Some(account)
            }
            None => {
                info!("no authorized account found");
                None
            }
        }
    }

    /// Prompts the wallet for authorization.
    pub async fn request_connection(&self) -> Result<WalletAddress, SyncError> {
        let Some(wallet) = &self.wallet else {
            warn!("connect requested without a wallet provider");
            return Err(SyncError::ProviderMissing);
        };

        let accounts = wallet.request_accounts(true).await.map_err(|err| {
            let err = SyncError::from_connection(err);
            warn!(error = %err, "wallet authorization failed");
            err
        })?;

        let Some(account) = accounts.into_iter().next() else {
            warn!("wallet authorized no accounts");
            return Err(SyncError::UserRejected);
        };

        info!(account = %account, "connected");
        self.store.set_account(account.clone());
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use wp_ledger_memory::InMemoryWallet;

    fn addr(raw: &str) -> WalletAddress {
        WalletAddress::new(raw)
    }

    #[tokio::test]
    async fn missing_provider_returns_absent_without_error() {
        let store = ViewStore::new();
        let manager = ConnectionManager::new(store.clone(), None);

        assert_eq!(manager.check_existing_connection().await, None);
        assert_eq!(store.account(), None);
    }

    #[tokio::test]
    async fn existing_authorization_sets_first_account() {
        let store = ViewStore::new();
        let wallet = Rc::new(InMemoryWallet::default());
        wallet.set_authorized(vec![addr("0x111"), addr("0x222")]);
        let manager = ConnectionManager::new(store.clone(), Some(wallet.clone()));

        assert_eq!(manager.check_existing_connection().await, Some(addr("0x111")));
        assert_eq!(store.account(), Some(addr("0x111")));
        assert_eq!(wallet.prompt_calls(), 0);
    }

    #[tokio::test]
    async fn repeated_checks_mutate_account_once() {
        let store = ViewStore::new();
        let changes = Rc::new(Cell::new(0));
        let counter = changes.clone();
        store.observe(move |_| counter.set(counter.get() + 1));

        let wallet = Rc::new(InMemoryWallet::authorized(addr("0xABC")));
        let manager = ConnectionManager::new(store.clone(), Some(wallet));
        for _ in 0..3 {
            manager.check_existing_connection().await;
        }

        assert_eq!(changes.get(), 1);
    }

    #[tokio::test]
    async fn approved_prompt_sets_account() -> anyhow::Result<()> {
        let store = ViewStore::new();
        let wallet = Rc::new(InMemoryWallet::approving(addr("0xABC")));
        let manager = ConnectionManager::new(store.clone(), Some(wallet));

        assert_eq!(manager.check_existing_connection().await, None);
        assert_eq!(manager.request_connection().await?, addr("0xABC"));
        assert_eq!(store.account(), Some(addr("0xABC")));
        Ok(())
    }

    #[tokio::test]
    async fn connect_without_wallet_is_provider_missing() {
        let store = ViewStore::new();
        let manager = ConnectionManager::new(store, None);

        let err = manager.request_connection().await.unwrap_err();
        assert_eq!(err, SyncError::ProviderMissing);
        assert!(err.is_user_facing());
    }

    #[tokio::test]
    async fn dismissed_prompt_leaves_state_unchanged() {
        let store = ViewStore::new();
        let wallet = Rc::new(InMemoryWallet::approving(addr("0xABC")));
        wallet.reject_prompts(true);
        let manager = ConnectionManager::new(store.clone(), Some(wallet));

        assert_eq!(manager.request_connection().await, Err(SyncError::UserRejected));
        assert_eq!(store.account(), None);
    }
}
