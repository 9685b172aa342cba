//! Wallet provider discovery and account access.

use crate::{
    WalletError,
    ledger::{Assessment, Confirmation, LedgerBackend, LedgerCall},
};
use alloy_network::ReceiptResponse;
use alloy_primitives::{Address, TxHash, U256};
use alloy_provider::{PendingTransactionBuilder, PendingTransactionError, Provider, RootProvider};
use async_trait::async_trait;
use atm_config::Config;
use std::{sync::Arc, time::Duration};
use url::Url;

/// Shared handle to a detected wallet provider.
pub type ProviderHandle = Arc<dyn WalletProvider>;

/// Account surface of an EIP-1193 wallet provider.
///
/// Both account methods return addresses in the provider's order; the first entry is the active
/// account.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Accounts the user already authorized (`eth_accounts`). Never prompts.
    async fn accounts(&self) -> Result<Vec<Address>, WalletError>;

    /// Asks the user for account access (`eth_requestAccounts`). May prompt.
    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError>;

    /// Channel to the ledger through this provider, `None` if the handle is unusable.
    fn ledger_backend(&self) -> Option<Arc<dyn LedgerBackend>>;
}

/// Returns the wallet provider configured for this client, if any.
///
/// A provider is present when `wallet_url` is set and is a valid URL. No request is sent.
pub fn detect_provider(config: &Config) -> Option<Eip1193Provider> {
    let url = config.wallet_url.as_deref()?;
    match url.parse::<Url>() {
        Ok(url) => Some(
            Eip1193Provider::new(url)
                .with_confirmations(config.confirmations)
                .with_timeout(config.confirmation_timeout()),
        ),
        Err(err) => {
            warn!(%err, url, "ignoring malformed wallet url");
            None
        }
    }
}

/// Wallet provider reached over JSON-RPC, e.g. a browser wallet bridge or a dev node with
/// unlocked accounts. Transactions are signed by the provider via `eth_sendTransaction`.
#[derive(Clone, Debug)]
pub struct Eip1193Provider {
    provider: RootProvider,
    confirmations: u64,
    timeout: Option<Duration>,
}

impl Eip1193Provider {
    pub fn new(url: Url) -> Self {
        Self { provider: RootProvider::new_http(url), confirmations: 1, timeout: None }
    }

    /// Sets the number of blocks a transaction needs before it counts as confirmed.
    pub fn with_confirmations(mut self, confirmations: u64) -> Self {
        self.confirmations = confirmations.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl WalletProvider for Eip1193Provider {
    async fn accounts(&self) -> Result<Vec<Address>, WalletError> {
        self.provider.get_accounts().await.map_err(WalletError::from_account_request)
    }

    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError> {
        self.provider
            .client()
            .request_noparams::<Vec<Address>>("eth_requestAccounts")
            .await
            .map_err(WalletError::from_account_request)
    }

    fn ledger_backend(&self) -> Option<Arc<dyn LedgerBackend>> {
        Some(Arc::new(self.clone()))
    }
}

#[async_trait]
impl LedgerBackend for Eip1193Provider {
    async fn read_balance(&self, contract: Address, from: Address) -> Result<U256, WalletError> {
        Assessment::new(contract, &self.provider)
            .getBalance()
            .from(from)
            .call()
            .await
            .map_err(|err| contract_error("getBalance", err))
    }

    async fn submit(
        &self,
        contract: Address,
        from: Address,
        call: LedgerCall,
    ) -> Result<TxHash, WalletError> {
        let ledger = Assessment::new(contract, &self.provider);
        let pending = match call {
            LedgerCall::Deposit(amount) => ledger.deposit(amount).from(from).send().await,
            LedgerCall::Withdraw(amount) => ledger.withdraw(amount).from(from).send().await,
        }
        .map_err(|err| contract_error(call.name(), err))?;
        Ok(*pending.tx_hash())
    }

    async fn confirm(&self, tx: TxHash) -> Result<Confirmation, WalletError> {
        let receipt = PendingTransactionBuilder::new(self.provider.clone(), tx)
            .with_required_confirmations(self.confirmations)
            .with_timeout(self.timeout)
            .get_receipt()
            .await
            .map_err(|err| match err {
                PendingTransactionError::TransportError(err) => {
                    WalletError::from_ledger_call("confirmation", err)
                }
                err => WalletError::Unavailable(err.to_string()),
            })?;

        if !receipt.status() {
            return Err(WalletError::Reverted { reason: None });
        }
        Ok(Confirmation { tx_hash: receipt.transaction_hash(), block_number: receipt.block_number() })
    }
}

fn contract_error(operation: &'static str, err: alloy_contract::Error) -> WalletError {
    if let Some(data) = err.as_revert_data() {
        return WalletError::Reverted { reason: crate::ledger::decode_revert(&data) };
    }
    match err {
        alloy_contract::Error::TransportError(err) => WalletError::from_ledger_call(operation, err),
        err => WalletError::Unavailable(err.to_string()),
    }
}
