//! Typed binding to the ledger contract.

use crate::{WalletError, WalletProvider};
use alloy_primitives::{Address, TxHash, U256};
use alloy_sol_types::{Revert, SolCall, SolError, SolInterface, sol};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

sol! {
    /// Single-owner ledger holding one balance.
    #[sol(rpc)]
    contract Assessment {
        event Deposit(uint256 amount);
        event Withdraw(uint256 amount);

        error InsufficientBalance(uint256 balance, uint256 withdrawAmount);

        function getBalance() public view returns (uint256);
        function deposit(uint256 amount) public payable;
        function withdraw(uint256 withdrawAmount) public;
    }
}

/// A mutating ledger operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerCall {
    Deposit(U256),
    Withdraw(U256),
}

impl LedgerCall {
    /// Name of the contract function invoked by this call.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Deposit(_) => "deposit",
            Self::Withdraw(_) => "withdraw",
        }
    }

    pub fn amount(&self) -> U256 {
        match self {
            Self::Deposit(amount) | Self::Withdraw(amount) => *amount,
        }
    }

    /// ABI-encoded calldata for this call.
    pub fn abi_encode(&self) -> Vec<u8> {
        match *self {
            Self::Deposit(amount) => Assessment::depositCall { amount }.abi_encode(),
            Self::Withdraw(withdrawAmount) => Assessment::withdrawCall { withdrawAmount }.abi_encode(),
        }
    }
}

/// Inclusion of a transaction as reported by the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
}

/// The contract surface of a wallet provider's RPC channel.
#[async_trait]
pub trait LedgerBackend: Send + Sync {
    /// Reads `getBalance()` on `contract` as `from`.
    async fn read_balance(&self, contract: Address, from: Address) -> Result<U256, WalletError>;

    /// Sends `call` to `contract`, signed by `from`. Returns once the transaction was accepted
    /// by the provider, not once it is confirmed.
    async fn submit(
        &self,
        contract: Address,
        from: Address,
        call: LedgerCall,
    ) -> Result<TxHash, WalletError>;

    /// Waits until `tx` is final, failing if it was included but reverted.
    async fn confirm(&self, tx: TxHash) -> Result<Confirmation, WalletError>;
}

/// Handle coupling the ledger contract to one signing account.
///
/// The signer is fixed at construction; a binding must be rebuilt through [`bind`] whenever the
/// active account changes.
#[derive(Clone)]
pub struct LedgerBinding {
    contract: Address,
    signer: Address,
    backend: Arc<dyn LedgerBackend>,
}

impl fmt::Debug for LedgerBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerBinding")
            .field("contract", &self.contract)
            .field("signer", &self.signer)
            .finish_non_exhaustive()
    }
}

/// Binds the ledger at `contract` to `signer` through `provider`.
///
/// Performs no I/O. Fails only if the provider cannot hand out a ledger channel.
pub fn bind(
    provider: &dyn WalletProvider,
    contract: Address,
    signer: Address,
) -> Result<LedgerBinding, WalletError> {
    let backend = provider.ledger_backend().ok_or(WalletError::InvalidHandle)?;
    trace!(%contract, %signer, "bound ledger");
    Ok(LedgerBinding { contract, signer, backend })
}

impl LedgerBinding {
    pub fn contract(&self) -> Address {
        self.contract
    }

    pub fn signer(&self) -> Address {
        self.signer
    }

    pub async fn get_balance(&self) -> Result<U256, WalletError> {
        self.backend.read_balance(self.contract, self.signer).await
    }

    pub async fn deposit(&self, amount: U256) -> Result<TxHash, WalletError> {
        self.send(LedgerCall::Deposit(amount)).await
    }

    pub async fn withdraw(&self, amount: U256) -> Result<TxHash, WalletError> {
        self.send(LedgerCall::Withdraw(amount)).await
    }

    /// Sends a mutating call and returns the transaction handle.
    pub async fn send(&self, call: LedgerCall) -> Result<TxHash, WalletError> {
        let tx = self.backend.submit(self.contract, self.signer, call).await?;
        debug!(%tx, call = call.name(), amount = %call.amount(), "submitted ledger call");
        Ok(tx)
    }

    /// Waits for the transaction to be confirmed.
    pub async fn wait(&self, tx: TxHash) -> Result<Confirmation, WalletError> {
        self.backend.confirm(tx).await
    }
}

/// Decodes revert data returned by the ledger into a readable reason.
pub fn decode_revert(data: &[u8]) -> Option<String> {
    if let Ok(Assessment::AssessmentErrors::InsufficientBalance(err)) =
        Assessment::AssessmentErrors::abi_decode(data)
    {
        return Some(format!(
            "insufficient balance: {} available, {} requested",
            err.balance, err.withdrawAmount
        ));
    }
    if let Ok(revert) = Revert::abi_decode(data) {
        return Some(revert.reason);
    }
    alloy_sol_types::decode_revert_reason(data).filter(|reason| !reason.is_empty())
}
