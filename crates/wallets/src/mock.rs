//! In-memory wallet provider and ledger for tests.

use crate::{
    WalletError, WalletProvider,
    ledger::{Assessment, Confirmation, LedgerBackend, LedgerCall, decode_revert},
};
use alloy_primitives::{Address, B256, TxHash, U256};
use alloy_sol_types::SolError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tokio::sync::Notify;

/// How the next ledger interaction should fail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MockFailure {
    /// The user declines to sign.
    Reject,
    /// The provider cannot be reached.
    Unavailable,
    /// The call reverts before inclusion with the given reason.
    Revert(Option<String>),
    /// The transaction is included but its receipt reports failure.
    RevertOnChain,
}

#[derive(Debug, Default)]
struct MockState {
    authorized: Vec<Address>,
    grantable: Vec<Address>,
    reject_connect: bool,
    invalid_handle: bool,
    balance: U256,
    block: u64,
    nonce: u64,
    next_submit_failure: Option<MockFailure>,
    fail_reads: bool,
    hold_confirmations: bool,
    hold_next_read: bool,
    held_reads: usize,
    pending: HashMap<TxHash, LedgerCall>,
    failing: HashSet<TxHash>,
    submitted: Vec<LedgerCall>,
    balance_reads: usize,
}

impl MockState {
    fn accept(&mut self, call: LedgerCall) -> TxHash {
        self.nonce += 1;
        let tx = B256::from(U256::from(self.nonce));
        self.submitted.push(call);
        self.pending.insert(tx, call);
        tx
    }
}

/// A wallet provider and ledger living in memory.
///
/// Transactions take effect when they are confirmed. Withdrawals above the balance revert with
/// `InsufficientBalance` like the deployed contract.
#[derive(Clone, Debug, Default)]
pub struct MockWallet {
    state: Arc<Mutex<MockState>>,
    release: Arc<Notify>,
    release_read: Arc<Notify>,
}

impl MockWallet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accounts returned by `eth_accounts` before any explicit request.
    pub fn with_authorized(self, accounts: Vec<Address>) -> Self {
        self.state.lock().authorized = accounts;
        self
    }

    /// Accounts the user grants on `eth_requestAccounts`.
    pub fn with_grantable(self, accounts: Vec<Address>) -> Self {
        self.state.lock().grantable = accounts;
        self
    }

    pub fn with_balance(self, balance: u64) -> Self {
        self.state.lock().balance = U256::from(balance);
        self
    }

    pub fn set_reject_connect(&self, reject: bool) {
        self.state.lock().reject_connect = reject;
    }

    pub fn set_invalid_handle(&self, invalid: bool) {
        self.state.lock().invalid_handle = invalid;
    }

    pub fn set_authorized(&self, accounts: Vec<Address>) {
        self.state.lock().authorized = accounts;
    }

    /// Makes the next submission fail as described.
    pub fn fail_next_submit(&self, failure: MockFailure) {
        self.state.lock().next_submit_failure = Some(failure);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.state.lock().fail_reads = fail;
    }

    /// Holds confirmations until [`release_one`](Self::release_one) is called.
    pub fn hold_confirmations(&self) {
        self.state.lock().hold_confirmations = true;
    }

    /// Lets one held confirmation complete.
    pub fn release_one(&self) {
        self.release.notify_one();
    }

    /// Makes the next balance read observe the ledger immediately but only return once
    /// [`release_read`](Self::release_read) is called.
    pub fn hold_next_read(&self) {
        self.state.lock().hold_next_read = true;
    }

    pub fn release_read(&self) {
        self.release_read.notify_one();
    }

    /// Number of reads that were held so far.
    pub fn held_reads(&self) -> usize {
        self.state.lock().held_reads
    }

    /// Overwrites the ledger balance, simulating activity from outside the session.
    pub fn set_balance(&self, balance: u64) {
        self.state.lock().balance = U256::from(balance);
    }

    pub fn balance(&self) -> U256 {
        self.state.lock().balance
    }

    /// Mutating calls that reached the ledger, in submission order.
    pub fn submitted(&self) -> Vec<LedgerCall> {
        self.state.lock().submitted.clone()
    }

    pub fn balance_reads(&self) -> usize {
        self.state.lock().balance_reads
    }

    /// Number of submitted transactions not yet confirmed.
    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }
}

#[async_trait]
impl WalletProvider for MockWallet {
    async fn accounts(&self) -> Result<Vec<Address>, WalletError> {
        Ok(self.state.lock().authorized.clone())
    }

    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError> {
        let mut state = self.state.lock();
        if state.reject_connect {
            return Err(WalletError::ConnectionRejected("User rejected the request.".into()));
        }
        state.authorized = state.grantable.clone();
        Ok(state.authorized.clone())
    }

    fn ledger_backend(&self) -> Option<Arc<dyn LedgerBackend>> {
        if self.state.lock().invalid_handle {
            return None;
        }
        Some(Arc::new(self.clone()))
    }
}

#[async_trait]
impl LedgerBackend for MockWallet {
    async fn read_balance(&self, _contract: Address, _from: Address) -> Result<U256, WalletError> {
        let (balance, hold) = {
            let mut state = self.state.lock();
            if state.fail_reads {
                return Err(WalletError::Unavailable("connection refused".into()));
            }
            state.balance_reads += 1;
            let hold = std::mem::take(&mut state.hold_next_read);
            if hold {
                state.held_reads += 1;
            }
            (state.balance, hold)
        };
        if hold {
            self.release_read.notified().await;
        }
        Ok(balance)
    }

    async fn submit(
        &self,
        _contract: Address,
        _from: Address,
        call: LedgerCall,
    ) -> Result<TxHash, WalletError> {
        let mut state = self.state.lock();
        match state.next_submit_failure.take() {
            Some(MockFailure::Reject) => {
                return Err(WalletError::Rejected {
                    operation: call.name(),
                    reason: "User denied transaction signature.".into(),
                });
            }
            Some(MockFailure::Unavailable) => {
                return Err(WalletError::Unavailable("connection refused".into()));
            }
            Some(MockFailure::Revert(reason)) => return Err(WalletError::Reverted { reason }),
            Some(MockFailure::RevertOnChain) => {
                let tx = state.accept(call);
                state.failing.insert(tx);
                return Ok(tx);
            }
            None => {}
        }

        if let LedgerCall::Withdraw(amount) = call
            && amount > state.balance
        {
            let data = Assessment::InsufficientBalance {
                balance: state.balance,
                withdrawAmount: amount,
            }
            .abi_encode();
            return Err(WalletError::Reverted { reason: decode_revert(&data) });
        }

        Ok(state.accept(call))
    }

    async fn confirm(&self, tx: TxHash) -> Result<Confirmation, WalletError> {
        let hold = self.state.lock().hold_confirmations;
        if hold {
            self.release.notified().await;
        }

        let mut state = self.state.lock();
        let call = state
            .pending
            .remove(&tx)
            .ok_or_else(|| WalletError::Unavailable(format!("unknown transaction {tx}")))?;
        state.block += 1;

        if state.failing.remove(&tx) {
            return Err(WalletError::Reverted { reason: None });
        }

        match call {
            LedgerCall::Deposit(amount) => state.balance += amount,
            LedgerCall::Withdraw(amount) => state.balance = state.balance.saturating_sub(amount),
        }
        Ok(Confirmation { tx_hash: tx, block_number: Some(state.block) })
    }
}
