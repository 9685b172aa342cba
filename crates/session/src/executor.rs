//! Submission and confirmation of ledger transactions.

use crate::{Amount, BalanceOracle, History, Result, SessionError, TransactionRecord};
use alloy_primitives::{TxHash, U256};
use atm_wallets::{LedgerBinding, LedgerCall};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Withdraw,
}

impl TransactionKind {
    pub fn past_tense(&self) -> &'static str {
        match self {
            Self::Deposit => "Deposited",
            Self::Withdraw => "Withdrawn",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Deposit => "deposit",
            Self::Withdraw => "withdraw",
        })
    }
}

/// A validated mutating request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransactionRequest {
    pub kind: TransactionKind,
    pub amount: Amount,
}

impl TransactionRequest {
    pub fn deposit(amount: Amount) -> Self {
        Self { kind: TransactionKind::Deposit, amount }
    }

    pub fn withdraw(amount: Amount) -> Self {
        Self { kind: TransactionKind::Withdraw, amount }
    }

    fn call(&self) -> LedgerCall {
        match self.kind {
            TransactionKind::Deposit => LedgerCall::Deposit(self.amount.get()),
            TransactionKind::Withdraw => LedgerCall::Withdraw(self.amount.get()),
        }
    }
}

/// Outcome of a confirmed transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TransactionReceipt {
    pub kind: TransactionKind,
    pub amount: U256,
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
    /// Balance read after confirmation, `None` if that read failed.
    pub balance: Option<U256>,
    /// Why the balance could not be read after confirmation.
    pub balance_error: Option<String>,
}

/// Runs one mutating transaction at a time.
#[derive(Debug, Default)]
pub struct Executor {
    in_flight: Arc<AtomicBool>,
    unit: Option<String>,
}

/// Releases the in-flight flag on drop.
#[derive(Debug)]
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Executor {
    pub fn new(unit: Option<String>) -> Self {
        Self { in_flight: Arc::default(), unit }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn begin(&self) -> Result<InFlightGuard> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SessionError::TransactionInFlight)?;
        Ok(InFlightGuard(self.in_flight.clone()))
    }

    /// Submits `request`, waits for its confirmation, then refreshes the balance and records it.
    ///
    /// `generation` is the oracle generation `binding` belongs to. On failure neither the
    /// balance nor the history is touched.
    ///
    /// Once the provider accepted the transaction, confirmation continues on a spawned task that
    /// keeps the executor busy until the transaction settles, even if the returned future is
    /// dropped. Must be called within a Tokio runtime.
    pub(crate) async fn execute(
        &self,
        binding: LedgerBinding,
        request: TransactionRequest,
        oracle: Arc<BalanceOracle>,
        generation: u64,
        history: Arc<Mutex<History>>,
    ) -> Result<TransactionReceipt> {
        let guard = self.begin()?;

        let tx_hash = binding.send(request.call()).await.inspect_err(|err| {
            warn!(%err, kind = %request.kind, amount = %request.amount, "transaction not submitted");
        })?;

        let unit = self.unit.clone();
        let task = tokio::spawn(async move {
            let _guard = guard;
            Settlement { binding: &binding, oracle: &oracle, generation, history: &history }
                .run(request, tx_hash, unit.as_deref())
                .await
        });
        task.await.map_err(|err| {
            SessionError::LedgerUnavailable(format!("confirmation of {tx_hash} was aborted: {err}"))
        })?
    }
}

/// Everything needed to see a submitted transaction through.
struct Settlement<'a> {
    binding: &'a LedgerBinding,
    oracle: &'a BalanceOracle,
    generation: u64,
    history: &'a Mutex<History>,
}

impl Settlement<'_> {
    async fn run(
        self,
        request: TransactionRequest,
        tx_hash: TxHash,
        unit: Option<&str>,
    ) -> Result<TransactionReceipt> {
        let confirmation = self.binding.wait(tx_hash).await.inspect_err(|err| {
            warn!(%err, tx = %tx_hash, kind = %request.kind, "transaction failed");
        })?;
        info!(
            tx = %confirmation.tx_hash,
            block = ?confirmation.block_number,
            kind = %request.kind,
            amount = %request.amount,
            "transaction confirmed"
        );

        let (balance, balance_error) =
            match self.oracle.refresh_at(self.binding, self.generation).await {
                Ok(balance) => (Some(balance), None),
                Err(err) => (None, Some(err.to_string())),
            };

        let record =
            TransactionRecord::new(request.kind, request.amount.get(), confirmation.tx_hash, unit);
        if let Some(evicted) = self.history.lock().push(record) {
            trace!(tx = %evicted.tx_hash, "evicted oldest history record");
        }

        Ok(TransactionReceipt {
            kind: request.kind,
            amount: request.amount.get(),
            tx_hash: confirmation.tx_hash,
            block_number: confirmation.block_number,
            balance,
            balance_error,
        })
    }
}
