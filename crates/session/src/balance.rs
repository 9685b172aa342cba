use crate::Result;
use alloy_primitives::U256;
use atm_wallets::LedgerBinding;
use parking_lot::Mutex;
use serde::Serialize;

/// Last known ledger balance of the bound account.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum BalanceState {
    /// No read has succeeded for the current binding.
    #[default]
    NeverRead,
    /// The latest read succeeded.
    Fresh(U256),
    /// The latest read failed; holds the last value that was read successfully.
    Stale(U256),
}

impl BalanceState {
    pub fn value(&self) -> Option<U256> {
        match *self {
            Self::NeverRead => None,
            Self::Fresh(value) | Self::Stale(value) => Some(value),
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh(_))
    }
}

#[derive(Debug, Default)]
struct OracleState {
    balance: BalanceState,
    generation: u64,
    /// Ticket of the most recently issued read.
    issued: u64,
    /// Ticket of the read whose outcome `balance` reflects.
    settled: u64,
    last_error: Option<String>,
}

/// Read-only view of the ledger balance.
///
/// Every binding change starts a new generation; reads started under an older generation are
/// returned to their caller but never stored. Within a generation each read takes a ticket when
/// it is issued, and an outcome is only stored if no later-issued read has settled first.
#[derive(Debug, Default)]
pub struct BalanceOracle {
    state: Mutex<OracleState>,
}

impl BalanceOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> BalanceState {
        self.state.lock().balance
    }

    /// Why the latest read of the current binding failed, cleared by the next successful read.
    pub fn last_error(&self) -> Option<String> {
        self.state.lock().last_error.clone()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Forgets the balance and starts a new generation.
    pub(crate) fn reset(&self) -> u64 {
        let mut state = self.state.lock();
        state.generation += 1;
        state.balance = BalanceState::NeverRead;
        state.last_error = None;
        state.generation
    }

    /// Reads the balance through `binding` and stores it for the current generation.
    pub async fn refresh(&self, binding: &LedgerBinding) -> Result<U256> {
        let generation = self.generation();
        self.refresh_at(binding, generation).await
    }

    /// Reads the balance through `binding`, storing the outcome only if `generation` is still
    /// current and no read issued after this one has settled.
    ///
    /// A superseded successful read returns the newer stored value instead of its own.
    pub(crate) async fn refresh_at(&self, binding: &LedgerBinding, generation: u64) -> Result<U256> {
        let ticket = {
            let mut state = self.state.lock();
            state.issued += 1;
            state.issued
        };
        let read = binding.get_balance().await;

        let mut state = self.state.lock();
        let current = state.generation == generation;
        let latest = current && ticket > state.settled;
        match read {
            Ok(value) if latest => {
                state.settled = ticket;
                state.balance = BalanceState::Fresh(value);
                state.last_error = None;
                trace!(%value, account = %binding.signer(), "balance refreshed");
                Ok(value)
            }
            Ok(value) => {
                if current && let Some(newer) = state.balance.value() {
                    debug!(account = %binding.signer(), "discarding superseded balance read");
                    return Ok(newer);
                }
                debug!(account = %binding.signer(), "discarding balance of a previous binding");
                Ok(value)
            }
            Err(err) => {
                if latest {
                    state.settled = ticket;
                    if let BalanceState::Fresh(value) = state.balance {
                        state.balance = BalanceState::Stale(value);
                    }
                    state.last_error = Some(err.to_string());
                }
                warn!(%err, account = %binding.signer(), "failed to read balance");
                Err(err.into())
            }
        }
    }
}
