//! # atm-session
//!
//! PIN-gated deposit and withdraw session over a ledger contract reached through a user's
//! wallet.
//!
//! A [`Session`] walks through `ProviderAbsent -> Disconnected -> Connected -> PinPending ->
//! Ready`. Mutating operations are only accepted in `Ready`, one at a time, and every confirmed
//! transaction refreshes the balance and appends a [`TransactionRecord`].

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

#[macro_use]
extern crate tracing;

mod amount;
pub use amount::Amount;

mod balance;
pub use balance::{BalanceOracle, BalanceState};

mod error;
pub use error::{Result, SessionError};

mod executor;
pub use executor::{Executor, TransactionKind, TransactionReceipt, TransactionRequest};

mod history;
pub use history::{History, TransactionRecord};

mod pin;
pub use pin::{GatePhase, PinGate, PinPolicy};

mod session;
pub use session::{Session, SessionState, SessionView};

pub use atm_config::Config;
