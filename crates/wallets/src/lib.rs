//! # atm-wallets
//!
//! Access to an injected wallet provider and the ledger contract behind it.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

#[macro_use]
extern crate tracing;

mod error;
pub use error::{UNAUTHORIZED, USER_REJECTED_REQUEST, WalletError};

pub mod ledger;
pub use ledger::{Assessment, Confirmation, LedgerBackend, LedgerBinding, LedgerCall, bind};

mod provider;
pub use provider::{Eip1193Provider, ProviderHandle, WalletProvider, detect_provider};

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
