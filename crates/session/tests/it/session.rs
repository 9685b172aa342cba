//! End to end session flows against the in-memory wallet.

use crate::init_tracing;
use alloy_primitives::{Address, U256, address};
use atm_session::{
    Amount, BalanceState, Config, Session, SessionError, SessionState, TransactionKind,
    TransactionRequest,
};
use atm_wallets::mock::{MockFailure, MockWallet};
use std::{sync::Arc, time::Duration};

const ALICE: Address = address!("0x0000000000000000000000000000000000000abc");
const BOB: Address = address!("0x0000000000000000000000000000000000000b0b");

fn session_with(config: &Config, wallet: &MockWallet) -> Session {
    Session::new(config, Some(Arc::new(wallet.clone())))
}

/// A session connected as `ALICE` with the PIN set.
async fn ready(config: &Config, wallet: MockWallet) -> (Session, MockWallet) {
    let wallet = wallet.with_grantable(vec![ALICE]);
    let session = session_with(config, &wallet);
    session.connect().await.unwrap();
    session.set_pin("1234").unwrap();
    session.confirm_pin("1234").await.unwrap();
    assert_eq!(session.state(), SessionState::Ready);
    (session, wallet)
}

#[tokio::test]
async fn provider_to_first_deposit() {
    init_tracing();
    let config = Config::default();

    let session = Session::new(&config, None);
    assert_eq!(session.init().await.unwrap(), SessionState::ProviderAbsent);
    assert!(matches!(session.connect().await, Err(SessionError::ProviderAbsent)));

    let wallet = MockWallet::new().with_grantable(vec![ALICE]);
    let state = session.attach_provider(Arc::new(wallet.clone())).await.unwrap();
    assert_eq!(state, SessionState::Disconnected);

    assert_eq!(session.connect().await.unwrap(), ALICE);
    assert_eq!(session.state(), SessionState::Connected);
    assert_eq!(session.account(), Some(ALICE));
    assert_eq!(session.balance(), BalanceState::NeverRead);

    session.set_pin("1234").unwrap();
    assert_eq!(session.state(), SessionState::PinPending);
    session.confirm_pin("1234").await.unwrap();
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.balance(), BalanceState::Fresh(U256::ZERO));

    let receipt = session.deposit("5").await.unwrap();
    assert_eq!(receipt.kind, TransactionKind::Deposit);
    assert_eq!(receipt.amount, U256::from(5));
    assert_eq!(receipt.balance, Some(U256::from(5)));
    assert_eq!(session.balance(), BalanceState::Fresh(U256::from(5)));

    let history = session.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].description, "Deposited 5");
    assert_eq!(history[0].tx_hash, receipt.tx_hash);
}

#[tokio::test]
async fn pin_mismatch_blocks_deposits() {
    init_tracing();
    let wallet = MockWallet::new().with_grantable(vec![ALICE]).with_balance(10);
    let session = session_with(&Config::default(), &wallet);
    session.connect().await.unwrap();

    session.set_pin("1234").unwrap();
    assert!(matches!(session.confirm_pin("5678").await, Err(SessionError::PinMismatch)));
    assert!(!session.is_pin_set());

    assert!(matches!(session.deposit("5").await, Err(SessionError::NotAuthorized)));
    let request = TransactionRequest::withdraw(Amount::try_from(1u64).unwrap());
    assert!(matches!(session.submit(request).await, Err(SessionError::NotAuthorized)));
    assert!(matches!(session.refresh_balance().await, Err(SessionError::NotAuthorized)));

    assert!(wallet.submitted().is_empty());
    assert_eq!(wallet.balance_reads(), 0);
    assert_eq!(session.balance(), BalanceState::NeverRead);
    assert!(session.history().is_empty());
}

#[tokio::test]
async fn authorization_is_checked_before_input() {
    let wallet = MockWallet::new().with_grantable(vec![ALICE]);
    let session = session_with(&Config::default(), &wallet);
    session.connect().await.unwrap();

    assert!(matches!(session.deposit("abc").await, Err(SessionError::NotAuthorized)));

    session.set_pin("1234").unwrap();
    session.confirm_pin("1234").await.unwrap();
    for input in ["", "abc", "0", "-1", "1.5"] {
        assert!(matches!(session.deposit(input).await, Err(SessionError::InvalidAmount(_))));
    }
    assert!(wallet.submitted().is_empty());
}

#[tokio::test]
async fn concurrent_submission_is_rejected() {
    init_tracing();
    let (session, wallet) = ready(&Config::default(), MockWallet::new().with_balance(2)).await;
    wallet.hold_confirmations();

    let first = session.deposit("5");
    let second = async {
        while wallet.pending() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(session.view().in_flight);
        let err = session.withdraw("1").await.unwrap_err();
        wallet.release_one();
        err
    };
    let (first, second) = tokio::join!(first, second);

    assert!(matches!(second, SessionError::TransactionInFlight));
    assert_eq!(first.unwrap().balance, Some(U256::from(7)));
    assert_eq!(wallet.submitted().len(), 1);
    assert_eq!(session.history().len(), 1);
    assert!(!session.view().in_flight);

    // the flag is released once the first transaction settles
    wallet.release_one();
    session.withdraw("1").await.unwrap();
    assert_eq!(session.balance(), BalanceState::Fresh(U256::from(6)));
}

#[tokio::test]
async fn failed_submissions_change_nothing() {
    let (session, wallet) = ready(&Config::default(), MockWallet::new().with_balance(3)).await;

    wallet.fail_next_submit(MockFailure::Reject);
    assert!(matches!(
        session.deposit("1").await,
        Err(SessionError::Rejected { operation: "deposit", .. })
    ));

    wallet.fail_next_submit(MockFailure::Unavailable);
    assert!(matches!(session.deposit("1").await, Err(SessionError::LedgerUnavailable(_))));

    wallet.fail_next_submit(MockFailure::Revert(Some("You are not the owner of this account".into())));
    let err = session.withdraw("1").await.unwrap_err();
    assert_eq!(err.to_string(), "transaction reverted: You are not the owner of this account");

    wallet.fail_next_submit(MockFailure::RevertOnChain);
    assert!(matches!(session.deposit("1").await, Err(SessionError::Reverted { reason: None })));

    let err = session.withdraw("4").await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "transaction reverted: insufficient balance: 3 available, 4 requested"
    );

    assert_eq!(session.balance(), BalanceState::Fresh(U256::from(3)));
    assert_eq!(wallet.balance(), U256::from(3));
    assert!(session.history().is_empty());
    assert!(!session.view().in_flight);
}

#[tokio::test]
async fn balance_tracks_every_confirmation() {
    let (session, wallet) = ready(&Config::default(), MockWallet::new().with_balance(10)).await;

    session.deposit("5").await.unwrap();
    assert_eq!(session.balance().value(), Some(wallet.balance()));
    session.withdraw("12").await.unwrap();
    assert_eq!(session.balance(), BalanceState::Fresh(U256::from(3)));

    // activity outside the session shows up on the next explicit refresh
    wallet.set_balance(100);
    assert_eq!(session.refresh_balance().await.unwrap(), U256::from(100));
    assert_eq!(session.balance(), BalanceState::Fresh(U256::from(100)));

    let descriptions: Vec<_> = session.history().into_iter().map(|r| r.description).collect();
    assert_eq!(descriptions, ["Deposited 5", "Withdrawn 12"]);
}

#[tokio::test]
async fn failed_refresh_after_confirmation_marks_balance_stale() {
    let (session, wallet) = ready(&Config::default(), MockWallet::new().with_balance(4)).await;
    wallet.set_fail_reads(true);

    let receipt = session.deposit("1").await.unwrap();
    assert_eq!(receipt.balance, None);
    assert_eq!(receipt.balance_error.as_deref(), Some("ledger unavailable: connection refused"));
    assert_eq!(session.balance(), BalanceState::Stale(U256::from(4)));
    assert_eq!(wallet.balance(), U256::from(5));
    assert_eq!(session.history().len(), 1);

    assert!(matches!(session.refresh_balance().await, Err(SessionError::LedgerUnavailable(_))));
    wallet.set_fail_reads(false);
    session.refresh_balance().await.unwrap();
    assert_eq!(session.balance(), BalanceState::Fresh(U256::from(5)));
}

#[tokio::test]
async fn passive_recovery_and_account_switch() {
    init_tracing();
    let wallet = MockWallet::new().with_authorized(vec![ALICE]).with_balance(9);
    let session = session_with(&Config::default(), &wallet);

    assert_eq!(session.init().await.unwrap(), SessionState::Connected);
    assert_eq!(session.account(), Some(ALICE));
    assert_eq!(wallet.balance_reads(), 0);

    session.set_pin("1234").unwrap();
    session.confirm_pin("1234").await.unwrap();
    assert_eq!(wallet.balance_reads(), 1);
    session.deposit("1").await.unwrap();

    // same account again is not a change
    session.accounts_changed(&[ALICE, BOB]).await.unwrap();
    assert_eq!(wallet.balance_reads(), 2);

    let state = session.accounts_changed(&[BOB, ALICE]).await.unwrap();
    assert_eq!(state, SessionState::Ready);
    assert_eq!(session.account(), Some(BOB));
    assert_eq!(wallet.balance_reads(), 3);
    assert_eq!(session.balance(), BalanceState::Fresh(U256::from(10)));
    assert_eq!(session.history().len(), 1);

    let state = session.accounts_changed(&[]).await.unwrap();
    assert_eq!(state, SessionState::Disconnected);
    assert_eq!(session.account(), None);
    assert_eq!(session.balance(), BalanceState::NeverRead);
    assert!(matches!(session.deposit("1").await, Err(SessionError::NotConnected)));
    assert!(session.is_pin_set());
}

#[tokio::test]
async fn disconnect_and_reconnect() {
    let (session, wallet) = ready(&Config::default(), MockWallet::new().with_balance(1)).await;

    session.disconnect();
    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(session.balance(), BalanceState::NeverRead);
    assert!(matches!(session.refresh_balance().await, Err(SessionError::NotConnected)));

    session.connect().await.unwrap();
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.balance(), BalanceState::Fresh(U256::from(1)));
    assert_eq!(wallet.balance_reads(), 2);
}

#[tokio::test]
async fn connection_failures() {
    let wallet = MockWallet::new();
    let session = session_with(&Config::default(), &wallet);

    assert!(matches!(session.connect().await, Err(SessionError::NoAccount)));
    assert_eq!(session.state(), SessionState::Disconnected);

    wallet.set_reject_connect(true);
    assert!(matches!(session.connect().await, Err(SessionError::ConnectionRejected(_))));
    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(session.account(), None);
}

#[tokio::test]
async fn history_follows_config() {
    let config = Config {
        unit: Some("ETH".to_string()),
        history: atm_config::HistoryConfig { enabled: true, capacity: Some(2) },
        ..Default::default()
    };
    let (session, _wallet) = ready(&config, MockWallet::new()).await;

    for amount in ["1", "2", "3"] {
        session.deposit(amount).await.unwrap();
    }
    let descriptions: Vec<_> = session.history().into_iter().map(|r| r.description).collect();
    assert_eq!(descriptions, ["Deposited 2 ETH", "Deposited 3 ETH"]);

    session.clear_history();
    assert!(session.view().history.is_empty());

    let config = Config {
        history: atm_config::HistoryConfig { enabled: false, capacity: None },
        ..Default::default()
    };
    let (session, _wallet) = ready(&config, MockWallet::new()).await;
    session.deposit("1").await.unwrap();
    assert!(session.history().is_empty());
    assert_eq!(session.balance(), BalanceState::Fresh(U256::from(1)));
}

#[tokio::test]
async fn abandoned_caller_keeps_transaction_in_flight() {
    init_tracing();
    let (session, wallet) = ready(&Config::default(), MockWallet::new().with_balance(1)).await;
    wallet.hold_confirmations();

    let abandoned = tokio::time::timeout(Duration::from_millis(20), session.deposit("5")).await;
    assert!(abandoned.is_err());
    assert_eq!(wallet.pending(), 1);
    assert!(session.view().in_flight);

    assert!(matches!(session.deposit("5").await, Err(SessionError::TransactionInFlight)));
    assert_eq!(wallet.submitted().len(), 1);

    wallet.release_one();
    while session.view().in_flight {
        tokio::task::yield_now().await;
    }
    assert_eq!(session.balance(), BalanceState::Fresh(U256::from(6)));
    assert_eq!(session.history().len(), 1);
}

#[tokio::test]
async fn read_issued_before_confirmation_does_not_win() {
    let (session, wallet) = ready(&Config::default(), MockWallet::new().with_balance(10)).await;
    wallet.hold_next_read();

    let refresh = session.refresh_balance();
    let deposit = async {
        while wallet.held_reads() == 0 {
            tokio::task::yield_now().await;
        }
        let receipt = session.deposit("5").await.unwrap();
        wallet.release_read();
        receipt
    };
    let (refreshed, receipt) = tokio::join!(refresh, deposit);

    assert_eq!(receipt.balance, Some(U256::from(15)));
    assert_eq!(refreshed.unwrap(), U256::from(15));
    assert_eq!(session.balance(), BalanceState::Fresh(U256::from(15)));
}

#[tokio::test]
async fn failed_first_read_is_reported() {
    let wallet = MockWallet::new().with_grantable(vec![ALICE]).with_balance(3);
    let session = session_with(&Config::default(), &wallet);
    session.connect().await.unwrap();
    session.set_pin("1234").unwrap();

    wallet.set_fail_reads(true);
    session.confirm_pin("1234").await.unwrap();
    assert!(session.is_pin_set());

    let view = session.view();
    assert_eq!(view.balance, BalanceState::NeverRead);
    assert_eq!(view.balance_error.as_deref(), Some("ledger unavailable: connection refused"));

    wallet.set_fail_reads(false);
    session.refresh_balance().await.unwrap();
    assert_eq!(session.balance_error(), None);
    assert_eq!(session.balance(), BalanceState::Fresh(U256::from(3)));
}
