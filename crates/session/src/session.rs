//! The session coordinator.

use crate::{
    Amount, BalanceOracle, BalanceState, Executor, GatePhase, History, PinGate, PinPolicy, Result,
    SessionError, TransactionKind, TransactionReceipt, TransactionRecord, TransactionRequest,
};
use alloy_primitives::{Address, U256};
use atm_config::Config;
use atm_wallets::{LedgerBinding, ProviderHandle, bind, detect_provider};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

/// Where the session stands in its readiness pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No wallet provider is available.
    ProviderAbsent,
    /// A provider is available but no account is connected.
    Disconnected,
    /// An account is connected and bound to the ledger; no PIN was entered yet.
    Connected,
    /// A PIN candidate awaits confirmation.
    PinPending,
    /// The PIN gate is set; deposits and withdrawals are accepted.
    Ready,
}

/// Snapshot handed to the presentation layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionView {
    pub state: SessionState,
    pub contract: Address,
    pub account: Option<Address>,
    pub pin: GatePhase,
    pub balance: BalanceState,
    /// Why the latest balance read failed. Cleared by the next successful read.
    pub balance_error: Option<String>,
    pub in_flight: bool,
    pub history: Vec<TransactionRecord>,
}

#[derive(Default)]
struct Connection {
    provider: Option<ProviderHandle>,
    account: Option<Address>,
    binding: Option<LedgerBinding>,
    gate: PinGate,
}

impl Connection {
    fn state(&self) -> SessionState {
        if self.provider.is_none() {
            return SessionState::ProviderAbsent;
        }
        if self.account.is_none() {
            return SessionState::Disconnected;
        }
        match self.gate.phase() {
            GatePhase::Unset => SessionState::Connected,
            GatePhase::PendingConfirmation => SessionState::PinPending,
            GatePhase::Set => SessionState::Ready,
        }
    }

    fn provider(&self) -> Result<ProviderHandle> {
        self.provider.clone().ok_or(SessionError::ProviderAbsent)
    }

    /// The current binding, or the reason there is none.
    fn binding(&self) -> Result<LedgerBinding> {
        match &self.binding {
            Some(binding) => Ok(binding.clone()),
            None if self.provider.is_none() => Err(SessionError::ProviderAbsent),
            None => Err(SessionError::NotConnected),
        }
    }
}

/// One client's connection to the ledger.
///
/// All mutation goes through the named transitions below. Methods take `&self`, so a session can
/// be shared between the tasks driving the user interface and the provider's event stream.
pub struct Session {
    contract: Address,
    pin_policy: PinPolicy,
    conn: Mutex<Connection>,
    oracle: Arc<BalanceOracle>,
    history: Arc<Mutex<History>>,
    executor: Executor,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("contract", &self.contract)
            .field("state", &self.state())
            .field("account", &self.account())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a session for `config` with an optional wallet provider. No I/O is performed.
    pub fn new(config: &Config, provider: Option<ProviderHandle>) -> Self {
        let conn = Connection { provider, ..Default::default() };
        Self {
            contract: config.contract_address,
            pin_policy: PinPolicy::from(&config.pin),
            conn: Mutex::new(conn),
            oracle: Arc::default(),
            history: Arc::new(Mutex::new(History::new(&config.history))),
            executor: Executor::new(config.unit.clone()),
        }
    }

    /// Creates a session using the provider configured in `config`, if any.
    pub fn detect(config: &Config) -> Self {
        let provider = detect_provider(config).map(|p| Arc::new(p) as ProviderHandle);
        Self::new(config, provider)
    }

    pub fn state(&self) -> SessionState {
        self.conn.lock().state()
    }

    pub fn account(&self) -> Option<Address> {
        self.conn.lock().account
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    pub fn balance(&self) -> BalanceState {
        self.oracle.state()
    }

    /// Why the latest balance read failed, if it did.
    pub fn balance_error(&self) -> Option<String> {
        self.oracle.last_error()
    }

    pub fn is_pin_set(&self) -> bool {
        self.conn.lock().gate.is_set()
    }

    pub fn history(&self) -> Vec<TransactionRecord> {
        self.history.lock().to_vec()
    }

    pub fn view(&self) -> SessionView {
        let (state, account, pin) = {
            let conn = self.conn.lock();
            (conn.state(), conn.account, conn.gate.phase())
        };
        SessionView {
            state,
            contract: self.contract,
            account,
            pin,
            balance: self.oracle.state(),
            balance_error: self.oracle.last_error(),
            in_flight: self.executor.is_in_flight(),
            history: self.history(),
        }
    }

    /// Recovers an already authorized account without prompting the user.
    pub async fn init(&self) -> Result<SessionState> {
        let Some(provider) = self.conn.lock().provider.clone() else {
            debug!("no wallet provider");
            return Ok(SessionState::ProviderAbsent);
        };
        let accounts = provider.accounts().await?;
        self.select_account(accounts.first().copied())?;
        self.refresh_if_ready().await;
        Ok(self.state())
    }

    /// Installs a provider that became available after the session was created, then recovers
    /// its authorized account.
    pub async fn attach_provider(&self, provider: ProviderHandle) -> Result<SessionState> {
        {
            let mut conn = self.conn.lock();
            conn.provider = Some(provider);
            conn.account = None;
            conn.binding = None;
            self.oracle.reset();
            debug!(state = ?conn.state(), "wallet provider attached");
        }
        self.init().await
    }

    /// Asks the wallet for account access and binds the ledger to the first account.
    pub async fn connect(&self) -> Result<Address> {
        let provider = self.conn.lock().provider()?;
        let accounts = provider.request_accounts().await?;
        let account = accounts.first().copied().ok_or(SessionError::NoAccount)?;
        self.select_account(Some(account))?;
        info!(%account, "wallet connected");
        self.refresh_if_ready().await;
        Ok(account)
    }

    /// Applies an `accountsChanged` notification from the provider.
    ///
    /// An empty list disconnects; a different first account rebinds the ledger.
    pub async fn accounts_changed(&self, accounts: &[Address]) -> Result<SessionState> {
        if self.conn.lock().provider.is_none() {
            return Err(SessionError::ProviderAbsent);
        }
        if self.select_account(accounts.first().copied())? {
            self.refresh_if_ready().await;
        }
        Ok(self.state())
    }

    /// Drops the account and its binding. The PIN gate and the history are kept.
    pub fn disconnect(&self) {
        let mut conn = self.conn.lock();
        if let Some(account) = conn.account.take() {
            info!(%account, "wallet disconnected");
        }
        conn.binding = None;
        self.oracle.reset();
        debug!(state = ?conn.state(), "session transition");
    }

    /// Enters the PIN candidate.
    pub fn set_pin(&self, pin: &str) -> Result<()> {
        let mut conn = self.conn.lock();
        conn.binding()?;
        conn.gate.set_candidate(pin, &self.pin_policy)?;
        debug!(state = ?conn.state(), "PIN entered");
        Ok(())
    }

    /// Confirms the PIN. Once the gate is set the balance is read for the first time.
    pub async fn confirm_pin(&self, confirmation: &str) -> Result<()> {
        {
            let mut conn = self.conn.lock();
            conn.binding()?;
            let was_set = conn.gate.is_set();
            conn.gate.confirm(confirmation, &self.pin_policy).inspect_err(|err| {
                debug!(%err, "PIN not confirmed");
            })?;
            if was_set {
                return Ok(());
            }
            info!("PIN set");
        }
        self.refresh_if_ready().await;
        Ok(())
    }

    /// Deposits the amount typed by the user.
    pub async fn deposit(&self, amount: &str) -> Result<TransactionReceipt> {
        self.transact(TransactionKind::Deposit, amount).await
    }

    /// Withdraws the amount typed by the user.
    pub async fn withdraw(&self, amount: &str) -> Result<TransactionReceipt> {
        self.transact(TransactionKind::Withdraw, amount).await
    }

    async fn transact(&self, kind: TransactionKind, amount: &str) -> Result<TransactionReceipt> {
        if !self.is_pin_set() {
            return Err(SessionError::NotAuthorized);
        }
        let amount = Amount::parse(amount)?;
        self.submit(TransactionRequest { kind, amount }).await
    }

    /// Submits a validated request and waits for its confirmation.
    pub async fn submit(&self, request: TransactionRequest) -> Result<TransactionReceipt> {
        let (binding, generation) = {
            let conn = self.conn.lock();
            if !conn.gate.is_set() {
                return Err(SessionError::NotAuthorized);
            }
            (conn.binding()?, self.oracle.generation())
        };
        self.executor
            .execute(binding, request, self.oracle.clone(), generation, self.history.clone())
            .await
    }

    /// Re-reads the balance of the connected account.
    pub async fn refresh_balance(&self) -> Result<U256> {
        let (binding, generation) = {
            let conn = self.conn.lock();
            let binding = conn.binding()?;
            if !conn.gate.is_set() {
                return Err(SessionError::NotAuthorized);
            }
            (binding, self.oracle.generation())
        };
        self.oracle.refresh_at(&binding, generation).await
    }

    pub fn clear_history(&self) {
        self.history.lock().clear();
        debug!("history cleared");
    }

    /// Makes `account` the active account, rebuilding the binding if it changed.
    ///
    /// Returns whether the active account changed. If binding fails the session is left
    /// disconnected.
    fn select_account(&self, account: Option<Address>) -> Result<bool> {
        let mut conn = self.conn.lock();
        if conn.account == account {
            return Ok(false);
        }

        let binding = match account {
            Some(account) => {
                let provider = conn.provider()?;
                match bind(provider.as_ref(), self.contract, account) {
                    Ok(binding) => Some(binding),
                    Err(err) => {
                        conn.account = None;
                        conn.binding = None;
                        self.oracle.reset();
                        warn!(%err, %account, "failed to bind ledger");
                        return Err(err.into());
                    }
                }
            }
            None => None,
        };

        let previous = std::mem::replace(&mut conn.account, account);
        conn.binding = binding;
        self.oracle.reset();
        debug!(?previous, current = ?account, state = ?conn.state(), "active account changed");
        Ok(true)
    }

    /// Reads the balance if the gate is set and an account is bound. Failures are logged only.
    async fn refresh_if_ready(&self) {
        let target = {
            let conn = self.conn.lock();
            match &conn.binding {
                Some(binding) if conn.gate.is_set() => {
                    Some((binding.clone(), self.oracle.generation()))
                }
                _ => None,
            }
        };
        if let Some((binding, generation)) = target {
            // failures surface through `balance_error`
            let _ = self.oracle.refresh_at(&binding, generation).await;
        }
    }
}
