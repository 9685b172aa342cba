use atm_wallets::WalletError;

/// Convenience alias for session results.
pub type Result<T, E = SessionError> = std::result::Result<T, E>;

/// Failures surfaced by a [`Session`](crate::Session).
///
/// None of these leave the session in an undefined state; the operation that failed has no
/// effect beyond what its variant describes.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no wallet provider detected")]
    ProviderAbsent,
    #[error("wallet connection rejected: {0}")]
    ConnectionRejected(String),
    #[error("wallet returned no accounts")]
    NoAccount,
    #[error("no account connected")]
    NotConnected,
    #[error("PIN has not been set")]
    NotAuthorized,
    #[error("PIN confirmation does not match")]
    PinMismatch,
    #[error("invalid PIN: {0}")]
    InvalidPin(String),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),
    #[error("{operation} rejected by the user: {reason}")]
    Rejected { operation: &'static str, reason: String },
    #[error("transaction reverted{}", fmt_reason(.reason))]
    Reverted { reason: Option<String> },
    #[error("another transaction is still in flight")]
    TransactionInFlight,
}

fn fmt_reason(reason: &Option<String>) -> String {
    reason.as_ref().map(|reason| format!(": {reason}")).unwrap_or_default()
}

impl From<WalletError> for SessionError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::ConnectionRejected(reason) => Self::ConnectionRejected(reason),
            WalletError::Rejected { operation, reason } => Self::Rejected { operation, reason },
            WalletError::Reverted { reason } => Self::Reverted { reason },
            WalletError::Unavailable(reason) => Self::LedgerUnavailable(reason),
            err @ WalletError::InvalidHandle => Self::LedgerUnavailable(err.to_string()),
        }
    }
}
