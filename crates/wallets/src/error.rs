use alloy_transport::TransportError;

/// EIP-1193 error code for a request the user declined.
pub const USER_REJECTED_REQUEST: i64 = 4001;

/// EIP-1193 error code for an account or method the user has not authorized.
pub const UNAUTHORIZED: i64 = 4100;

#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("account access was rejected: {0}")]
    ConnectionRejected(String),
    #[error("{operation} was rejected by the user: {reason}")]
    Rejected { operation: &'static str, reason: String },
    #[error("transaction reverted{}", fmt_reason(.reason))]
    Reverted { reason: Option<String> },
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
    #[error("wallet provider handle is not usable")]
    InvalidHandle,
}

fn fmt_reason(reason: &Option<String>) -> String {
    reason.as_ref().map(|reason| format!(": {reason}")).unwrap_or_default()
}

impl WalletError {
    /// Classifies a transport failure of an account request.
    pub(crate) fn from_account_request(err: TransportError) -> Self {
        classify_transport(err, Self::ConnectionRejected)
    }

    /// Classifies a transport failure of a ledger call.
    pub(crate) fn from_ledger_call(operation: &'static str, err: TransportError) -> Self {
        classify_transport(err, |reason| Self::Rejected { operation, reason })
    }
}

fn classify_transport(
    err: TransportError,
    on_reject: impl FnOnce(String) -> WalletError,
) -> WalletError {
    if let Some(payload) = err.as_error_resp() {
        if matches!(payload.code, USER_REJECTED_REQUEST | UNAUTHORIZED) {
            return on_reject(payload.message.to_string());
        }
        if let Some(data) = payload.as_revert_data() {
            return WalletError::Reverted { reason: crate::ledger::decode_revert(&data) };
        }
        if payload.message.contains("revert") {
            return WalletError::Reverted { reason: Some(payload.message.to_string()) };
        }
    }
    WalletError::Unavailable(err.to_string())
}
