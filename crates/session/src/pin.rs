//! Local PIN gate guarding mutating operations.
//!
//! The PIN is never checked against any authority. It only proves that the user typed the same
//! value twice before the first deposit or withdrawal of the session.

use crate::{Result, SessionError};
use atm_config::PinConfig;
use serde::Serialize;
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// Accepted PIN shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PinPolicy {
    pub min_length: usize,
    pub max_length: usize,
}

impl PinPolicy {
    /// Checks that `pin` is made of ASCII digits and has an accepted length.
    pub fn check(&self, pin: &str) -> Result<()> {
        if pin.is_empty() {
            return Err(SessionError::InvalidPin("PIN is empty".into()));
        }
        if !pin.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SessionError::InvalidPin("PIN must only contain digits".into()));
        }
        if pin.len() < self.min_length || pin.len() > self.max_length {
            return Err(SessionError::InvalidPin(format!(
                "PIN must be {} to {} digits long",
                self.min_length, self.max_length
            )));
        }
        Ok(())
    }
}

impl From<&PinConfig> for PinPolicy {
    fn from(config: &PinConfig) -> Self {
        Self { min_length: config.min_length, max_length: config.max_length }
    }
}

impl Default for PinPolicy {
    fn default() -> Self {
        Self::from(&PinConfig::default())
    }
}

/// Observable phase of the gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GatePhase {
    Unset,
    PendingConfirmation,
    Set,
}

#[derive(Default)]
enum Gate {
    #[default]
    Unset,
    Pending(Zeroizing<String>),
    Set,
}

/// Two-step PIN gate: `Unset -> PendingConfirmation -> Set`.
///
/// `Set` is terminal. Candidate material is wiped when it is replaced, matched or dropped.
#[derive(Default)]
pub struct PinGate {
    gate: Gate,
}

impl fmt::Debug for PinGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinGate").field("phase", &self.phase()).finish()
    }
}

impl PinGate {
    pub fn phase(&self) -> GatePhase {
        match self.gate {
            Gate::Unset => GatePhase::Unset,
            Gate::Pending(_) => GatePhase::PendingConfirmation,
            Gate::Set => GatePhase::Set,
        }
    }

    pub fn is_set(&self) -> bool {
        matches!(self.gate, Gate::Set)
    }

    /// Records `pin` as the candidate, replacing any previous one.
    ///
    /// Has no effect once the gate is set.
    pub fn set_candidate(&mut self, pin: &str, policy: &PinPolicy) -> Result<()> {
        policy.check(pin)?;
        if self.is_set() {
            debug!("PIN already set, ignoring new candidate");
            return Ok(());
        }
        self.gate = Gate::Pending(Zeroizing::new(pin.to_owned()));
        Ok(())
    }

    /// Commits the gate if `confirmation` equals the pending candidate.
    ///
    /// A mismatch keeps the candidate so that only the confirmation has to be retyped.
    pub fn confirm(&mut self, confirmation: &str, policy: &PinPolicy) -> Result<()> {
        policy.check(confirmation)?;
        let matches = match &self.gate {
            Gate::Set => return Ok(()),
            Gate::Unset => false,
            Gate::Pending(candidate) => {
                bool::from(candidate.as_bytes().ct_eq(confirmation.as_bytes()))
            }
        };
        if !matches {
            return Err(SessionError::PinMismatch);
        }
        self.gate = Gate::Set;
        Ok(())
    }
}
