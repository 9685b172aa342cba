use crate::{Result, SessionError};
use alloy_primitives::U256;
use serde::Serialize;
use std::{fmt, str::FromStr};

/// A strictly positive ledger amount in the contract's base unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Amount(U256);

impl Amount {
    /// Wraps `value`, rejecting zero.
    pub fn new(value: U256) -> Result<Self> {
        if value.is_zero() {
            return Err(SessionError::InvalidAmount("amount must be greater than zero".into()));
        }
        Ok(Self(value))
    }

    /// Parses user input as a whole decimal number.
    ///
    /// Surrounding whitespace is ignored. Signs, fractions, hex prefixes and trailing garbage
    /// are rejected rather than coerced.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(SessionError::InvalidAmount("amount is empty".into()));
        }
        if !input.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SessionError::InvalidAmount(format!("`{input}` is not a whole number")));
        }
        let value = U256::from_str_radix(input, 10)
            .map_err(|_| SessionError::InvalidAmount(format!("`{input}` is too large")))?;
        Self::new(value)
    }

    pub fn get(self) -> U256 {
        self.0
    }
}

impl FromStr for Amount {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<u64> for Amount {
    type Error = SessionError;

    fn try_from(value: u64) -> Result<Self> {
        Self::new(U256::from(value))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<Amount> for U256 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}
