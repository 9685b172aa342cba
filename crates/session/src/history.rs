use crate::TransactionKind;
use alloy_primitives::{TxHash, U256};
use atm_config::HistoryConfig;
use serde::Serialize;
use std::collections::VecDeque;

/// A confirmed transaction as shown to the user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TransactionRecord {
    pub kind: TransactionKind,
    pub amount: U256,
    pub tx_hash: TxHash,
    /// Human readable summary, e.g. `Deposited 5 ETH`.
    pub description: String,
}

impl TransactionRecord {
    pub fn new(kind: TransactionKind, amount: U256, tx_hash: TxHash, unit: Option<&str>) -> Self {
        let mut description = format!("{} {amount}", kind.past_tense());
        if let Some(unit) = unit {
            description.push(' ');
            description.push_str(unit);
        }
        Self { kind, amount, tx_hash, description }
    }
}

/// Confirmed transactions in submission order, oldest first.
#[derive(Clone, Debug)]
pub struct History {
    records: VecDeque<TransactionRecord>,
    enabled: bool,
    capacity: Option<usize>,
}

impl Default for History {
    fn default() -> Self {
        Self::new(&HistoryConfig::default())
    }
}

impl History {
    pub fn new(config: &HistoryConfig) -> Self {
        Self { records: VecDeque::new(), enabled: config.enabled, capacity: config.capacity }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Appends `record`, returning the record evicted to stay within capacity.
    pub fn push(&mut self, record: TransactionRecord) -> Option<TransactionRecord> {
        if !self.enabled {
            return None;
        }
        let evicted = match self.capacity {
            Some(capacity) if self.records.len() >= capacity => self.records.pop_front(),
            _ => None,
        };
        self.records.push_back(record);
        evicted
    }

    pub fn records(&self) -> impl Iterator<Item = &TransactionRecord> {
        self.records.iter()
    }

    pub fn to_vec(&self) -> Vec<TransactionRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
