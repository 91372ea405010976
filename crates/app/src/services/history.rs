//! In-memory transaction history.

use std::sync::{Mutex, PoisonError};

use cardlink_domain::transaction::{Transaction, TransactionKind};

/// Append-only list of applied card writes.
#[derive(Debug, Default)]
pub struct TransactionLog {
    entries: Mutex<Vec<Transaction>>,
}

impl TransactionLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, transaction: Transaction) {
        tracing::debug!(
            id = %transaction.id,
            kind = ?transaction.kind,
            machine_no = %transaction.machine_no,
            amount = %transaction.amount,
            "recorded transaction"
        );
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(transaction);
    }

    /// Every transaction, newest first.
    #[must_use]
    pub fn list(&self) -> Vec<Transaction> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.iter().rev().cloned().collect()
    }

    /// Sum of amounts loaded onto cards by one reader, all kinds included.
    #[must_use]
    pub fn total_loaded(&self, machine_no: &str) -> u64 {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|entry| entry.machine_no == machine_no)
            .map(|entry| u64::from(entry.amount.value()))
            .sum()
    }

    /// Number of transactions of `kind`.
    #[must_use]
    pub fn count(&self, kind: TransactionKind) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|entry| entry.kind == kind)
            .count()
    }
}
