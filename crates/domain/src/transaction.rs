//! Transaction — a card write that changed the stored balance.

use serde::Serialize;

use crate::amount::{Amount, Balance};
use crate::id::TransactionId;
use crate::time::{Timestamp, now};

/// Which card operation produced the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Opening balance written to a blank card.
    Initialize,
    /// Value added to an initialized card.
    Recharge,
}

/// Whether the backend ledger has accepted the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStatus {
    /// The ledger acknowledged the transaction.
    Synced,
    /// The card was written but the ledger call failed.
    Pending,
}

/// One applied card write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
    /// Unique id.
    pub id: TransactionId,
    /// Operation kind.
    pub kind: TransactionKind,
    /// Machine number of the reader that wrote the card.
    pub machine_no: String,
    /// Amount written.
    pub amount: Amount,
    /// Balance the reader reported afterwards.
    pub card_balance: Option<Balance>,
    /// Ledger state.
    pub ledger: LedgerStatus,
    /// When the card write completed.
    pub at: Timestamp,
}

impl Transaction {
    /// Record a card write that just completed.
    #[must_use]
    pub fn new(
        kind: TransactionKind,
        machine_no: impl Into<String>,
        amount: Amount,
        card_balance: Option<Balance>,
        ledger: LedgerStatus,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            kind,
            machine_no: machine_no.into(),
            amount,
            card_balance,
            ledger,
            at: now(),
        }
    }
}
