//! Ledger port — the backend wallet that mirrors card writes.
//!
//! The ledger is reconciled *after* a successful card write and is never
//! called by the protocol engine itself. A ledger failure therefore never
//! means the card write failed.

use std::future::Future;

use cardlink_domain::amount::{Amount, Balance};
use cardlink_domain::error::LedgerError;

/// Backend wallet keyed by reader machine number.
pub trait Ledger: Send + Sync {
    /// Balance the backend holds for the reader's wallet.
    fn fetch_remote_balance(
        &self,
        machine_no: &str,
    ) -> impl Future<Output = Result<Balance, LedgerError>> + Send;

    /// Record a recharge that has already been written to a card.
    fn apply_recharge(
        &self,
        machine_no: &str,
        amount: Amount,
    ) -> impl Future<Output = Result<(), LedgerError>> + Send;

    /// Record an initialization that has already been written to a card.
    fn apply_initialize(
        &self,
        machine_no: &str,
        amount: Amount,
    ) -> impl Future<Output = Result<(), LedgerError>> + Send;
}

impl<T: Ledger> Ledger for std::sync::Arc<T> {
    fn fetch_remote_balance(
        &self,
        machine_no: &str,
    ) -> impl Future<Output = Result<Balance, LedgerError>> + Send {
        (**self).fetch_remote_balance(machine_no)
    }

    fn apply_recharge(
        &self,
        machine_no: &str,
        amount: Amount,
    ) -> impl Future<Output = Result<(), LedgerError>> + Send {
        (**self).apply_recharge(machine_no, amount)
    }

    fn apply_initialize(
        &self,
        machine_no: &str,
        amount: Amount,
    ) -> impl Future<Output = Result<(), LedgerError>> + Send {
        (**self).apply_initialize(machine_no, amount)
    }
}
