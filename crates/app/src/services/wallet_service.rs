//! Wallet service — card writes reconciled with the backend ledger.
//!
//! The card is the source of truth once a write succeeded. A ledger failure
//! afterwards is reported next to the card result as
//! [`WalletOutcome::LedgerSyncFailed`], never as a card or link error.

use std::sync::Arc;

use cardlink_domain::amount::Balance;
use cardlink_domain::error::{CardError, LedgerError};
use cardlink_domain::transaction::{LedgerStatus, Transaction, TransactionKind};

use super::card_service::{CardService, CardUpdate};
use super::history::TransactionLog;
use crate::lifecycle::SessionSource;
use crate::ports::Ledger;

/// Result of a card write followed by ledger reconciliation.
#[derive(Debug)]
pub enum WalletOutcome {
    /// Card written and ledger updated.
    Reconciled {
        update: CardUpdate,
        transaction: Transaction,
    },
    /// Card written, ledger call failed.
    LedgerSyncFailed {
        update: CardUpdate,
        transaction: Transaction,
        error: LedgerError,
    },
}

impl WalletOutcome {
    #[must_use]
    pub fn update(&self) -> &CardUpdate {
        match self {
            Self::Reconciled { update, .. } | Self::LedgerSyncFailed { update, .. } => update,
        }
    }

    #[must_use]
    pub fn transaction(&self) -> &Transaction {
        match self {
            Self::Reconciled { transaction, .. } | Self::LedgerSyncFailed { transaction, .. } => {
                transaction
            }
        }
    }
}

/// Card operations plus ledger bookkeeping for one reader.
pub struct WalletService<C, L> {
    cards: Arc<CardService<C>>,
    ledger: L,
    history: Arc<TransactionLog>,
}

impl<C: SessionSource, L: Ledger> WalletService<C, L> {
    pub fn new(cards: Arc<CardService<C>>, ledger: L, history: Arc<TransactionLog>) -> Self {
        Self {
            cards,
            ledger,
            history,
        }
    }

    /// The card service this wallet drives.
    #[must_use]
    pub fn cards(&self) -> &CardService<C> {
        &self.cards
    }

    #[must_use]
    pub fn history(&self) -> &Arc<TransactionLog> {
        &self.history
    }

    /// Initialize the card, then record the opening balance with the ledger.
    ///
    /// # Errors
    ///
    /// Returns the [`CardError`] when the card write itself failed. Ledger
    /// failures are part of the `Ok` outcome.
    #[tracing::instrument(skip(self))]
    pub async fn initialize(&self, machine_no: &str, amount: i64) -> Result<WalletOutcome, CardError> {
        let update = self.cards.initialize_card(amount).await?;
        let synced = self.ledger.apply_initialize(machine_no, update.amount).await;
        Ok(self.settle(TransactionKind::Initialize, machine_no, update, synced))
    }

    /// Recharge the card, then record the recharge with the ledger.
    ///
    /// # Errors
    ///
    /// Returns the [`CardError`] when the card write itself failed. Ledger
    /// failures are part of the `Ok` outcome.
    #[tracing::instrument(skip(self))]
    pub async fn recharge(&self, machine_no: &str, amount: i64) -> Result<WalletOutcome, CardError> {
        let update = self.cards.recharge_card(amount).await?;
        let synced = self.ledger.apply_recharge(machine_no, update.amount).await;
        Ok(self.settle(TransactionKind::Recharge, machine_no, update, synced))
    }

    /// Balance the backend holds for the reader.
    ///
    /// # Errors
    ///
    /// Returns the [`LedgerError`] from the backend.
    pub async fn remote_balance(&self, machine_no: &str) -> Result<Balance, LedgerError> {
        self.ledger.fetch_remote_balance(machine_no).await
    }

    fn settle(
        &self,
        kind: TransactionKind,
        machine_no: &str,
        update: CardUpdate,
        synced: Result<(), LedgerError>,
    ) -> WalletOutcome {
        let status = match &synced {
            Ok(()) => LedgerStatus::Synced,
            Err(_) => LedgerStatus::Pending,
        };
        let transaction = Transaction::new(kind, machine_no, update.amount, update.balance, status);
        self.history.record(transaction.clone());
        match synced {
            Ok(()) => WalletOutcome::Reconciled {
                update,
                transaction,
            },
            Err(error) => {
                tracing::warn!(%machine_no, ?kind, %error, "card written but ledger sync failed");
                WalletOutcome::LedgerSyncFailed {
                    update,
                    transaction,
                    error,
                }
            }
        }
    }
}
