//! In-memory ledger keyed by machine number.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use cardlink_app::ports::Ledger;
use cardlink_domain::amount::{Amount, Balance};
use cardlink_domain::error::LedgerError;

/// Ledger holding one wallet per registered machine.
///
/// Every initialize or recharge adds its amount to the machine's wallet.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    wallets: Mutex<HashMap<String, i64>>,
    offline: AtomicBool,
}

impl InMemoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `machine_no` with an opening wallet balance.
    #[must_use]
    pub fn with_machine(self, machine_no: &str, balance: i64) -> Self {
        self.wallets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(machine_no.to_owned(), balance);
        self
    }

    /// Make every request fail until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Wallet balance of `machine_no`, if registered.
    #[must_use]
    pub fn wallet(&self, machine_no: &str) -> Option<i64> {
        self.wallets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(machine_no)
            .copied()
    }

    fn credit(&self, machine_no: &str, amount: Amount) -> Result<(), LedgerError> {
        self.check_online()?;
        let mut wallets = self.wallets.lock().unwrap_or_else(PoisonError::into_inner);
        let wallet = wallets
            .get_mut(machine_no)
            .ok_or_else(|| LedgerError::UnknownMachine(machine_no.to_owned()))?;
        *wallet += i64::from(amount.value());
        tracing::debug!(%machine_no, %amount, balance = *wallet, "ledger credited");
        Ok(())
    }

    fn check_online(&self) -> Result<(), LedgerError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(LedgerError::Request("ledger is offline".into()));
        }
        Ok(())
    }
}

impl Ledger for InMemoryLedger {
    async fn fetch_remote_balance(&self, machine_no: &str) -> Result<Balance, LedgerError> {
        self.check_online()?;
        self.wallet(machine_no)
            .map(Balance::new)
            .ok_or_else(|| LedgerError::UnknownMachine(machine_no.to_owned()))
    }

    async fn apply_recharge(&self, machine_no: &str, amount: Amount) -> Result<(), LedgerError> {
        self.credit(machine_no, amount)
    }

    async fn apply_initialize(&self, machine_no: &str, amount: Amount) -> Result<(), LedgerError> {
        self.credit(machine_no, amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardlink_domain::amount::AmountLimits;

    fn amount(value: i64) -> Amount {
        AmountLimits::RECHARGE.validate(value).unwrap()
    }

    #[tokio::test]
    async fn should_credit_registered_machine() {
        let ledger = InMemoryLedger::new().with_machine("42", 1_000);

        ledger.apply_recharge("42", amount(100)).await.unwrap();
        ledger.apply_initialize("42", amount(300)).await.unwrap();

        assert_eq!(
            ledger.fetch_remote_balance("42").await.unwrap(),
            Balance::new(1_400)
        );
    }

    #[tokio::test]
    async fn should_reject_unknown_machine() {
        let ledger = InMemoryLedger::new();
        let err = ledger.apply_recharge("7", amount(10)).await.unwrap_err();
        assert!(matches!(err, LedgerError::UnknownMachine(m) if m == "7"));
    }

    #[tokio::test]
    async fn should_fail_while_offline() {
        let ledger = InMemoryLedger::new().with_machine("42", 0);
        ledger.set_offline(true);

        assert!(matches!(
            ledger.apply_recharge("42", amount(10)).await,
            Err(LedgerError::Request(_))
        ));
        assert_eq!(ledger.wallet("42"), Some(0));
    }
}
