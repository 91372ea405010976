//! Card service — the three card operations.

use std::sync::Arc;

use tokio::sync::Mutex;

use cardlink_domain::amount::{Amount, AmountLimits, Balance};
use cardlink_domain::command::Command;
use cardlink_domain::error::CardError;
use cardlink_domain::response::Reply;

use crate::lifecycle::SessionSource;
use crate::protocol::ProtocolEngine;

/// Amount bounds per operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardLimits {
    pub initialize: AmountLimits,
    pub recharge: AmountLimits,
}

impl Default for CardLimits {
    fn default() -> Self {
        Self {
            initialize: AmountLimits::INITIALIZE,
            recharge: AmountLimits::RECHARGE,
        }
    }
}

/// Result of a successful initialize or recharge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardUpdate {
    /// Amount that was written.
    pub amount: Amount,
    /// Card balance reported by the reader, when it sent one.
    pub balance: Option<Balance>,
}

/// Validated entry points over the protocol engine.
///
/// Holds a single permit: a call made while another one is in flight fails
/// with [`CardError::DeviceBusy`] and never reaches the transport.
pub struct CardService<C> {
    sessions: Arc<C>,
    engine: ProtocolEngine,
    limits: CardLimits,
    permit: Mutex<()>,
}

impl<C: SessionSource> CardService<C> {
    /// Create a new service over the given session source.
    pub fn new(sessions: Arc<C>, engine: ProtocolEngine, limits: CardLimits) -> Self {
        Self {
            sessions,
            engine,
            limits,
            permit: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn limits(&self) -> CardLimits {
        self.limits
    }

    /// Read the balance stored on the card currently on the reader.
    ///
    /// # Errors
    ///
    /// Returns the mapped [`CardError`].
    #[tracing::instrument(skip(self))]
    pub async fn read_balance(&self) -> Result<Balance, CardError> {
        match self.run(&Command::Read).await? {
            Reply::Balance(balance) => Ok(balance),
            Reply::Updated { balance, .. } => balance.ok_or_else(|| {
                CardError::Unknown("balance missing from reply".to_owned())
            }),
        }
    }

    /// Write an opening balance to a blank card.
    ///
    /// # Errors
    ///
    /// Returns [`CardError::InvalidAmount`] before any transport activity
    /// when `amount` is out of bounds, otherwise the mapped [`CardError`].
    #[tracing::instrument(skip(self))]
    pub async fn initialize_card(&self, amount: i64) -> Result<CardUpdate, CardError> {
        let amount = self.limits.initialize.validate(amount)?;
        let reply = self.run(&Command::Init { amount }).await?;
        Ok(CardUpdate {
            amount,
            balance: reply.balance(),
        })
    }

    /// Add value to an initialized card.
    ///
    /// Ledger reconciliation is not part of this call; see
    /// [`WalletService`](super::wallet_service::WalletService).
    ///
    /// # Errors
    ///
    /// Returns [`CardError::InvalidAmount`] before any transport activity
    /// when `amount` is out of bounds, otherwise the mapped [`CardError`].
    #[tracing::instrument(skip(self))]
    pub async fn recharge_card(&self, amount: i64) -> Result<CardUpdate, CardError> {
        let amount = self.limits.recharge.validate(amount)?;
        let reply = self.run(&Command::Recharge { amount }).await?;
        Ok(CardUpdate {
            amount,
            balance: reply.balance(),
        })
    }

    async fn run(&self, command: &Command) -> Result<Reply, CardError> {
        let Ok(_permit) = self.permit.try_lock() else {
            tracing::debug!(kind = %command.kind(), "rejecting overlapping card operation");
            return Err(CardError::DeviceBusy);
        };
        let outcome = self
            .engine
            .execute(self.sessions.current_session(), command)
            .await;
        if let Err(err) = &outcome {
            tracing::info!(kind = %command.kind(), code = err.code(), %err, "card operation failed");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Frame, ScriptedSession};

    struct FixedSource(Option<Arc<ScriptedSession>>);

    impl SessionSource for FixedSource {
        type Session = ScriptedSession;

        fn current_session(&self) -> Option<Arc<ScriptedSession>> {
            self.0.clone()
        }
    }

    fn service(session: Option<Arc<ScriptedSession>>) -> CardService<FixedSource> {
        CardService::new(
            Arc::new(FixedSource(session)),
            ProtocolEngine::default(),
            CardLimits::default(),
        )
    }

    #[tokio::test]
    async fn should_fail_every_operation_with_no_device() {
        let service = service(None);

        assert_eq!(service.read_balance().await.unwrap_err(), CardError::NoDevice);
        assert_eq!(
            service.initialize_card(500).await.unwrap_err(),
            CardError::NoDevice
        );
        assert_eq!(
            service.recharge_card(50).await.unwrap_err(),
            CardError::NoDevice
        );
    }

    #[tokio::test]
    async fn should_reject_non_positive_initialize_locally() {
        let session = Arc::new(ScriptedSession::new("reader-1"));
        let service = service(Some(Arc::clone(&session)));

        for amount in [0, -5] {
            let err = service.initialize_card(amount).await.unwrap_err();
            assert_eq!(err.code(), "INVALID_AMOUNT");
        }
        assert_eq!(session.write_count(), 0);
    }

    #[tokio::test]
    async fn should_reject_initialize_below_minimum_locally() {
        let session = Arc::new(ScriptedSession::new("reader-1"));
        let service = service(Some(Arc::clone(&session)));

        let err = service.initialize_card(150).await.unwrap_err();

        assert!(err.is_local());
        assert_eq!(session.write_count(), 0);
    }

    #[tokio::test]
    async fn should_return_recharged_balance() {
        let session = Arc::new(ScriptedSession::new("reader-1"));
        session.reply_with(vec![Frame::json(
            r#"{"status":"SUCCESS","updated_balance":700}"#,
        )]);
        let service = service(Some(session));

        let update = service.recharge_card(100).await.unwrap();

        assert_eq!(update.amount.value(), 100);
        assert_eq!(update.balance, Some(Balance::new(700)));
    }

    #[tokio::test]
    async fn should_report_already_initialized_card_with_balance() {
        let session = Arc::new(ScriptedSession::new("reader-1"));
        session.reply_with(vec![Frame::json(
            r#"{"error":"ALREADY_INIT","balance":150}"#,
        )]);
        let service = service(Some(session));

        let err = service.initialize_card(500).await.unwrap_err();

        assert_eq!(
            err,
            CardError::CardAlreadyInitialized {
                balance: Some(Balance::new(150))
            }
        );
    }

    #[tokio::test]
    async fn should_read_balance() {
        let session = Arc::new(ScriptedSession::new("reader-1"));
        session.reply_with(vec![Frame::json(r#"{"balance":480}"#)]);
        let service = service(Some(session));

        assert_eq!(service.read_balance().await.unwrap(), Balance::new(480));
    }

    #[tokio::test]
    async fn should_reject_overlapping_call_as_busy() {
        let session = Arc::new(ScriptedSession::new("reader-1"));
        let service = Arc::new(service(Some(Arc::clone(&session))));
        let first = tokio::spawn({
            let service = Arc::clone(&service);
            async move { service.read_balance().await }
        });
        while session.write_count() == 0 {
            tokio::task::yield_now().await;
        }

        let err = service.recharge_card(10).await.unwrap_err();
        assert_eq!(err, CardError::DeviceBusy);
        assert_eq!(session.write_count(), 1);

        session.push(Frame::json(r#"{"balance":90}"#));
        assert_eq!(first.await.unwrap().unwrap(), Balance::new(90));
    }
}
