//! One in-flight command and its one-shot resolution.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;

use cardlink_domain::command::CommandKind;
use cardlink_domain::error::{CardError, LinkFailure};
use cardlink_domain::id::OperationId;
use cardlink_domain::response::{self, Reply};

use crate::ports::Notification;

/// Final result of one command.
pub type Outcome = Result<Reply, CardError>;

/// An in-flight command.
///
/// The completion flag flips exactly once. Everything that arrives after
/// it flipped (late replies, teardown errors fired by the stack while the
/// subscription is being released) is discarded here and never reaches
/// the caller.
#[derive(Debug)]
pub struct PendingOperation {
    id: OperationId,
    kind: CommandKind,
    completed: AtomicBool,
    slot: Mutex<Option<oneshot::Sender<Outcome>>>,
}

impl PendingOperation {
    /// Create a pending operation and the receiver its outcome lands in.
    #[must_use]
    pub fn new(kind: CommandKind) -> (Arc<Self>, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        let pending = Arc::new(Self {
            id: OperationId::new(),
            kind,
            completed: AtomicBool::new(false),
            slot: Mutex::new(Some(tx)),
        });
        (pending, rx)
    }

    /// Correlation id for logs.
    #[must_use]
    pub fn id(&self) -> OperationId {
        self.id
    }

    /// Command kind this operation waits a reply for.
    #[must_use]
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Whether the outcome has been decided.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Decide the outcome if nobody did yet.
    ///
    /// Returns `true` when this call decided it. A dropped receiver is not
    /// an error: the caller went away and the outcome is discarded.
    pub fn resolve(&self, outcome: Outcome) -> bool {
        if self
            .completed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::trace!(op = %self.id, "operation already resolved, discarding outcome");
            return false;
        }
        let sender = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(tx) = sender {
            match &outcome {
                Ok(reply) => tracing::debug!(op = %self.id, kind = %self.kind, ?reply, "command resolved"),
                Err(err) => tracing::debug!(op = %self.id, kind = %self.kind, code = err.code(), "command failed"),
            }
            let _ = tx.send(outcome);
        }
        true
    }

    /// Feed one inbound event.
    ///
    /// Returns `true` when the event decided the outcome. Malformed frames
    /// and objects without a marker for this kind are dropped and the
    /// operation keeps waiting.
    pub fn on_notification(&self, event: Notification) -> bool {
        if self.is_completed() {
            tracing::trace!(op = %self.id, "ignoring event for resolved operation");
            return false;
        }
        match event {
            Err(err) => {
                tracing::warn!(op = %self.id, %err, "transport reported an error on the command characteristic");
                self.resolve(Err(CardError::BleError(LinkFailure::Notification)))
            }
            Ok(payload) => match response::decode(self.kind, &payload) {
                Err(err) => {
                    tracing::debug!(op = %self.id, %err, bytes = payload.len(), "dropping malformed frame");
                    false
                }
                Ok(None) => {
                    tracing::debug!(op = %self.id, kind = %self.kind, "frame carries no reply for this command");
                    false
                }
                Ok(Some(response)) => self.resolve(response.into_result(self.kind)),
            },
        }
    }
}
