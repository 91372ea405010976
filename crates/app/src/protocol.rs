//! Command protocol engine.
//!
//! Turns one write plus an untagged notification stream into a call that
//! resolves exactly once. See [`ProtocolEngine::execute`] for the sequence.

mod pending;

pub use pending::{Outcome, PendingOperation};

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_stream::StreamExt;

use cardlink_domain::command::Command;
use cardlink_domain::error::{CardError, CommunicationFailure, LinkFailure};
use cardlink_domain::response::Reply;

use crate::channel::{CommandChannel, SendError};
use crate::ports::{NotificationStream, TransportSession};

/// Default deadline for one command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(15);

/// Engine tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Deadline for a qualifying reply. `None` waits forever.
    pub command_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command_timeout: Some(DEFAULT_COMMAND_TIMEOUT),
        }
    }
}

/// Runs commands against a session.
#[derive(Debug, Clone, Default)]
pub struct ProtocolEngine {
    config: EngineConfig,
}

impl ProtocolEngine {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> EngineConfig {
        self.config
    }

    /// Run `command` on `session` and wait for its single outcome.
    ///
    /// 1. No session fails with [`CardError::NoDevice`] before any write.
    /// 2. The reply subscription is opened and a listener spawned before
    ///    the request is written, so a fast reply cannot be missed. The
    ///    listener is aborted when the call ends, including when the
    ///    caller drops it.
    /// 3. A rejected write resolves [`CardError::CommunicationFailed`]
    ///    unless a reply already won.
    /// 4. The first qualifying notification, transport error, session
    ///    close, stream end or deadline decides the outcome. Anything
    ///    later is discarded.
    ///
    /// # Errors
    ///
    /// Returns the mapped [`CardError`] for the outcome.
    pub async fn execute<S: TransportSession>(
        &self,
        session: Option<Arc<S>>,
        command: &Command,
    ) -> Result<Reply, CardError> {
        let Some(session) = session else {
            tracing::debug!(kind = %command.kind(), "no session, command not sent");
            return Err(CardError::NoDevice);
        };
        let kind = command.kind();
        let (pending, mut rx) = PendingOperation::new(kind);
        let op = pending.id();
        tracing::debug!(%op, %kind, peer = %session.peer(), "executing command");

        let channel = CommandChannel::new(session);
        let stream = match channel.responses().await {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!(%op, %err, "failed to subscribe to replies");
                return Err(CardError::BleError(LinkFailure::Subscribe));
            }
        };
        let listener = Listener(tokio::spawn(listen(
            Arc::clone(&pending),
            Arc::clone(channel.session()),
            stream,
        )));

        if let Err(err) = channel.send(command).await {
            tracing::warn!(%op, %err, "command write failed");
            let reason = match err {
                SendError::Encode(_) => CommunicationFailure::Encode,
                SendError::Write(_) => CommunicationFailure::WriteRejected,
            };
            pending.resolve(Err(CardError::CommunicationFailed(reason)));
        }

        let received = match self.config.command_timeout {
            None => rx.await,
            Some(deadline) => match tokio::time::timeout(deadline, &mut rx).await {
                Ok(received) => received,
                Err(_) => {
                    tracing::warn!(%op, %kind, ?deadline, "reader did not reply in time");
                    pending.resolve(Err(CardError::CommunicationFailed(
                        CommunicationFailure::Timeout,
                    )));
                    rx.await
                }
            },
        };
        drop(listener);
        received.unwrap_or(Err(CardError::BleError(LinkFailure::StreamEnded)))
    }
}

/// Listener task, aborted when the call returns or is dropped.
struct Listener(JoinHandle<()>);

impl Drop for Listener {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Feed notifications into `pending` until it resolves or the link goes.
async fn listen<S: TransportSession>(
    pending: Arc<PendingOperation>,
    session: Arc<S>,
    mut stream: NotificationStream,
) {
    let closed = session.closed();
    tokio::pin!(closed);
    while !pending.is_completed() {
        tokio::select! {
            biased;
            event = stream.next() => match event {
                Some(event) => {
                    pending.on_notification(event);
                }
                None => {
                    pending.resolve(Err(CardError::BleError(LinkFailure::StreamEnded)));
                }
            },
            () = &mut closed => {
                tracing::debug!(op = %pending.id(), "session closed while command pending");
                pending.resolve(Err(CardError::BleError(LinkFailure::SessionClosed)));
            }
        }
    }
}
