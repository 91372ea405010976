//! Command channel — the one characteristic every command shares.
//!
//! Requests go out as acknowledged writes of UTF-8 JSON; replies come back
//! on the notification stream of the same characteristic. The channel adds
//! no correlation of its own.

use std::sync::Arc;

use cardlink_domain::command::Command;
use cardlink_domain::error::TransportError;

use crate::ports::{NotificationStream, TransportSession};

/// Why a request could not be handed to the peer.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The request could not be serialized.
    #[error("failed to encode command")]
    Encode(#[source] serde_json::Error),

    /// The acknowledged write was rejected.
    #[error("command write rejected")]
    Write(#[source] TransportError),
}

/// Request/notification pair over one session.
pub struct CommandChannel<S> {
    session: Arc<S>,
}

impl<S: TransportSession> CommandChannel<S> {
    /// Wrap a live session.
    #[must_use]
    pub fn new(session: Arc<S>) -> Self {
        Self { session }
    }

    /// The session this channel writes to.
    #[must_use]
    pub fn session(&self) -> &Arc<S> {
        &self.session
    }

    /// Open a notification subscription for replies.
    ///
    /// Must be called before [`send`](Self::send) so a fast reply is not
    /// missed.
    ///
    /// # Errors
    ///
    /// Returns the transport error when the subscription cannot be set up.
    pub async fn responses(&self) -> Result<NotificationStream, TransportError> {
        self.session.subscribe().await
    }

    /// Encode `command` and write it with acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Encode`] or [`SendError::Write`].
    pub async fn send(&self, command: &Command) -> Result<(), SendError> {
        let payload = command.encode().map_err(SendError::Encode)?;
        tracing::trace!(
            peer = %self.session.peer(),
            bytes = payload.len(),
            "writing command"
        );
        self.session
            .write(&payload)
            .await
            .map_err(SendError::Write)
    }
}
