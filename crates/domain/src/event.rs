//! Connection events — what screens subscribe to instead of polling.

use crate::peer::PeerId;
use crate::time::{Timestamp, now};

/// Why a session ended or started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEventKind {
    /// A session became live.
    Connected,
    /// The operator disconnected on purpose.
    Disconnected,
    /// The link dropped without a disconnect request.
    Dropped,
}

/// An immutable record of a session lifecycle change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEvent {
    /// What happened.
    pub kind: ConnectionEventKind,
    /// Peer the session belonged to.
    pub peer: PeerId,
    /// When it was observed.
    pub at: Timestamp,
}

impl ConnectionEvent {
    /// Create an event stamped with the current time.
    #[must_use]
    pub fn new(kind: ConnectionEventKind, peer: PeerId) -> Self {
        Self {
            kind,
            peer,
            at: now(),
        }
    }
}
