//! Transport port — one wireless link to a card reader.
//!
//! A [`TransportSession`] is a connected link exposing the single command
//! characteristic: an acknowledged write and a notification stream. The
//! session does no request tagging; the protocol engine relies on at most
//! one command being outstanding per session.

use std::future::Future;
use std::pin::Pin;

use tokio_stream::Stream;

use cardlink_domain::error::TransportError;
use cardlink_domain::peer::PeerId;

/// One inbound event on the command characteristic: a payload, or a
/// transport-level error reported by the stack.
pub type Notification = Result<Vec<u8>, TransportError>;

/// Long-lived stream of [`Notification`]s for one subscription.
///
/// The stream ends when the subscription is torn down or the link closes.
pub type NotificationStream = Pin<Box<dyn Stream<Item = Notification> + Send>>;

/// A live link to one peer.
pub trait TransportSession: Send + Sync + 'static {
    /// Identity of the remote peer.
    fn peer(&self) -> &PeerId;

    /// Whether the underlying link is still up.
    fn is_connected(&self) -> impl Future<Output = bool> + Send;

    /// Write `payload` to the command characteristic with acknowledgement.
    ///
    /// Returns once the peer acknowledged receipt at the link level. This
    /// says nothing about the command having been processed.
    fn write(&self, payload: &[u8]) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Open a notification subscription on the command characteristic.
    fn subscribe(&self) -> impl Future<Output = Result<NotificationStream, TransportError>> + Send;

    /// Tear the link down.
    fn cancel(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Resolve once the link has closed, for whatever reason.
    ///
    /// May be awaited concurrently by several tasks; resolves immediately
    /// when the link is already closed.
    fn closed(&self) -> impl Future<Output = ()> + Send;
}

/// Factory of sessions.
pub trait Transport: Send + Sync + 'static {
    /// Session type produced by [`connect`](Self::connect).
    type Session: TransportSession;

    /// Connect to `peer`, discover its services, and return a live session.
    fn connect(
        &self,
        peer: &PeerId,
    ) -> impl Future<Output = Result<Self::Session, TransportError>> + Send;
}

impl<T: Transport> Transport for std::sync::Arc<T> {
    type Session = T::Session;

    fn connect(
        &self,
        peer: &PeerId,
    ) -> impl Future<Output = Result<Self::Session, TransportError>> + Send {
        (**self).connect(peer)
    }
}
