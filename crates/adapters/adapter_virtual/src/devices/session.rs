//! Virtual GATT link to the simulated reader.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;

use cardlink_app::ports::{Notification, NotificationStream, TransportSession};
use cardlink_domain::error::TransportError;
use cardlink_domain::peer::PeerId;

use super::card::CardSlot;

/// One connection's worth of link state.
pub(crate) struct Link {
    closed: watch::Sender<bool>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Notification>>>,
}

impl Link {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            closed: watch::Sender::new(false),
            subscribers: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Close the link; subscriber streams end.
    pub(crate) fn sever(&self) {
        self.closed.send_replace(true);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn notify(&self, payload: &[u8]) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| tx.send(Ok(payload.to_vec())).is_ok());
    }
}

/// Session handed out by [`VirtualCardReader`](crate::VirtualCardReader).
pub struct VirtualSession {
    peer: PeerId,
    slot: Arc<Mutex<CardSlot>>,
    link: Arc<Link>,
}

impl VirtualSession {
    pub(crate) fn new(peer: PeerId, slot: Arc<Mutex<CardSlot>>, link: Arc<Link>) -> Self {
        Self { peer, slot, link }
    }
}

impl TransportSession for VirtualSession {
    fn peer(&self) -> &PeerId {
        &self.peer
    }

    async fn is_connected(&self) -> bool {
        !self.link.is_closed()
    }

    async fn write(&self, payload: &[u8]) -> Result<(), TransportError> {
        if self.link.is_closed() {
            return Err(TransportError::NotConnected);
        }
        let reply = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handle(payload);
        if let Some(reply) = reply {
            tracing::trace!(peer = %self.peer, %reply, "virtual reader replying");
            self.link.notify(reply.to_string().as_bytes());
        }
        Ok(())
    }

    async fn subscribe(&self) -> Result<NotificationStream, TransportError> {
        if self.link.is_closed() {
            return Err(TransportError::NotConnected);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.link
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn cancel(&self) -> Result<(), TransportError> {
        self.link.sever();
        Ok(())
    }

    fn closed(&self) -> impl Future<Output = ()> + Send {
        let mut rx = self.link.closed.subscribe();
        async move {
            let _ = rx.wait_for(|closed| *closed).await;
        }
    }
}
