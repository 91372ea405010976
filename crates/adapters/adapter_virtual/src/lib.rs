//! # cardlink-adapter-virtual
//!
//! Virtual/demo adapter that simulates a card reader and the backend ledger
//! for testing and demonstration purposes.
//!
//! ## Provided pieces
//!
//! | Type | Port | Behaviour |
//! |------|------|-----------|
//! | [`VirtualCardReader`] | `Transport`, `Discovery` | Advertises as `Recharge-<machine number>`; answers `READ` / `INIT` / `RECHARGE` like the reader firmware |
//! | [`InMemoryLedger`] | `Ledger` | One wallet per registered machine |
//!
//! The reader can drop its link out of band, swap the card on the slot,
//! inject a device error or stop answering, so every failure path of the
//! app layer can be driven without hardware.
//!
//! ## Dependency rule
//!
//! Depends on `cardlink-app` (port traits) and `cardlink-domain` only.

mod devices;
mod ledger;

pub use devices::{CardSlot, SimulatedCard, VirtualSession};
pub use ledger::InMemoryLedger;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;

use cardlink_app::ports::{Discovery, Transport};
use cardlink_domain::error::TransportError;
use cardlink_domain::peer::{DEFAULT_NAME_PREFIX, Peer, PeerId};

use devices::Link;

/// A simulated card reader with one card slot.
pub struct VirtualCardReader {
    peer: Peer,
    neighbours: Vec<Peer>,
    prefix: String,
    slot: Arc<Mutex<CardSlot>>,
    link: Mutex<Option<Arc<Link>>>,
    connects: AtomicUsize,
}

impl VirtualCardReader {
    /// A reader advertising `Recharge-<machine_no>` with an initialized
    /// card holding 600 on its slot.
    #[must_use]
    pub fn new(machine_no: &str) -> Self {
        Self {
            peer: Peer {
                id: PeerId::new(format!("virtual-{machine_no}")),
                name: Some(format!("{DEFAULT_NAME_PREFIX}{machine_no}")),
                rssi: Some(-42),
            },
            neighbours: vec![Peer {
                id: PeerId::new("virtual-flower-care"),
                name: Some("Flower care".to_owned()),
                rssi: Some(-80),
            }],
            prefix: DEFAULT_NAME_PREFIX.to_owned(),
            slot: Arc::new(Mutex::new(CardSlot::with_card(SimulatedCard::with_balance(
                600,
            )))),
            link: Mutex::new(None),
            connects: AtomicUsize::new(0),
        }
    }

    /// Use `prefix` to filter scan results instead of the default one.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Identity the reader advertises.
    #[must_use]
    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    /// Direct access to the card slot.
    pub fn slot(&self) -> MutexGuard<'_, CardSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop the current link without anyone asking for it.
    pub fn drop_link(&self) {
        if let Some(link) = self.current_link() {
            tracing::info!(peer = %self.peer.id, "virtual reader dropping link");
            link.sever();
        }
    }

    /// Whether a session is currently linked.
    #[must_use]
    pub fn is_linked(&self) -> bool {
        self.current_link().is_some_and(|link| !link.is_closed())
    }

    /// Number of connections accepted so far.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    fn current_link(&self) -> Option<Arc<Link>> {
        self.link
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Transport for VirtualCardReader {
    type Session = VirtualSession;

    async fn connect(&self, peer: &PeerId) -> Result<VirtualSession, TransportError> {
        if *peer != self.peer.id {
            return Err(TransportError::PeerNotFound(peer.clone()));
        }
        let link = Link::new();
        let previous = self
            .link
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Arc::clone(&link));
        if let Some(previous) = previous {
            previous.sever();
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(%peer, "virtual reader connected");
        Ok(VirtualSession::new(peer.clone(), Arc::clone(&self.slot), link))
    }
}

impl Discovery for VirtualCardReader {
    /// Report every advertiser matching the prefix at once; `duration` is
    /// not waited for.
    async fn scan(&self, _duration: Duration, found: mpsc::Sender<Peer>) -> Result<(), TransportError> {
        let advertisers = std::iter::once(&self.peer).chain(&self.neighbours);
        for peer in advertisers.filter(|peer| peer.matches_prefix(&self.prefix)) {
            if found.send(peer.clone()).await.is_err() {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardlink_app::ports::TransportSession;
    use tokio_stream::StreamExt as _;

    #[tokio::test]
    async fn should_discover_only_readers() {
        let reader = VirtualCardReader::new("42");

        let peers = reader.scan_all(Duration::from_secs(1)).await.unwrap();

        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].machine_no(DEFAULT_NAME_PREFIX), Some("42"));
    }

    #[tokio::test]
    async fn should_refuse_unknown_peer() {
        let reader = VirtualCardReader::new("42");
        let err = reader.connect(&PeerId::new("elsewhere")).await.err().unwrap();
        assert!(matches!(err, TransportError::PeerNotFound(_)));
    }

    #[tokio::test]
    async fn should_notify_reply_to_subscriber() {
        let reader = VirtualCardReader::new("42");
        let session = reader.connect(&reader.peer().id).await.unwrap();
        let mut replies = session.subscribe().await.unwrap();

        session
            .write(br#"{"command":"RECHARGE","amount":100}"#)
            .await
            .unwrap();

        let reply = replies.next().await.unwrap().unwrap();
        assert_eq!(
            String::from_utf8(reply).unwrap(),
            r#"{"status":"SUCCESS","updated_balance":700}"#
        );
    }

    #[tokio::test]
    async fn should_close_session_on_out_of_band_drop() {
        let reader = VirtualCardReader::new("42");
        let session = reader.connect(&reader.peer().id).await.unwrap();
        let mut replies = session.subscribe().await.unwrap();

        reader.drop_link();

        session.closed().await;
        assert!(replies.next().await.is_none());
        assert!(!session.is_connected().await);
        assert!(!reader.is_linked());
        assert!(matches!(
            session.write(br#"{"command":"READ"}"#).await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn should_sever_previous_link_on_reconnect() {
        let reader = VirtualCardReader::new("42");
        let first = reader.connect(&reader.peer().id).await.unwrap();
        let _second = reader.connect(&reader.peer().id).await.unwrap();

        assert!(!first.is_connected().await);
        assert!(reader.is_linked());
        assert_eq!(reader.connect_count(), 2);
    }

    #[tokio::test]
    async fn should_keep_card_state_across_sessions() {
        let reader = VirtualCardReader::new("42");
        reader.slot().insert(SimulatedCard::blank());

        let session = reader.connect(&reader.peer().id).await.unwrap();
        session
            .write(br#"{"command":"INIT","amount":500}"#)
            .await
            .unwrap();
        session.cancel().await.unwrap();

        assert_eq!(reader.slot().card().unwrap().balance, 500);
    }
}
