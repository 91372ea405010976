//! Connection lifecycle — the one live session and its drop monitor.
//!
//! ```text
//! Absent -> Connecting -> Connected -> Disconnecting -> Absent
//!                                  \-> DroppedUnexpectedly -> Absent
//! ```
//!
//! The manager is an ordinary value owned by the composition root. Every
//! session gets a watcher task waiting on [`TransportSession::closed`]; a
//! generation counter tells the watcher whether the close it saw was
//! requested (disconnect, reconnect) or happened out of band.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;

use cardlink_domain::error::ConnectionError;
use cardlink_domain::event::{ConnectionEvent, ConnectionEventKind};
use cardlink_domain::peer::PeerId;

use crate::ports::{EventPublisher, Transport, TransportSession};

/// State of the single session slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Absent,
    Connecting,
    Connected,
    Disconnecting,
    DroppedUnexpectedly,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Absent => "absent",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
            Self::DroppedUnexpectedly => "dropped",
        })
    }
}

/// Anything that can hand out the current live session.
pub trait SessionSource: Send + Sync {
    type Session: TransportSession;

    /// The live session, if any. Never blocks.
    fn current_session(&self) -> Option<Arc<Self::Session>>;
}

type DropCallback = Box<dyn FnOnce(PeerId) + Send>;

struct Slot<S> {
    state: LinkState,
    session: Option<Arc<S>>,
    generation: u64,
    watcher: Option<JoinHandle<()>>,
}

impl<S> Slot<S> {
    fn transition(&mut self, to: LinkState) {
        tracing::trace!(from = %self.state, %to, "link state");
        self.state = to;
    }

    fn stop_watching(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

struct Shared<S, P> {
    slot: Mutex<Slot<S>>,
    on_drop: Mutex<Option<DropCallback>>,
    publisher: P,
}

impl<S: TransportSession, P: EventPublisher> Shared<S, P> {
    fn publish(&self, kind: ConnectionEventKind, peer: &PeerId) {
        self.publisher.publish(ConnectionEvent::new(kind, peer.clone()));
    }
}

/// Owns at most one live session.
pub struct ConnectionManager<T: Transport, P> {
    transport: T,
    shared: Arc<Shared<T::Session, P>>,
}

impl<T, P> ConnectionManager<T, P>
where
    T: Transport,
    P: EventPublisher + 'static,
{
    /// Create a manager with no session.
    pub fn new(transport: T, publisher: P) -> Self {
        Self {
            transport,
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot {
                    state: LinkState::Absent,
                    session: None,
                    generation: 0,
                    watcher: None,
                }),
                on_drop: Mutex::new(None),
                publisher,
            }),
        }
    }

    /// Connect to `peer`, replacing any existing session.
    ///
    /// The previous session is cancelled and awaited first. Its close is
    /// reported as a disconnect, not a drop.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::InProgress`] while another connect runs.
    /// - [`ConnectionError::Connect`] when the transport fails.
    /// - [`ConnectionError::Superseded`] when a disconnect ran meanwhile;
    ///   the fresh session is cancelled.
    #[tracing::instrument(skip(self, peer), fields(%peer))]
    pub async fn connect(&self, peer: &PeerId) -> Result<Arc<T::Session>, ConnectionError> {
        let (previous, generation) = {
            let mut slot = lock(&self.shared.slot);
            if slot.state == LinkState::Connecting {
                return Err(ConnectionError::InProgress);
            }
            slot.generation += 1;
            slot.stop_watching();
            slot.transition(LinkState::Connecting);
            (slot.session.take(), slot.generation)
        };

        if let Some(previous) = previous {
            tracing::debug!(old = %previous.peer(), "cancelling previous session");
            if let Err(err) = previous.cancel().await {
                tracing::warn!(old = %previous.peer(), %err, "failed to cancel previous session");
            }
            self.shared
                .publish(ConnectionEventKind::Disconnected, previous.peer());
        }

        let session = match self.transport.connect(peer).await {
            Ok(session) => Arc::new(session),
            Err(source) => {
                let mut slot = lock(&self.shared.slot);
                if slot.generation == generation {
                    slot.transition(LinkState::Absent);
                }
                return Err(ConnectionError::Connect {
                    peer: peer.clone(),
                    source,
                });
            }
        };

        let installed = {
            let mut slot = lock(&self.shared.slot);
            let current = slot.generation == generation;
            if current {
                slot.session = Some(Arc::clone(&session));
                slot.watcher = Some(tokio::spawn(watch_link(
                    Arc::clone(&self.shared),
                    Arc::clone(&session),
                    generation,
                )));
                slot.transition(LinkState::Connected);
            }
            current
        };
        if !installed {
            tracing::debug!("connect superseded, releasing fresh session");
            if let Err(err) = session.cancel().await {
                tracing::warn!(%err, "failed to cancel superseded session");
            }
            return Err(ConnectionError::Superseded(peer.clone()));
        }

        tracing::info!("connected");
        self.shared.publish(ConnectionEventKind::Connected, peer);
        Ok(session)
    }

    /// Tear down the current session, if any.
    ///
    /// Idempotent. Never fires the drop monitor. A command pending on the
    /// session resolves as soon as the link closes.
    #[tracing::instrument(skip(self))]
    pub async fn disconnect(&self) {
        let session = {
            let mut slot = lock(&self.shared.slot);
            slot.generation += 1;
            slot.stop_watching();
            let Some(session) = slot.session.take() else {
                slot.transition(LinkState::Absent);
                return;
            };
            slot.transition(LinkState::Disconnecting);
            session
        };

        if let Err(err) = session.cancel().await {
            tracing::warn!(peer = %session.peer(), %err, "failed to cancel session");
        }
        {
            let mut slot = lock(&self.shared.slot);
            if slot.state == LinkState::Disconnecting {
                slot.transition(LinkState::Absent);
            }
        }
        tracing::info!(peer = %session.peer(), "disconnected");
        self.shared
            .publish(ConnectionEventKind::Disconnected, session.peer());
    }

    /// Arm the drop monitor, replacing any previous callback.
    ///
    /// `on_drop` runs at most once, for the first link loss not caused by
    /// [`disconnect`](Self::disconnect) or a reconnect. The session slot
    /// is already empty when it runs.
    pub fn monitor<F>(&self, on_drop: F)
    where
        F: FnOnce(PeerId) + Send + 'static,
    {
        let previous = lock(&self.shared.on_drop).replace(Box::new(on_drop));
        if previous.is_some() {
            tracing::debug!("replaced drop monitor");
        }
    }

    /// Disarm the drop monitor. The session is left alone.
    pub fn unmonitor(&self) {
        lock(&self.shared.on_drop).take();
    }

    /// Current state of the slot.
    #[must_use]
    pub fn state(&self) -> LinkState {
        lock(&self.shared.slot).state
    }

    /// The live session, if connected.
    #[must_use]
    pub fn current_session(&self) -> Option<Arc<T::Session>> {
        let slot = lock(&self.shared.slot);
        match slot.state {
            LinkState::Connected => slot.session.clone(),
            _ => None,
        }
    }
}

impl<T, P> SessionSource for ConnectionManager<T, P>
where
    T: Transport,
    P: EventPublisher + 'static,
{
    type Session = T::Session;

    fn current_session(&self) -> Option<Arc<T::Session>> {
        ConnectionManager::current_session(self)
    }
}

/// Wait for `session` to close and report it as a drop unless the
/// generation moved on.
async fn watch_link<S, P>(shared: Arc<Shared<S, P>>, session: Arc<S>, generation: u64)
where
    S: TransportSession,
    P: EventPublisher,
{
    session.closed().await;

    let callback = {
        let mut slot = lock(&shared.slot);
        if slot.generation != generation || slot.state != LinkState::Connected {
            return;
        }
        slot.transition(LinkState::DroppedUnexpectedly);
        slot.session = None;
        slot.watcher = None;
        slot.transition(LinkState::Absent);
        lock(&shared.on_drop).take()
    };

    let peer = session.peer().clone();
    tracing::warn!(%peer, "link dropped unexpectedly");
    shared.publish(ConnectionEventKind::Dropped, &peer);
    if let Some(on_drop) = callback {
        on_drop(peer);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
