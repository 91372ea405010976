//! Scripted in-memory transport and ledger for unit tests.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::sync::{mpsc, oneshot, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;

use cardlink_domain::amount::{Amount, Balance};
use cardlink_domain::error::{LedgerError, TransportError};
use cardlink_domain::peer::PeerId;

use crate::ports::{Ledger, Notification, NotificationStream, Transport, TransportSession};

/// One scripted inbound event.
#[derive(Debug, Clone)]
pub(crate) enum Frame {
    Bytes(Vec<u8>),
    Error,
}

impl Frame {
    pub(crate) fn json(text: &str) -> Self {
        Self::Bytes(text.as_bytes().to_vec())
    }

    fn into_notification(self) -> Notification {
        match self {
            Self::Bytes(bytes) => Ok(bytes),
            Self::Error => Err(TransportError::Link("scripted notification error".into())),
        }
    }
}

/// Session whose replies are scripted per write.
#[derive(Debug)]
pub(crate) struct ScriptedSession {
    peer: PeerId,
    writes: Mutex<Vec<Vec<u8>>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Notification>>>,
    replies: Mutex<VecDeque<Vec<Frame>>>,
    fail_writes: AtomicBool,
    cancels: AtomicUsize,
    closed: watch::Sender<bool>,
}

impl ScriptedSession {
    pub(crate) fn new(peer: &str) -> Self {
        Self {
            peer: PeerId::new(peer),
            writes: Mutex::new(Vec::new()),
            subscribers: Mutex::new(Vec::new()),
            replies: Mutex::new(VecDeque::new()),
            fail_writes: AtomicBool::new(false),
            cancels: AtomicUsize::new(0),
            closed: watch::Sender::new(false),
        }
    }

    /// Queue the frames notified in response to the next write.
    pub(crate) fn reply_with(&self, frames: Vec<Frame>) {
        lock(&self.replies).push_back(frames);
    }

    /// Notify every current subscriber right now.
    pub(crate) fn push(&self, frame: Frame) {
        let subscribers = lock(&self.subscribers);
        for tx in subscribers.iter() {
            let _ = tx.send(frame.clone().into_notification());
        }
    }

    pub(crate) fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Simulate the link going away without anyone asking for it.
    pub(crate) fn drop_link(&self) {
        self.closed.send_replace(true);
        lock(&self.subscribers).clear();
    }

    pub(crate) fn write_count(&self) -> usize {
        lock(&self.writes).len()
    }

    pub(crate) fn written_text(&self) -> Vec<String> {
        lock(&self.writes)
            .iter()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .collect()
    }

    pub(crate) fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    /// Subscribers whose stream is still held.
    pub(crate) fn subscriber_count(&self) -> usize {
        lock(&self.subscribers)
            .iter()
            .filter(|tx| !tx.is_closed())
            .count()
    }
}

impl TransportSession for ScriptedSession {
    fn peer(&self) -> &PeerId {
        &self.peer
    }

    async fn is_connected(&self) -> bool {
        !*self.closed.borrow()
    }

    async fn write(&self, payload: &[u8]) -> Result<(), TransportError> {
        if *self.closed.borrow() {
            return Err(TransportError::NotConnected);
        }
        lock(&self.writes).push(payload.to_vec());
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::Link("scripted write failure".into()));
        }
        let frames = lock(&self.replies).pop_front().unwrap_or_default();
        for frame in frames {
            self.push(frame);
        }
        Ok(())
    }

    async fn subscribe(&self) -> Result<NotificationStream, TransportError> {
        if *self.closed.borrow() {
            return Err(TransportError::NotConnected);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.subscribers).push(tx);
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn cancel(&self) -> Result<(), TransportError> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        self.drop_link();
        Ok(())
    }

    fn closed(&self) -> impl Future<Output = ()> + Send {
        let mut rx = self.closed.subscribe();
        async move {
            let _ = rx.wait_for(|closed| *closed).await;
        }
    }
}

/// Transport handing out fresh scripted sessions.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    refuse: AtomicBool,
    connects: AtomicUsize,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl ScriptedTransport {
    pub(crate) fn refuse_connections(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }

    pub(crate) fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Make the next connect wait until the returned sender fires.
    pub(crate) fn hold_connections(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *lock(&self.gate) = Some(rx);
        tx
    }
}

impl Transport for ScriptedTransport {
    type Session = ScriptedSession;

    async fn connect(&self, peer: &PeerId) -> Result<ScriptedSession, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let gate = lock(&self.gate).take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if self.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::PeerNotFound(peer.clone()));
        }
        Ok(ScriptedSession::new(peer.as_str()))
    }
}

/// Ledger that records calls and can be told to fail.
#[derive(Default)]
pub(crate) struct RecordingLedger {
    pub(crate) calls: Mutex<Vec<(String, String, u32)>>,
    fail: AtomicBool,
}

impl RecordingLedger {
    pub(crate) fn fail_requests(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    fn record(&self, op: &str, machine_no: &str, amount: Amount) -> Result<(), LedgerError> {
        lock(&self.calls).push((op.to_owned(), machine_no.to_owned(), amount.value()));
        if self.fail.load(Ordering::SeqCst) {
            return Err(LedgerError::Rejected("scripted ledger failure".to_owned()));
        }
        Ok(())
    }
}

impl Ledger for RecordingLedger {
    async fn fetch_remote_balance(&self, machine_no: &str) -> Result<Balance, LedgerError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(LedgerError::UnknownMachine(machine_no.to_owned()));
        }
        Ok(Balance::new(1_000))
    }

    async fn apply_recharge(&self, machine_no: &str, amount: Amount) -> Result<(), LedgerError> {
        self.record("recharge", machine_no, amount)
    }

    async fn apply_initialize(&self, machine_no: &str, amount: Amount) -> Result<(), LedgerError> {
        self.record("initialize", machine_no, amount)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
