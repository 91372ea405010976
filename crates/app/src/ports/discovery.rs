//! Discovery port — find card readers nearby.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;

use cardlink_domain::error::TransportError;
use cardlink_domain::peer::Peer;

/// Scans for readers.
///
/// Implementations only report peers whose advertised name carries the
/// reader prefix, and report each peer id at most once per scan.
pub trait Discovery: Send + Sync {
    /// Scan for `duration`, sending every matching peer into `found`.
    ///
    /// Returns when the scan has stopped. A closed `found` receiver stops
    /// the scan early without error.
    fn scan(
        &self,
        duration: Duration,
        found: mpsc::Sender<Peer>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Scan for `duration` and collect every matching peer.
    fn scan_all(
        &self,
        duration: Duration,
    ) -> impl Future<Output = Result<Vec<Peer>, TransportError>> + Send
    where
        Self: Sized,
    {
        async move {
            let (tx, mut rx) = mpsc::channel(16);
            let collect = async {
                let mut peers = Vec::new();
                while let Some(peer) = rx.recv().await {
                    peers.push(peer);
                }
                peers
            };
            let (scanned, peers) = tokio::join!(self.scan(duration, tx), collect);
            scanned.map(|()| peers)
        }
    }
}

impl<T: Discovery> Discovery for std::sync::Arc<T> {
    fn scan(
        &self,
        duration: Duration,
        found: mpsc::Sender<Peer>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        (**self).scan(duration, found)
    }
}
