//! BLE scanner — discovers card readers by advertised name.

use std::collections::HashSet;
use std::time::Duration;

use btleplug::api::{Central, CentralEvent, Peripheral as _, ScanFilter};
use btleplug::platform::Adapter;
use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt as _};

use cardlink_domain::peer::{Peer, PeerId};

use crate::error::BleError;

/// Per-scan filter: prefix match and one report per peer.
pub(crate) struct PeerFilter<'a> {
    prefix: &'a str,
    seen: HashSet<PeerId>,
}

impl<'a> PeerFilter<'a> {
    pub(crate) fn new(prefix: &'a str) -> Self {
        Self {
            prefix,
            seen: HashSet::new(),
        }
    }

    /// Return the peer if it is a reader not reported yet.
    ///
    /// A peer without a matching name is not remembered: its name may show
    /// up in a later advertisement.
    pub(crate) fn accept(&mut self, peer: Peer) -> Option<Peer> {
        if !peer.matches_prefix(self.prefix) {
            tracing::trace!(id = %peer.id, name = ?peer.name, "ignoring non-reader peripheral");
            return None;
        }
        if !self.seen.insert(peer.id.clone()) {
            return None;
        }
        Some(peer)
    }
}

/// Run one scan for `duration`, sending each reader into `found`.
///
/// # Errors
///
/// Returns [`BleError`] when the scan cannot be started or stopped.
pub(crate) async fn run_scan(
    central: &Adapter,
    prefix: &str,
    duration: Duration,
    found: mpsc::Sender<Peer>,
) -> Result<(), BleError> {
    let mut events = central.events().await?;
    central.start_scan(ScanFilter::default()).await?;
    tracing::info!(duration_secs = duration.as_secs(), %prefix, "BLE scan started");

    let mut filter = PeerFilter::new(prefix);
    let mut reported = 0_usize;
    let deadline = tokio::time::Instant::now() + duration;

    while tokio::time::Instant::now() < deadline {
        let remaining = deadline - tokio::time::Instant::now();
        match tokio::time::timeout(remaining, events.next()).await {
            Ok(Some(CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id))) => {
                let Ok(peripheral) = central.peripheral(&id).await else {
                    continue;
                };
                let Ok(Some(props)) = peripheral.properties().await else {
                    continue;
                };
                let peer = Peer {
                    id: PeerId::new(id.to_string()),
                    name: props.local_name,
                    rssi: props.rssi,
                };
                let Some(peer) = filter.accept(peer) else {
                    continue;
                };
                tracing::debug!(id = %peer.id, name = ?peer.name, rssi = ?peer.rssi, "reader found");
                reported += 1;
                if found.send(peer).await.is_err() {
                    tracing::debug!("scan receiver dropped, stopping early");
                    break;
                }
            }
            Ok(Some(_)) => {}
            Ok(None) | Err(_) => break,
        }
    }

    central.stop_scan().await?;
    tracing::info!(count = reported, "BLE scan complete");
    Ok(())
}

/// Scan until `wanted` advertises or `duration` runs out.
///
/// Used when connecting to a peer the adapter has not cached yet.
///
/// # Errors
///
/// Returns [`BleError`] when the scan cannot be started or stopped.
pub(crate) async fn seek_peer(
    central: &Adapter,
    wanted: &PeerId,
    duration: Duration,
) -> Result<bool, BleError> {
    let events = central.events().await?;
    central.start_scan(ScanFilter::default()).await?;
    tracing::debug!(%wanted, duration_secs = duration.as_secs(), "seeking peripheral");
    let ids = events.filter_map(|event| match event {
        CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => Some(id.to_string()),
        _ => None,
    });
    let seen = wait_for_id(ids, wanted, duration).await;
    central.stop_scan().await?;
    Ok(seen)
}

/// Whether `wanted` shows up on `ids` before `duration` elapses.
async fn wait_for_id<S>(ids: S, wanted: &PeerId, duration: Duration) -> bool
where
    S: Stream<Item = String>,
{
    let search = async {
        tokio::pin!(ids);
        while let Some(id) = ids.next().await {
            if id == wanted.as_str() {
                return true;
            }
        }
        false
    };
    tokio::time::timeout(duration, search).await.unwrap_or(false)
}
