//! GATT session — one connected card reader.
//!
//! [`open_session`] connects, discovers services, subscribes to the command
//! characteristic and starts a task that watches the adapter event stream
//! for the peripheral's disconnection. Setup failures always disconnect.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use btleplug::api::{Central, CentralEvent, Characteristic, Peripheral as _, WriteType};
use btleplug::platform::{Adapter, Peripheral};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt as _;

use cardlink_app::ports::{NotificationStream, TransportSession};
use cardlink_domain::error::TransportError;
use cardlink_domain::peer::PeerId;

use crate::error::BleError;

/// Find a GATT characteristic by UUID on a peripheral that has already
/// discovered its services.
///
/// # Errors
///
/// Returns [`BleError::CharacteristicNotFound`] if no characteristic with
/// the given UUID is present under `service`.
fn find_characteristic(
    peripheral: &Peripheral,
    service: uuid::Uuid,
    uuid: uuid::Uuid,
) -> Result<Characteristic, BleError> {
    peripheral
        .characteristics()
        .into_iter()
        .find(|c| c.service_uuid == service && c.uuid == uuid)
        .ok_or(BleError::CharacteristicNotFound { uuid })
}

/// A connected reader exposing its command characteristic.
pub struct BtleplugSession {
    peer: PeerId,
    peripheral: Peripheral,
    characteristic: Characteristic,
    closed: Arc<watch::Sender<bool>>,
    watcher: JoinHandle<()>,
}

/// Connect to `peripheral` and prepare the command characteristic.
///
/// # Errors
///
/// Returns [`BleError::ConnectTimeout`] when the link is not up within
/// `timeout`, [`BleError::GattConnect`] if the connection fails, or
/// [`BleError::CharacteristicNotFound`] / [`BleError::Scan`] for setup
/// failures.
pub(crate) async fn open_session(
    central: &Adapter,
    peripheral: Peripheral,
    peer: PeerId,
    service: uuid::Uuid,
    characteristic: uuid::Uuid,
    timeout: Duration,
) -> Result<BtleplugSession, BleError> {
    tokio::time::timeout(timeout, peripheral.connect())
        .await
        .map_err(|_| BleError::ConnectTimeout)?
        .map_err(BleError::GattConnect)?;

    let setup = async {
        peripheral.discover_services().await?;
        let characteristic = find_characteristic(&peripheral, service, characteristic)?;
        peripheral.subscribe(&characteristic).await?;
        let events = central.events().await?;
        Ok::<_, BleError>((characteristic, events))
    };
    let (characteristic, mut events) = match tokio::time::timeout(timeout, setup).await {
        Ok(Ok(ready)) => ready,
        Ok(Err(err)) => {
            disconnect_quietly(&peripheral).await;
            return Err(err);
        }
        Err(_) => {
            disconnect_quietly(&peripheral).await;
            return Err(BleError::ConnectTimeout);
        }
    };

    let closed = Arc::new(watch::Sender::new(false));
    let watcher = tokio::spawn({
        let closed = Arc::clone(&closed);
        let id = peripheral.id();
        let peer = peer.clone();
        async move {
            while let Some(event) = events.next().await {
                if let CentralEvent::DeviceDisconnected(gone) = event
                    && gone == id
                {
                    tracing::debug!(%peer, "peripheral disconnected");
                    break;
                }
            }
            closed.send_replace(true);
        }
    });

    tracing::debug!(%peer, "session ready");
    Ok(BtleplugSession {
        peer,
        peripheral,
        characteristic,
        closed,
        watcher,
    })
}

async fn disconnect_quietly(peripheral: &Peripheral) {
    if let Err(err) = peripheral.disconnect().await {
        tracing::warn!(%err, "failed to disconnect peripheral after setup failure");
    }
}

impl TransportSession for BtleplugSession {
    fn peer(&self) -> &PeerId {
        &self.peer
    }

    async fn is_connected(&self) -> bool {
        if *self.closed.borrow() {
            return false;
        }
        self.peripheral.is_connected().await.unwrap_or(false)
    }

    async fn write(&self, payload: &[u8]) -> Result<(), TransportError> {
        self.peripheral
            .write(&self.characteristic, payload, WriteType::WithResponse)
            .await
            .map_err(|err| BleError::from(err).into_domain())
    }

    async fn subscribe(&self) -> Result<NotificationStream, TransportError> {
        let uuid = self.characteristic.uuid;
        let notifications = self
            .peripheral
            .notifications()
            .await
            .map_err(|err| BleError::from(err).into_domain())?;
        Ok(Box::pin(notifications.filter_map(move |notification| {
            (notification.uuid == uuid).then_some(Ok(notification.value))
        })))
    }

    async fn cancel(&self) -> Result<(), TransportError> {
        let result = self.peripheral.disconnect().await;
        self.closed.send_replace(true);
        result.map_err(|err| BleError::from(err).into_domain())
    }

    fn closed(&self) -> impl Future<Output = ()> + Send {
        let mut rx = self.closed.subscribe();
        async move {
            let _ = rx.wait_for(|closed| *closed).await;
        }
    }
}

impl Drop for BtleplugSession {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}
