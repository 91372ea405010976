//! # cardlink-adapter-ble
//!
//! BLE adapter — talks to card readers through `btleplug`.
//!
//! ## How it works
//!
//! Readers advertise as `Recharge-<machine number>` and expose one GATT
//! service with one characteristic. Commands are written to it with
//! response; replies arrive as notifications on the same characteristic.
//!
//! | Item | UUID |
//! |------|------|
//! | Service | `4fafc201-1fb5-459e-8fcc-c5c9c331914b` |
//! | Characteristic | `beb5483e-36e1-4688-b7f5-ea07361b26a8` |
//!
//! [`BleTransport`] implements both the `Transport` and the `Discovery`
//! ports on top of the host's first adapter.
//!
//! ## Dependency rule
//!
//! Same as other adapters: depends on `cardlink-app` and `cardlink-domain`.

mod config;
mod error;
mod gatt;
mod scanner;

pub use config::{BleConfig, DEFAULT_CHARACTERISTIC_UUID, DEFAULT_SERVICE_UUID};
pub use error::BleError;
pub use gatt::BtleplugSession;

use std::time::Duration;

use btleplug::api::{Central, Manager as _, Peripheral as _};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tokio::sync::mpsc;

use cardlink_app::ports::{Discovery, Transport};
use cardlink_domain::error::TransportError;
use cardlink_domain::peer::{Peer, PeerId};

/// Card reader transport over the host's first BLE adapter.
pub struct BleTransport {
    central: Adapter,
    config: BleConfig,
}

impl BleTransport {
    /// Open the host's first BLE adapter.
    ///
    /// # Errors
    ///
    /// Returns [`BleError::NotAvailable`] when the host has no adapter, or
    /// [`BleError::Scan`] when the BLE stack cannot be reached.
    pub async fn open(config: BleConfig) -> Result<Self, BleError> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;
        let central = adapters.into_iter().next().ok_or(BleError::NotAvailable)?;
        tracing::debug!(prefix = %config.name_prefix, "BLE adapter opened");
        Ok(Self { central, config })
    }

    #[must_use]
    pub fn config(&self) -> &BleConfig {
        &self.config
    }

    /// Look up `peer`, scanning for it when the adapter has not seen it yet.
    async fn find_peripheral(&self, peer: &PeerId) -> Result<Peripheral, BleError> {
        if let Some(peripheral) = self.cached_peripheral(peer).await? {
            return Ok(peripheral);
        }
        let duration = Duration::from_secs(u64::from(self.config.scan_duration_secs));
        if scanner::seek_peer(&self.central, peer, duration).await?
            && let Some(peripheral) = self.cached_peripheral(peer).await?
        {
            return Ok(peripheral);
        }
        Err(BleError::PeripheralNotFound(peer.clone()))
    }

    async fn cached_peripheral(&self, peer: &PeerId) -> Result<Option<Peripheral>, BleError> {
        let peripherals = self.central.peripherals().await?;
        Ok(peripherals
            .into_iter()
            .find(|peripheral| peripheral.id().to_string() == peer.as_str()))
    }

    async fn connect_peer(&self, peer: &PeerId) -> Result<BtleplugSession, BleError> {
        if let Err(err) = self.central.stop_scan().await {
            tracing::trace!(%err, "no scan to stop before connecting");
        }
        let peripheral = self.find_peripheral(peer).await?;
        gatt::open_session(
            &self.central,
            peripheral,
            peer.clone(),
            self.config.service_uuid,
            self.config.characteristic_uuid,
            Duration::from_secs(u64::from(self.config.connect_timeout_secs)),
        )
        .await
    }
}

impl Transport for BleTransport {
    type Session = BtleplugSession;

    async fn connect(&self, peer: &PeerId) -> Result<BtleplugSession, TransportError> {
        self.connect_peer(peer).await.map_err(|err| {
            tracing::warn!(%peer, %err, "BLE connect failed");
            err.into_domain()
        })
    }
}

impl Discovery for BleTransport {
    async fn scan(&self, duration: Duration, found: mpsc::Sender<Peer>) -> Result<(), TransportError> {
        scanner::run_scan(&self.central, &self.config.name_prefix, duration, found)
            .await
            .map_err(BleError::into_domain)
    }
}
