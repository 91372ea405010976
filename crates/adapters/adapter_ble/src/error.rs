//! BLE adapter error types.

use cardlink_domain::error::TransportError;
use cardlink_domain::peer::PeerId;

/// Errors specific to the BLE adapter.
#[derive(Debug, thiserror::Error)]
pub enum BleError {
    /// No BLE adapter found on the host.
    #[error("no BLE adapter available")]
    NotAvailable,

    /// BLE scan or adapter operation failed.
    #[error("BLE operation failed")]
    Scan(#[from] btleplug::Error),

    /// Connecting to the peripheral failed.
    #[error("failed to connect to peripheral")]
    GattConnect(#[source] btleplug::Error),

    /// Connecting did not finish within the configured timeout.
    #[error("connecting to peripheral timed out")]
    ConnectTimeout,

    /// The peripheral is not known to the adapter (not scanned yet).
    #[error("peripheral {0} not found")]
    PeripheralNotFound(PeerId),

    /// The command characteristic is missing from the peripheral.
    #[error("characteristic {uuid} not found")]
    CharacteristicNotFound {
        /// UUID that was looked for.
        uuid: uuid::Uuid,
    },
}

impl BleError {
    /// Convert into a [`TransportError`] for propagation across port
    /// boundaries.
    #[must_use]
    pub fn into_domain(self) -> TransportError {
        match self {
            Self::NotAvailable => TransportError::NoAdapter,
            Self::ConnectTimeout => TransportError::Timeout,
            Self::PeripheralNotFound(peer) => TransportError::PeerNotFound(peer),
            Self::CharacteristicNotFound { .. } => TransportError::CharacteristicNotFound,
            Self::Scan(btleplug::Error::NotConnected)
            | Self::GattConnect(btleplug::Error::NotConnected) => TransportError::NotConnected,
            other => TransportError::Link(Box::new(other)),
        }
    }
}

impl From<BleError> for TransportError {
    fn from(err: BleError) -> Self {
        err.into_domain()
    }
}
