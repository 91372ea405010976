//! Common error types used across the workspace.
//!
//! [`CardError`] is the taxonomy handed to UI layers: every card operation
//! ends in either a typed success or exactly one of these. Transport and
//! device failures are values, never panics, so a screen can render them
//! directly via [`CardError::code`].

use std::fmt;

use crate::amount::{AmountError, Balance};
use crate::peer::PeerId;

/// Boxed source error for port boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Domain result of a failed card operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CardError {
    /// No session is live; nothing was written.
    #[error("no reader connected")]
    NoDevice,

    /// The wireless link failed while the command was pending.
    #[error("wireless link error: {0}")]
    BleError(LinkFailure),

    /// The command never reached a conclusion with the reader.
    #[error("communication with the reader failed: {0}")]
    CommunicationFailed(CommunicationFailure),

    /// Reader: `NO_CARD`.
    #[error("no card detected on the reader")]
    NoCardDetected,

    /// Reader: `ALREADY_INIT`, with the balance already on the card.
    #[error("card is already initialized")]
    CardAlreadyInitialized {
        /// Balance reported alongside the error.
        balance: Option<Balance>,
    },

    /// Reader: `WRITE_FAIL`.
    #[error("writing to the card failed")]
    CardWriteFailed,

    /// Reader: `FORMAT_FAIL`.
    #[error("formatting the card failed")]
    CardFormatFailed,

    /// Reader: `MIN_200` on initialize.
    #[error("amount is below the reader's initialize minimum")]
    MinimumAmountRequired,

    /// Reader: `NOT_INIT` on recharge.
    #[error("card is not initialized")]
    CardNotInitialized,

    /// Reader: `MIN_25_FIRST` on recharge.
    #[error("first recharge is below the reader's minimum")]
    FirstRechargeMinimum,

    /// Any reader error code without a mapping for this command.
    #[error("reader reported unrecognized error {0:?}")]
    Unknown(String),

    /// Rejected locally before any transport activity.
    #[error("invalid amount")]
    InvalidAmount(#[from] AmountError),

    /// Another card operation is still pending on this service.
    #[error("another card operation is in progress")]
    DeviceBusy,
}

impl CardError {
    /// Stable identifier for UI layers.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoDevice => "NO_DEVICE",
            Self::BleError(_) => "BLE_ERROR",
            Self::CommunicationFailed(_) => "COMMUNICATION_FAILED",
            Self::NoCardDetected => "NO_CARD_DETECTED",
            Self::CardAlreadyInitialized { .. } => "CARD_ALREADY_INITIALIZED",
            Self::CardWriteFailed => "CARD_WRITE_FAILED",
            Self::CardFormatFailed => "CARD_FORMAT_FAILED",
            Self::MinimumAmountRequired => "MINIMUM_AMOUNT_REQUIRED",
            Self::CardNotInitialized => "CARD_NOT_INITIALIZED",
            Self::FirstRechargeMinimum => "FIRST_RECHARGE_MINIMUM",
            Self::Unknown(_) => "UNKNOWN_ERROR",
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::DeviceBusy => "DEVICE_BUSY",
        }
    }

    /// Whether the error was produced without touching the transport.
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Self::InvalidAmount(_) | Self::DeviceBusy | Self::NoDevice)
    }
}

/// What went wrong on the link while a command was pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkFailure {
    /// The transport delivered an error instead of a notification.
    Notification,
    /// Subscribing to the command characteristic failed.
    Subscribe,
    /// The notification stream ended before a reply arrived.
    StreamEnded,
    /// The session closed before a reply arrived.
    SessionClosed,
}

impl fmt::Display for LinkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Notification => "notification error",
            Self::Subscribe => "subscription failed",
            Self::StreamEnded => "notification stream ended",
            Self::SessionClosed => "session closed",
        })
    }
}

/// Why a command never completed an exchange with the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommunicationFailure {
    /// The acknowledged write was rejected.
    WriteRejected,
    /// No qualifying reply arrived before the deadline.
    Timeout,
    /// The request could not be encoded.
    Encode,
}

impl fmt::Display for CommunicationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::WriteRejected => "write rejected",
            Self::Timeout => "reader did not respond",
            Self::Encode => "request encoding failed",
        })
    }
}

/// Failures reported by a transport port implementation.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No adapter/radio is available on the host.
    #[error("no wireless adapter available")]
    NoAdapter,

    /// The requested peer is not known to the adapter.
    #[error("peer {0} not found")]
    PeerNotFound(PeerId),

    /// The peer does not expose the command characteristic.
    #[error("command characteristic not found on peer")]
    CharacteristicNotFound,

    /// The link is not (or no longer) connected.
    #[error("link is not connected")]
    NotConnected,

    /// A link-level operation exceeded its deadline.
    #[error("link operation timed out")]
    Timeout,

    /// Any other failure from the underlying stack.
    #[error("link failure")]
    Link(#[source] BoxError),
}

/// Failures of the connection lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The transport refused or failed the connection.
    #[error("failed to connect to {peer}")]
    Connect {
        /// Peer we tried to reach.
        peer: PeerId,
        /// Underlying transport failure.
        #[source]
        source: TransportError,
    },

    /// Another connect is already running.
    #[error("a connection attempt is already in progress")]
    InProgress,

    /// A disconnect or newer connect ran while this attempt was pending.
    #[error("connection attempt to {0} was superseded")]
    Superseded(PeerId),
}

/// Failures of the backend ledger collaborator.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The machine is not registered with the backend.
    #[error("machine {0} is not registered")]
    UnknownMachine(String),

    /// The backend rejected the request.
    #[error("ledger rejected the request: {0}")]
    Rejected(String),

    /// The request could not be delivered.
    #[error("ledger request failed")]
    Request(#[source] BoxError),
}
