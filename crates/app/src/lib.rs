//! # cardlink-app
//!
//! Application layer — the device communication core and its use-cases.
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement:
//!   - `Transport` / `TransportSession` — one live link to a reader
//!   - `Discovery` — stream of readers matching the name prefix
//!   - `Ledger` — backend wallet reconciliation
//!   - `EventPublisher` — connection lifecycle events
//! - Turn the single notify/write characteristic into a reliable
//!   command/response protocol (`channel`, `protocol`)
//! - Own the one live session and watch it for unexpected drops
//!   (`lifecycle`)
//! - Expose the card use-cases (`services`)
//!
//! ## Dependency rule
//! Depends on `cardlink-domain` only (plus `tokio` for tasks, channels and
//! timers). Never imports adapter crates.

pub mod channel;
pub mod event_bus;
pub mod lifecycle;
pub mod ports;
pub mod protocol;
pub mod services;

#[cfg(test)]
pub(crate) mod testing;
