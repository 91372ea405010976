//! Simulated reader hardware — the card slot and the GATT link.
//!
//! The card keeps its state across sessions so a test can disconnect,
//! reconnect and read back what an earlier session wrote.

mod card;
mod session;

pub use card::{CardSlot, SimulatedCard};
pub use session::VirtualSession;

pub(crate) use session::Link;
