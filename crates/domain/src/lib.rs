//! # cardlink-domain
//!
//! Pure domain model for the cardlink RFID wallet reader.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **Amounts** and **Balances** with local validation rules
//! - Define **Peers** (card readers advertising as `Recharge-<machine>`)
//! - Define the **wire codec**: command requests and device responses
//!   carried as JSON over the single command characteristic
//! - Define the **error taxonomy** surfaced to UI layers
//! - Define **connection events** and **transaction records**
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod amount;
pub mod command;
pub mod event;
pub mod peer;
pub mod response;
pub mod transaction;
