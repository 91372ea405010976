//! Commands written to the reader's command characteristic.
//!
//! | Command | JSON |
//! |---------|------|
//! | Read balance | `{"command":"READ"}` |
//! | Initialize card | `{"command":"INIT","amount":500}` |
//! | Recharge card | `{"command":"RECHARGE","amount":100}` |
//!
//! The channel carries no request id: a reply is attributed to the one
//! outstanding command by the caller's serialization alone.

use std::fmt;

use serde::Serialize;

use crate::amount::Amount;

/// The three logical operations multiplexed over the command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommandKind {
    /// Read the balance stored on the card.
    Read,
    /// Initialize a blank card with an opening balance.
    Init,
    /// Add value to an initialized card.
    Recharge,
}

impl CommandKind {
    /// Wire name of the command.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "READ",
            Self::Init => "INIT",
            Self::Recharge => "RECHARGE",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request ready to be encoded and written to the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "UPPERCASE")]
pub enum Command {
    /// `{"command":"READ"}`
    Read,
    /// `{"command":"INIT","amount":<n>}`
    Init {
        /// Opening balance.
        amount: Amount,
    },
    /// `{"command":"RECHARGE","amount":<n>}`
    Recharge {
        /// Value to add.
        amount: Amount,
    },
}

impl Command {
    /// Operation kind, used to pick the reply interpretation.
    #[must_use]
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Read => CommandKind::Read,
            Self::Init { .. } => CommandKind::Init,
            Self::Recharge { .. } => CommandKind::Recharge,
        }
    }

    /// Amount carried by the command, if any.
    #[must_use]
    pub fn amount(&self) -> Option<Amount> {
        match self {
            Self::Read => None,
            Self::Init { amount } | Self::Recharge { amount } => Some(*amount),
        }
    }

    /// Encode as UTF-8 JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; with the current variants this does
    /// not happen in practice.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
