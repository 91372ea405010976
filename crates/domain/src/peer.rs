//! Peer — a card reader reachable over the wireless link.
//!
//! Readers advertise a local name of the form `Recharge-<machine number>`.
//! The machine number is what the backend ledger knows the reader by.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Local-name prefix advertised by card readers.
pub const DEFAULT_NAME_PREFIX: &str = "Recharge-";

/// Transport-level identity of a peer (platform address or UUID string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Wrap a platform identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A discovered card reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    /// Transport identity used to connect.
    pub id: PeerId,
    /// Advertised local name, if any.
    pub name: Option<String>,
    /// Signal strength at discovery time.
    pub rssi: Option<i16>,
}

impl Peer {
    /// Create a peer from its identity and advertised name.
    #[must_use]
    pub fn new(id: impl Into<PeerId>, name: Option<String>) -> Self {
        Self {
            id: id.into(),
            name,
            rssi: None,
        }
    }

    /// Whether the advertised name starts with `prefix`.
    #[must_use]
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        self.name
            .as_deref()
            .is_some_and(|name| name.starts_with(prefix))
    }

    /// Machine number encoded in the advertised name after `prefix`.
    ///
    /// Returns `None` when the name is missing, lacks the prefix, or has
    /// nothing after it.
    #[must_use]
    pub fn machine_no(&self, prefix: &str) -> Option<&str> {
        let rest = self.name.as_deref()?.strip_prefix(prefix)?.trim();
        (!rest.is_empty()).then_some(rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(name: Option<&str>) -> Peer {
        Peer::new("AA:BB:CC:DD:EE:FF", name.map(str::to_owned))
    }

    #[test]
    fn should_match_reader_prefix() {
        assert!(reader(Some("Recharge-M042")).matches_prefix(DEFAULT_NAME_PREFIX));
    }

    #[test]
    fn should_not_match_foreign_device() {
        assert!(!reader(Some("Flower care")).matches_prefix(DEFAULT_NAME_PREFIX));
        assert!(!reader(None).matches_prefix(DEFAULT_NAME_PREFIX));
    }

    #[test]
    fn should_extract_machine_number() {
        let peer = reader(Some("Recharge- M042 "));
        assert_eq!(peer.machine_no(DEFAULT_NAME_PREFIX), Some("M042"));
    }

    #[test]
    fn should_return_none_for_empty_machine_number() {
        assert_eq!(reader(Some("Recharge-")).machine_no(DEFAULT_NAME_PREFIX), None);
        assert_eq!(reader(Some("Other-1")).machine_no(DEFAULT_NAME_PREFIX), None);
    }

    #[test]
    fn should_display_peer_id_verbatim() {
        let id = PeerId::new("hci0/dev_AA_BB");
        assert_eq!(id.to_string(), "hci0/dev_AA_BB");
        assert_eq!(id.as_str(), "hci0/dev_AA_BB");
    }
}
