//! BLE adapter configuration.

use serde::Deserialize;

use cardlink_domain::peer::DEFAULT_NAME_PREFIX;

/// Service exposing the reader's command characteristic.
pub const DEFAULT_SERVICE_UUID: uuid::Uuid =
    uuid::Uuid::from_u128(0x4faf_c201_1fb5_459e_8fcc_c5c9_c331_914b);

/// Characteristic carrying commands (write) and replies (notify).
pub const DEFAULT_CHARACTERISTIC_UUID: uuid::Uuid =
    uuid::Uuid::from_u128(0xbeb5_483e_36e1_4688_b7f5_ea07_361b_26a8);

/// Configuration for the BLE transport.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BleConfig {
    /// GATT service of the reader.
    pub service_uuid: uuid::Uuid,
    /// Command characteristic inside [`service_uuid`](Self::service_uuid).
    pub characteristic_uuid: uuid::Uuid,
    /// Advertised local-name prefix of readers.
    pub name_prefix: String,
    /// How long a discovery scan runs, in seconds.
    pub scan_duration_secs: u16,
    /// Upper bound for connecting and setting up a session, in seconds.
    pub connect_timeout_secs: u16,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            service_uuid: DEFAULT_SERVICE_UUID,
            characteristic_uuid: DEFAULT_CHARACTERISTIC_UUID,
            name_prefix: DEFAULT_NAME_PREFIX.to_owned(),
            scan_duration_secs: 10,
            connect_timeout_secs: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_use_reader_uuids_by_default() {
        let config = BleConfig::default();
        assert_eq!(
            config.service_uuid.to_string(),
            "4fafc201-1fb5-459e-8fcc-c5c9c331914b"
        );
        assert_eq!(
            config.characteristic_uuid.to_string(),
            "beb5483e-36e1-4688-b7f5-ea07361b26a8"
        );
        assert_eq!(config.name_prefix, "Recharge-");
    }

    #[test]
    fn should_fill_missing_fields_from_defaults() {
        let config: BleConfig = toml::from_str(
            r#"
            name_prefix = "Kiosk-"
            scan_duration_secs = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.name_prefix, "Kiosk-");
        assert_eq!(config.scan_duration_secs, 3);
        assert_eq!(config.connect_timeout_secs, 10);
        assert_eq!(config.service_uuid, DEFAULT_SERVICE_UUID);
    }
}
