//! Device-condition snapshots and the derived wake-up trigger.

use serde::{Deserialize, Serialize};

/// Network connection type as reported by the platform observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    None,
    Wifi,
    Ethernet,
    Cellular2g,
    Cellular3g,
    Cellular4g,
    Bluetooth,
    Unknown,
}

impl ConnectionType {
    pub fn is_connected(self) -> bool {
        !matches!(self, ConnectionType::None)
    }

    /// Whether the connection counts as unmetered for gating purposes.
    /// Only WiFi qualifies; cellular and ethernet do not.
    pub fn is_unmetered(self) -> bool {
        matches!(self, ConnectionType::Wifi)
    }
}

/// Transient snapshot of device state, supplied by the caller at each
/// processing attempt. Not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConditions {
    pub power_connected: bool,
    /// 0–100.
    pub battery_percentage: u32,
    pub connection: ConnectionType,
}

impl DeviceConditions {
    pub fn new(power_connected: bool, battery_percentage: u32, connection: ConnectionType) -> Self {
        Self {
            power_connected,
            battery_percentage: battery_percentage.min(100),
            connection,
        }
    }
}

impl Default for DeviceConditions {
    /// The pessimistic snapshot used before any observer has reported:
    /// no power, empty battery, no network.
    fn default() -> Self {
        Self {
            power_connected: false,
            battery_percentage: 0,
            connection: ConnectionType::None,
        }
    }
}

/// What device state should wake the external scheduler for another
/// processing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerConditions {
    pub require_power: bool,
    pub minimum_battery_percentage: u32,
    pub require_unmetered_network: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_wifi_is_unmetered() {
        assert!(ConnectionType::Wifi.is_unmetered());
        for c in [
            ConnectionType::None,
            ConnectionType::Ethernet,
            ConnectionType::Cellular2g,
            ConnectionType::Cellular3g,
            ConnectionType::Cellular4g,
            ConnectionType::Bluetooth,
            ConnectionType::Unknown,
        ] {
            assert!(!c.is_unmetered(), "{c:?} should be metered");
        }
    }

    #[test]
    fn none_is_disconnected() {
        assert!(!ConnectionType::None.is_connected());
        assert!(ConnectionType::Cellular3g.is_connected());
    }

    #[test]
    fn battery_percentage_is_clamped() {
        let c = DeviceConditions::new(true, 250, ConnectionType::Wifi);
        assert_eq!(c.battery_percentage, 100);
    }
}
