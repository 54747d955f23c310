//! Application-wide constants and runtime configuration.
//!
//! Table capacities, connection timing and security bounds live here so
//! they can be tuned in one place. Anything a product might change without
//! rebuilding goes into [`AppConfig`].

use crate::ble::security::{IoCapability, PairingParams, SecurityTier};
use crate::ble::AddrType;

// Capacities

/// Maximum simultaneous BLE connections.
pub const BLE_CONNECTION_MAX: usize = 3;

/// Number of bonded peers the application is willing to remember.
pub const APP_MAX_BONDED_DEVICE_NUMBER: usize = 2;

/// Bond table capacity: never more bonds than concurrent links.
pub const MAX_BONDED_DEVICES: usize = if APP_MAX_BONDED_DEVICE_NUMBER < BLE_CONNECTION_MAX {
    APP_MAX_BONDED_DEVICE_NUMBER
} else {
    BLE_CONNECTION_MAX
};

/// Maximum peers collected during one inquiry.
pub const INQUIRY_MAX: usize = BLE_CONNECTION_MAX;

/// 16-bit service UUIDs remembered per inquiry result.
pub const ADV_SERVICES_MAX: usize = 4;

/// Peers whose discovered attribute handles are retained across connections.
pub const SESSION_CACHE_MAX: usize = 4;

/// Profiles that can be enabled on a single link at once.
pub const MAX_PROFILES_PER_LINK: usize = 8;

/// Attribute handles a single profile discovery may report.
pub const MAX_ATTRIBUTE_HANDLES: usize = 16;

/// Depth of the outbound request queue towards the host stack.
pub const OUTBOX_DEPTH: usize = 8;

/// Depth of the application notification queue.
pub const EVENT_DEPTH: usize = 16;

// GAP timing

/// Connection interval range (in 1.25 ms units). 24 = 30 ms.
pub const BLE_CONN_INTERVAL_MIN: u16 = 24;
pub const BLE_CONN_INTERVAL_MAX: u16 = 40;

/// Peripheral latency (connection events the peer may skip).
pub const BLE_SLAVE_LATENCY: u16 = 0;

/// Supervision timeout (in 10 ms units). 400 = 4 s.
pub const BLE_SUP_TIMEOUT: u16 = 400;

/// Advertising interval range (in 0.625 ms units). 160 = 100 ms.
pub const BLE_ADV_INTERVAL_MIN: u16 = 160;
pub const BLE_ADV_INTERVAL_MAX: u16 = 320;

// SMP

/// Smallest encryption key size the local device will accept (bytes).
pub const SMP_MIN_ENC_KEY_SIZE: u8 = 7;

/// Largest encryption key size (bytes).
pub const SMP_MAX_ENC_KEY_SIZE: u8 = 16;

/// Upper bound on automatic pairing re-submissions within one procedure.
pub const MAX_PAIRING_RETRIES: u8 = 4;

/// Discovery procedure used by `start_inquiry`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InquiryType {
    /// General discovery - every discoverable peer.
    General,
    /// Limited discovery - only peers in limited discoverable mode.
    Limited,
    /// Observer - report everything, including non-connectable advertisers.
    Observer,
}

/// Connection parameters sent with `ConnectionCreate`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnParams {
    pub interval_min: u16,
    pub interval_max: u16,
    pub latency: u16,
    pub supervision_timeout: u16,
}

impl Default for ConnParams {
    fn default() -> Self {
        Self {
            interval_min: BLE_CONN_INTERVAL_MIN,
            interval_max: BLE_CONN_INTERVAL_MAX,
            latency: BLE_SLAVE_LATENCY,
            supervision_timeout: BLE_SUP_TIMEOUT,
        }
    }
}

/// Local security policy. `None` in [`AppConfig::security`] means the
/// device refuses every bond request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SecurityConfig {
    pub tier: SecurityTier,
    pub io_capability: IoCapability,
    pub oob: bool,
    pub max_key_size: u8,
}

impl SecurityConfig {
    /// Parameters for the first pairing attempt of a procedure.
    pub fn initial_pairing(&self) -> PairingParams {
        PairingParams {
            tier: self.tier,
            io_capability: self.io_capability,
            oob: self.oob,
            max_key_size: self.max_key_size,
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            tier: SecurityTier::MitmBond,
            io_capability: IoCapability::DisplayYesNo,
            oob: false,
            max_key_size: SMP_MAX_ENC_KEY_SIZE,
        }
    }
}

/// Runtime configuration handed to the session controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AppConfig {
    pub own_addr_type: AddrType,
    pub inquiry_type: InquiryType,
    pub conn_params: ConnParams,
    pub adv_interval_min: u16,
    pub adv_interval_max: u16,
    pub security: Option<SecurityConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            own_addr_type: AddrType::Public,
            inquiry_type: InquiryType::General,
            conn_params: ConnParams::default(),
            adv_interval_min: BLE_ADV_INTERVAL_MIN,
            adv_interval_max: BLE_ADV_INTERVAL_MAX,
            security: Some(SecurityConfig::default()),
        }
    }
}
