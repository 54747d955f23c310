//! Unified error type for the session controller.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Every variant describes a request that was rejected before anything was
//! sent to the host stack; protocol failures travel inside events instead.

use crate::ble::device_state::DeviceState;

/// Synchronous rejection of an application operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    // Capacity
    /// Link table is at `BLE_CONNECTION_MAX`.
    NoSlotAvailable,

    /// Bond table is full and the peer is not already bonded.
    BondStoreFull,

    /// The outbound request queue towards the stack is full.
    OutboxFull,

    // Invalid state
    /// Operation is not legal in the current device state.
    InvalidState(DeviceState),

    /// Another device-level operation is awaiting its confirmation.
    OperationPending,

    /// A bonding or profile procedure is already outstanding on this link.
    Busy,

    /// No live link matches the handle or address.
    NotConnected,

    /// Index or record lookup came back empty.
    NotFound,

    /// The peer already has a live link.
    AlreadyConnected,

    /// No security policy is configured.
    SecurityDisabled,

    // Profiles
    /// Profile is not part of the controller's capability table.
    UnsupportedProfile,

    /// Cached handle table is missing or too short for the profile.
    InvalidHandles,

    /// Profile is not enabled on the link.
    ProfileNotEnabled,

    /// Profile has no record access control point.
    RacpUnsupported,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::NoSlotAvailable => f.write_str("no free connection slot"),
            Error::BondStoreFull => f.write_str("bond table full"),
            Error::OutboxFull => f.write_str("request queue full"),
            Error::InvalidState(state) => write!(f, "not allowed in state {:?}", state),
            Error::OperationPending => f.write_str("device operation pending"),
            Error::Busy => f.write_str("procedure already in progress"),
            Error::NotConnected => f.write_str("not connected"),
            Error::NotFound => f.write_str("not found"),
            Error::AlreadyConnected => f.write_str("peer already connected"),
            Error::SecurityDisabled => f.write_str("security disabled"),
            Error::UnsupportedProfile => f.write_str("unsupported profile"),
            Error::InvalidHandles => f.write_str("invalid cached handles"),
            Error::ProfileNotEnabled => f.write_str("profile not enabled"),
            Error::RacpUnsupported => f.write_str("profile has no RACP"),
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;
