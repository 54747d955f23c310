//! GATT profile client roles and the session cache protocol.
//!
//! Every profile client is enabled on a link in one of two modes:
//!
//! - **Discovery** - no handles are known; the stack discovers the service
//!   over the air and reports the handle table back.
//! - **Normal** - a handle table retained from an earlier discovery on the
//!   same peer is supplied; the stack registers for it directly.
//!
//! The profiles available to a controller come from a static capability
//! table of [`ProfileDescriptor`]s, so a product links only the client
//! roles it actually uses.

pub mod cache;
pub mod racp;
pub mod session;

use heapless::Vec;

use crate::config::MAX_ATTRIBUTE_HANDLES;

/// Client roles known to the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProfileId {
    HealthThermometer,
    BloodPressure,
    HeartRate,
    Glucose,
    Proximity,
    FindMe,
    CurrentTime,
    NextDstChange,
    ReferenceTimeUpdate,
    Battery,
    ScanParameters,
    DeviceInformation,
    AlertNotification,
    PhoneAlertStatus,
    CyclingSpeedCadence,
    RunningSpeedCadence,
    HidBootHost,
    HidReportHost,
}

/// How a profile enable is carried out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionHint {
    Discovery,
    Normal,
}

/// Discovered attribute handles of one profile on one peer. Opaque to the
/// controller apart from its length.
pub type HandleBlob = Vec<u16, MAX_ATTRIBUTE_HANDLES>;

/// Static description of a profile client role.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProfileDescriptor {
    pub id: ProfileId,
    /// Primary service UUID on the peer.
    pub service_uuid: u16,
    /// Fewest handles a usable cached table may contain.
    pub min_handles: usize,
    /// Has a record access control point (long-running operations).
    pub racp: bool,
}

impl ProfileDescriptor {
    pub const fn new(id: ProfileId, service_uuid: u16, min_handles: usize, racp: bool) -> Self {
        Self {
            id,
            service_uuid,
            min_handles,
            racp,
        }
    }

    /// Whether `handles` is a usable cached table for this profile.
    pub fn accepts(&self, handles: &[u16]) -> bool {
        handles.len() >= self.min_handles && handles.iter().all(|h| *h != 0)
    }
}

/// Every client role this crate can drive.
pub const ALL_PROFILES: &[ProfileDescriptor] = &[
    ProfileDescriptor::new(ProfileId::HealthThermometer, 0x1809, 2, false),
    ProfileDescriptor::new(ProfileId::BloodPressure, 0x1810, 2, false),
    ProfileDescriptor::new(ProfileId::HeartRate, 0x180D, 2, false),
    ProfileDescriptor::new(ProfileId::Glucose, 0x1808, 4, true),
    ProfileDescriptor::new(ProfileId::Proximity, 0x1803, 1, false),
    ProfileDescriptor::new(ProfileId::FindMe, 0x1802, 1, false),
    ProfileDescriptor::new(ProfileId::CurrentTime, 0x1805, 1, false),
    ProfileDescriptor::new(ProfileId::NextDstChange, 0x1807, 1, false),
    ProfileDescriptor::new(ProfileId::ReferenceTimeUpdate, 0x1806, 2, false),
    ProfileDescriptor::new(ProfileId::Battery, 0x180F, 1, false),
    ProfileDescriptor::new(ProfileId::ScanParameters, 0x1813, 1, false),
    ProfileDescriptor::new(ProfileId::DeviceInformation, 0x180A, 1, false),
    ProfileDescriptor::new(ProfileId::AlertNotification, 0x1811, 4, false),
    ProfileDescriptor::new(ProfileId::PhoneAlertStatus, 0x180E, 2, false),
    ProfileDescriptor::new(ProfileId::CyclingSpeedCadence, 0x1816, 2, false),
    ProfileDescriptor::new(ProfileId::RunningSpeedCadence, 0x1814, 2, false),
    ProfileDescriptor::new(ProfileId::HidBootHost, 0x1812, 2, false),
    ProfileDescriptor::new(ProfileId::HidReportHost, 0x1812, 3, false),
];

/// Descriptor for `id` in `table`.
pub fn lookup(table: &[ProfileDescriptor], id: ProfileId) -> Option<&ProfileDescriptor> {
    table.iter().find(|d| d.id == id)
}
