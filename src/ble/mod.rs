//! GAP/SMP side of the session controller.
//!
//! 1. **Device state** - the single operating mode (Init, Idle, Scanning,
//!    Advertising) and the boot-time setup sequence.
//! 2. **Inquiry** - deduplicating collector of peers seen while scanning.
//! 3. **Link registry** - fixed-capacity table of live connections.
//! 4. **Security / bonding** - pairing parameters, the failure retry policy,
//!    and the bonded-peer table.
//!
//! Everything here is plain data plus synchronous transitions; the
//! controller owns the instances and talks to the host stack.

pub mod adv_parser;
pub mod bonding;
pub mod device_state;
pub mod inquiry;
pub mod link;
pub mod security;

use core::fmt;

/// 48-bit device address, most significant byte first.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BdAddr([u8; 6]);

impl BdAddr {
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Debug for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// Address type as carried by GAP.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddrType {
    Public,
    RandomStatic,
    RandomPrivateResolvable,
    RandomPrivateNonResolvable,
}

/// Address plus type - the identity used for every peer lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeerAddr {
    pub addr: BdAddr,
    pub kind: AddrType,
}

impl PeerAddr {
    pub const fn new(addr: BdAddr, kind: AddrType) -> Self {
        Self { addr, kind }
    }
}

/// Opaque connection handle assigned by the stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnHandle(pub u16);

impl ConnHandle {
    pub const INVALID: ConnHandle = ConnHandle(0xFFFF);

    pub const fn is_valid(&self) -> bool {
        self.0 != Self::INVALID.0
    }
}

/// Local role on a link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    /// Local device initiated the connection.
    Central,
    /// Peer connected to our advertisement.
    Peripheral,
}

/// HCI-level status code returned with GAP confirmations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    Success,
    Failed(u8),
}

impl Status {
    /// HCI "Operation Cancelled by Host", reported after `ConnectionCancel`.
    pub const CANCELLED: Status = Status::Failed(0x44);

    /// HCI "PIN or Key Missing": the peer no longer has our keys.
    pub const PIN_OR_KEY_MISSING: Status = Status::Failed(0x06);

    /// HCI "Memory Capacity Exceeded". Reported when a follow-up request
    /// did not fit the request queue.
    pub const MEMORY_CAPACITY_EXCEEDED: Status = Status::Failed(0x07);

    /// HCI "Invalid HCI Command Parameters". Reported when a discovery
    /// returned a handle table the profile cannot use.
    pub const INVALID_PARAMETERS: Status = Status::Failed(0x12);

    /// HCI "Remote User Terminated Connection".
    pub const REMOTE_USER_TERMINATED: u8 = 0x13;

    /// HCI "Connection Terminated By Local Host".
    pub const LOCAL_HOST_TERMINATED: u8 = 0x16;

    pub const fn is_success(&self) -> bool {
        matches!(self, Status::Success)
    }
}

impl From<u8> for Status {
    fn from(code: u8) -> Self {
        match code {
            0 => Status::Success,
            other => Status::Failed(other),
        }
    }
}
