//! Messages exchanged with the host stack and the application.
//!
//! Every request to the stack is answered later by an independently
//! delivered [`StackEvent`]; confirmations for one connection handle arrive
//! in the order the requests were issued.

use crate::ble::device_state::{DeviceState, SetupStep};
use crate::ble::inquiry::InquiryEntry;
use crate::ble::security::{
    BondKeys, BondStatus, IoCapability, LtkInfo, PairingFailure, PairingParams,
    SecurityProperties,
};
use crate::ble::{AddrType, BdAddr, ConnHandle, PeerAddr, Role, Status};
use crate::config::{ConnParams, InquiryType};
use crate::error::Error;
use crate::profile::racp::{RacpRequest, RacpStatus};
use crate::profile::{HandleBlob, ProfileId, SessionHint};

/// Requests towards the host stack.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StackRequest {
    Setup(SetupStep),
    DeviceInquiryStart {
        inquiry_type: InquiryType,
        own_addr_type: AddrType,
    },
    DeviceInquiryStop,
    AdvertisingStart {
        own_addr_type: AddrType,
        interval_min: u16,
        interval_max: u16,
    },
    AdvertisingStop,
    ConnectionCreate {
        peer: PeerAddr,
        own_addr_type: AddrType,
        params: ConnParams,
    },
    ConnectionCancel,
    ConnectionTerminate {
        handle: ConnHandle,
        reason: u8,
    },
    BondInitiate {
        handle: ConnHandle,
        peer: BdAddr,
        params: PairingParams,
    },
    BondRespond {
        handle: ConnHandle,
        accept: bool,
        auth_req: u8,
        io_capability: IoCapability,
    },
    EncryptStart {
        handle: ConnHandle,
        key: LtkInfo,
    },
    ProfileEnable {
        profile: ProfileId,
        handle: ConnHandle,
        hint: SessionHint,
        cached: Option<HandleBlob>,
    },
    RacpWrite {
        profile: ProfileId,
        handle: ConnHandle,
        request: RacpRequest,
    },
}

/// Payload attached to some setup confirmations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SetupInfo {
    None,
    Version {
        hci_version: u8,
        hci_revision: u16,
        manufacturer: u16,
    },
    LocalAddress(PeerAddr),
}

/// Confirmations and indications from the host stack.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StackEvent {
    SetupComplete {
        step: SetupStep,
        status: Status,
        info: SetupInfo,
    },
    DeviceInquiryResult {
        peer: PeerAddr,
        rssi: i8,
        adv_data: heapless::Vec<u8, 31>,
    },
    DeviceInquiryComplete {
        status: Status,
    },
    AdvertisingStarted {
        status: Status,
    },
    AdvertisingStopped {
        status: Status,
    },
    ConnectionCreateComplete {
        status: Status,
        handle: ConnHandle,
        peer: PeerAddr,
        params: ConnParams,
    },
    ConnectionTerminated {
        handle: ConnHandle,
        reason: u8,
    },
    BondRequested {
        handle: ConnHandle,
        peer_auth_req: u8,
        peer_io_capability: IoCapability,
    },
    BondComplete {
        handle: ConnHandle,
        status: BondStatus,
        bonded: bool,
        properties: SecurityProperties,
        keys: BondKeys,
    },
    EncryptComplete {
        handle: ConnHandle,
        status: Status,
    },
    ProfileEnableComplete {
        profile: ProfileId,
        handle: ConnHandle,
        status: Status,
        discovered: Option<HandleBlob>,
    },
    RacpResponse {
        profile: ProfileId,
        handle: ConnHandle,
        status: RacpStatus,
    },
}

/// Operations the application (menu, CLI, button logic) can request.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AppCommand {
    StartInquiry,
    StopInquiry,
    StartAdvertising,
    StopAdvertising,
    Connect(PeerAddr),
    /// Connect to the entry at this index of the last inquiry.
    ConnectInquiryResult(usize),
    /// Connect to the first inquiry result advertising this profile.
    ConnectOffering(ProfileId),
    CancelConnect,
    Disconnect(ConnHandle),
    Bond(BdAddr),
    Unpair(BdAddr),
    EnableProfile {
        handle: ConnHandle,
        profile: ProfileId,
    },
    DisableProfile {
        handle: ConnHandle,
        profile: ProfileId,
    },
    Racp {
        handle: ConnHandle,
        profile: ProfileId,
        request: RacpRequest,
    },
}

/// Local identity learned during setup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LocalIdentity {
    pub address: Option<PeerAddr>,
    pub hci_version: u8,
    pub hci_revision: u16,
    pub manufacturer: u16,
}

/// Notifications for the application.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AppEvent {
    Ready(LocalIdentity),
    SetupFailed {
        step: SetupStep,
        status: Status,
    },
    StateChanged(DeviceState),
    InquiryResult(InquiryEntry),
    InquiryComplete {
        count: usize,
    },
    AdvertisingFailed(Status),
    Connected {
        handle: ConnHandle,
        peer: PeerAddr,
        role: Role,
    },
    ConnectFailed(Status),
    Disconnected {
        handle: ConnHandle,
        peer: PeerAddr,
        reason: u8,
    },
    Bonded {
        handle: ConnHandle,
        peer: BdAddr,
        bonded: bool,
        properties: SecurityProperties,
    },
    BondFailed {
        handle: ConnHandle,
        peer: BdAddr,
        failure: PairingFailure,
    },
    /// Bond succeeded but the table had no room to remember it.
    BondStoreFull {
        handle: ConnHandle,
        peer: BdAddr,
    },
    Encrypted {
        handle: ConnHandle,
        properties: SecurityProperties,
    },
    ProfileEnabled {
        handle: ConnHandle,
        profile: ProfileId,
        hint: SessionHint,
        handles: HandleBlob,
    },
    ProfileEnableFailed {
        handle: ConnHandle,
        profile: ProfileId,
        status: Status,
    },
    RacpComplete {
        handle: ConnHandle,
        profile: ProfileId,
        status: RacpStatus,
    },
    /// A command passed to `execute` was refused.
    Rejected(Error),
}
