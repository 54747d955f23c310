//! Unit tests for the session controller.
//!
//! Each test drives the controller with stack events by hand and checks the
//! requests and notifications it queues.

use super::SessionController;
use crate::ble::bonding::BondState;
use crate::ble::device_state::{DeviceState, PendingOp, SetupStep};
use crate::ble::security::{
    BondKeys, BondStatus, IoCapability, LtkInfo, PairingFailure, SecurityProperties,
    SecurityTier,
};
use crate::ble::{AddrType, BdAddr, ConnHandle, PeerAddr, Role, Status};
use crate::config::{
    AppConfig, ConnParams, SecurityConfig, BLE_CONNECTION_MAX, MAX_BONDED_DEVICES,
    SMP_MIN_ENC_KEY_SIZE,
};
use crate::error::Error;
use crate::message::{AppCommand, AppEvent, SetupInfo, StackEvent, StackRequest};
use crate::profile::racp::{RacpOpCode, RacpOperator, RacpRequest, RacpStatus};
use crate::profile::{HandleBlob, ProfileId, SessionHint};

fn peer(last: u8) -> PeerAddr {
    PeerAddr::new(BdAddr::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, last]), AddrType::Public)
}

fn blob(handles: &[u16]) -> HandleBlob {
    HandleBlob::from_slice(handles).unwrap()
}

fn requests(c: &mut SessionController) -> Vec<StackRequest> {
    core::iter::from_fn(|| c.next_request()).collect()
}

fn events(c: &mut SessionController) -> Vec<AppEvent> {
    core::iter::from_fn(|| c.next_event()).collect()
}

fn booted_with(config: AppConfig) -> SessionController {
    let mut c = SessionController::new(config);
    c.boot().unwrap();
    while let Some(StackRequest::Setup(step)) = c.next_request() {
        let info = match step {
            SetupStep::ReadVersion => SetupInfo::Version {
                hci_version: 9,
                hci_revision: 0x0102,
                manufacturer: 0x000A,
            },
            SetupStep::ReadLocalAddress => SetupInfo::LocalAddress(peer(0x01)),
            _ => SetupInfo::None,
        };
        c.handle(StackEvent::SetupComplete {
            step,
            status: Status::Success,
            info,
        });
    }
    events(&mut c);
    c
}

fn booted() -> SessionController {
    booted_with(AppConfig::default())
}

/// Connect as Central to `peer(last)` on `handle`.
fn connect(c: &mut SessionController, last: u8, handle: u16) -> PeerAddr {
    let p = peer(last);
    c.begin_connect(p).unwrap();
    assert!(matches!(
        c.next_request(),
        Some(StackRequest::ConnectionCreate { .. })
    ));
    c.handle(StackEvent::ConnectionCreateComplete {
        status: Status::Success,
        handle: ConnHandle(handle),
        peer: p,
        params: ConnParams::default(),
    });
    events(c);
    p
}

fn ltk(byte: u8) -> LtkInfo {
    LtkInfo {
        ltk: [byte; 16],
        ediv: byte as u16,
        rand: [byte; 8],
    }
}

fn properties() -> SecurityProperties {
    SecurityProperties {
        authenticated: true,
        secure_connections: false,
        key_size: 16,
    }
}

fn bond_success(handle: u16) -> StackEvent {
    StackEvent::BondComplete {
        handle: ConnHandle(handle),
        status: BondStatus::Success,
        bonded: true,
        properties: properties(),
        keys: BondKeys {
            local_ltk: Some(ltk(0x11)),
            peer_ltk: Some(ltk(0x22)),
            peer_irk: None,
            peer_csrk: None,
        },
    }
}

fn bond_failed(handle: u16, failure: PairingFailure) -> StackEvent {
    StackEvent::BondComplete {
        handle: ConnHandle(handle),
        status: BondStatus::Failed(failure),
        bonded: false,
        properties: properties(),
        keys: BondKeys::default(),
    }
}

/// Profiles enabled one after another to take up outbox space.
const FILLERS: [ProfileId; 8] = [
    ProfileId::HealthThermometer,
    ProfileId::BloodPressure,
    ProfileId::HeartRate,
    ProfileId::Glucose,
    ProfileId::Proximity,
    ProfileId::FindMe,
    ProfileId::CurrentTime,
    ProfileId::Battery,
];

/// Enable profiles on `handle` until the request queue is full.
fn fill_outbox(c: &mut SessionController, handle: u16) {
    for profile in FILLERS {
        if c.enable_profile(ConnHandle(handle), profile) == Err(Error::OutboxFull) {
            return;
        }
    }
}

/// Pair with a connected peer and drain the traffic.
fn bond(c: &mut SessionController, p: PeerAddr, handle: u16) {
    c.request_bond(p.addr).unwrap();
    requests(c);
    c.handle(bond_success(handle));
    events(c);
}

// ═══════════════════════════════════════════════════════════════════════════
// Setup
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn boot_walks_setup_and_reports_identity() {
    let mut c = SessionController::new(AppConfig::default());
    assert_eq!(c.state(), DeviceState::Init);
    c.boot().unwrap();

    let mut issued = Vec::new();
    while let Some(StackRequest::Setup(step)) = c.next_request() {
        issued.push(step);
        let info = if step == SetupStep::ReadLocalAddress {
            SetupInfo::LocalAddress(peer(0x42))
        } else {
            SetupInfo::None
        };
        c.handle(StackEvent::SetupComplete {
            step,
            status: Status::Success,
            info,
        });
    }

    assert_eq!(issued.as_slice(), &SetupStep::SEQUENCE);
    assert_eq!(c.state(), DeviceState::Idle);
    let evs = events(&mut c);
    assert!(matches!(evs[0], AppEvent::Ready(id) if id.address == Some(peer(0x42))));
    assert_eq!(evs[1], AppEvent::StateChanged(DeviceState::Idle));
}

#[test]
fn failed_setup_stays_in_init() {
    let mut c = SessionController::new(AppConfig::default());
    c.boot().unwrap();
    requests(&mut c);
    c.handle(StackEvent::SetupComplete {
        step: SetupStep::SetSecurityPolicy,
        status: Status::Failed(0x12),
        info: SetupInfo::None,
    });

    assert!(requests(&mut c).is_empty());
    assert_eq!(
        events(&mut c),
        vec![AppEvent::SetupFailed {
            step: SetupStep::SetSecurityPolicy,
            status: Status::Failed(0x12)
        }]
    );
    assert_eq!(
        c.start_inquiry(),
        Err(Error::InvalidState(DeviceState::Init))
    );
}

#[test]
fn setup_step_that_cannot_be_queued_fails_setup() {
    let mut c = SessionController::new(AppConfig::default());
    c.boot().unwrap();
    c.handle(StackEvent::ConnectionCreateComplete {
        status: Status::Success,
        handle: ConnHandle(1),
        peer: peer(1),
        params: ConnParams::default(),
    });
    fill_outbox(&mut c, 1);

    c.handle(StackEvent::SetupComplete {
        step: SetupStep::SEQUENCE[0],
        status: Status::Success,
        info: SetupInfo::None,
    });

    assert!(events(&mut c).contains(&AppEvent::SetupFailed {
        step: SetupStep::SEQUENCE[1],
        status: Status::MEMORY_CAPACITY_EXCEEDED
    }));
    assert!(!requests(&mut c).contains(&StackRequest::Setup(SetupStep::SEQUENCE[1])));
    assert_eq!(c.state(), DeviceState::Init);
}

#[test]
fn boot_twice_is_rejected() {
    let mut c = booted();
    assert_eq!(c.boot(), Err(Error::InvalidState(DeviceState::Idle)));
}

#[test]
fn reset_drops_links_but_keeps_bonds() {
    let mut c = booted();
    let p = connect(&mut c, 1, 1);
    bond(&mut c, p, 1);

    c.reset();
    assert_eq!(c.state(), DeviceState::Init);
    assert_eq!(c.links().active_count(), 0);
    assert!(c.bonds().is_bonded(&p.addr));
    assert!(c.identity().address.is_none());
}

// ═══════════════════════════════════════════════════════════════════════════
// Inquiry & Advertising
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn inquiry_collects_unique_peers() {
    let mut c = booted();
    c.start_inquiry().unwrap();
    assert_eq!(c.state(), DeviceState::Scanning);
    assert!(matches!(
        requests(&mut c).as_slice(),
        [StackRequest::DeviceInquiryStart { .. }]
    ));

    for last in [1, 2, 1] {
        c.handle(StackEvent::DeviceInquiryResult {
            peer: peer(last),
            rssi: -60,
            adv_data: heapless::Vec::new(),
        });
    }
    let found = events(&mut c)
        .into_iter()
        .filter(|e| matches!(e, AppEvent::InquiryResult(_)))
        .count();
    assert_eq!(found, 2);
    assert_eq!(c.inquiry().len(), 2);

    c.stop_inquiry().unwrap();
    assert_eq!(c.pending_op(), Some(PendingOp::InquiryStop));
    c.handle(StackEvent::DeviceInquiryComplete {
        status: Status::Success,
    });
    assert_eq!(c.state(), DeviceState::Idle);
    assert_eq!(c.pending_op(), None);
    assert!(events(&mut c).contains(&AppEvent::InquiryComplete { count: 2 }));
}

#[test]
fn new_inquiry_starts_empty() {
    let mut c = booted();
    c.start_inquiry().unwrap();
    c.handle(StackEvent::DeviceInquiryResult {
        peer: peer(7),
        rssi: -40,
        adv_data: heapless::Vec::new(),
    });
    c.handle(StackEvent::DeviceInquiryComplete {
        status: Status::Success,
    });
    assert_eq!(c.inquiry().len(), 1);

    c.start_inquiry().unwrap();
    assert!(c.inquiry().is_empty());
}

#[test]
fn inquiry_results_outside_scanning_are_ignored() {
    let mut c = booted();
    c.handle(StackEvent::DeviceInquiryResult {
        peer: peer(3),
        rssi: -50,
        adv_data: heapless::Vec::new(),
    });
    assert!(c.inquiry().is_empty());
    assert!(events(&mut c).is_empty());
}

#[test]
fn connect_to_inquiry_result_uses_listed_peer() {
    let mut c = booted();
    c.start_inquiry().unwrap();
    c.handle(StackEvent::DeviceInquiryResult {
        peer: peer(9),
        rssi: -50,
        adv_data: heapless::Vec::new(),
    });
    c.handle(StackEvent::DeviceInquiryComplete {
        status: Status::Success,
    });
    requests(&mut c);

    assert_eq!(c.connect_to_inquiry_result(5), Err(Error::NotFound));
    c.connect_to_inquiry_result(0).unwrap();
    assert!(matches!(
        c.next_request(),
        Some(StackRequest::ConnectionCreate { peer: p, .. }) if p == peer(9)
    ));
}

#[test]
fn connect_offering_picks_peer_advertising_the_service() {
    let mut c = booted();
    c.start_inquiry().unwrap();
    // Battery only, then Battery and Heart Rate.
    let adverts: [&[u8]; 2] = [
        &[0x03, 0x03, 0x0F, 0x18],
        &[0x05, 0x03, 0x0F, 0x18, 0x0D, 0x18],
    ];
    for (last, adv) in [(4, adverts[0]), (5, adverts[1])] {
        c.handle(StackEvent::DeviceInquiryResult {
            peer: peer(last),
            rssi: -50,
            adv_data: heapless::Vec::from_slice(adv).unwrap(),
        });
    }
    c.handle(StackEvent::DeviceInquiryComplete {
        status: Status::Success,
    });
    requests(&mut c);

    assert_eq!(c.connect_offering(ProfileId::Glucose), Err(Error::NotFound));
    c.execute(AppCommand::ConnectOffering(ProfileId::HeartRate))
        .unwrap();
    assert!(matches!(
        c.next_request(),
        Some(StackRequest::ConnectionCreate { peer: p, .. }) if p == peer(5)
    ));
}

#[test]
fn advertising_waits_for_confirmation() {
    let mut c = booted();
    c.start_advertising().unwrap();
    assert_eq!(c.state(), DeviceState::Idle);
    assert_eq!(c.start_inquiry(), Err(Error::OperationPending));

    c.handle(StackEvent::AdvertisingStarted {
        status: Status::Success,
    });
    assert_eq!(c.state(), DeviceState::Advertising);

    c.stop_advertising().unwrap();
    c.handle(StackEvent::AdvertisingStopped {
        status: Status::Success,
    });
    assert_eq!(c.state(), DeviceState::Idle);
    assert_eq!(c.pending_op(), None);
}

#[test]
fn advertising_failure_is_reported() {
    let mut c = booted();
    c.start_advertising().unwrap();
    c.handle(StackEvent::AdvertisingStarted {
        status: Status::Failed(0x0C),
    });
    assert_eq!(c.state(), DeviceState::Idle);
    assert_eq!(
        events(&mut c),
        vec![AppEvent::AdvertisingFailed(Status::Failed(0x0C))]
    );
}

#[test]
fn incoming_connection_ends_advertising() {
    let mut c = booted();
    c.start_advertising().unwrap();
    c.handle(StackEvent::AdvertisingStarted {
        status: Status::Success,
    });
    events(&mut c);

    c.handle(StackEvent::ConnectionCreateComplete {
        status: Status::Success,
        handle: ConnHandle(4),
        peer: peer(4),
        params: ConnParams::default(),
    });
    assert_eq!(c.state(), DeviceState::Idle);
    assert_eq!(
        c.links().lookup_by_handle(ConnHandle(4)).unwrap().role,
        Role::Peripheral
    );
}

// ═══════════════════════════════════════════════════════════════════════════
// Links
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn connect_registers_link() {
    let mut c = booted();
    let p = peer(0xFF);
    c.begin_connect(p).unwrap();
    requests(&mut c);
    c.handle(StackEvent::ConnectionCreateComplete {
        status: Status::Success,
        handle: ConnHandle(1),
        peer: p,
        params: ConnParams::default(),
    });

    let link = c.links().lookup_by_address(&p.addr).unwrap();
    assert_eq!(link.handle, ConnHandle(1));
    assert_eq!(link.role, Role::Central);
    assert_eq!(
        events(&mut c),
        vec![AppEvent::Connected {
            handle: ConnHandle(1),
            peer: p,
            role: Role::Central
        }]
    );
}

#[test]
fn connect_rejected_when_full_or_duplicate() {
    let mut c = booted();
    let first = connect(&mut c, 0, 1);
    assert_eq!(c.begin_connect(first), Err(Error::AlreadyConnected));

    for i in 1..BLE_CONNECTION_MAX as u8 {
        connect(&mut c, i, i as u16 + 1);
    }
    assert_eq!(c.begin_connect(peer(0x77)), Err(Error::NoSlotAvailable));
    assert_eq!(c.start_advertising(), Err(Error::NoSlotAvailable));
}

#[test]
fn unsolicited_connection_beyond_capacity_is_terminated() {
    let mut c = booted();
    for i in 0..BLE_CONNECTION_MAX as u8 {
        connect(&mut c, i, i as u16 + 1);
    }
    c.handle(StackEvent::ConnectionCreateComplete {
        status: Status::Success,
        handle: ConnHandle(50),
        peer: peer(50),
        params: ConnParams::default(),
    });

    assert_eq!(c.links().active_count(), BLE_CONNECTION_MAX);
    assert_eq!(
        requests(&mut c),
        vec![StackRequest::ConnectionTerminate {
            handle: ConnHandle(50),
            reason: Status::REMOTE_USER_TERMINATED
        }]
    );
}

#[test]
fn cancelled_connect_reports_failure() {
    let mut c = booted();
    assert_eq!(c.cancel_connect(), Err(Error::NotFound));

    c.begin_connect(peer(2)).unwrap();
    c.cancel_connect().unwrap();
    assert_eq!(
        requests(&mut c).last(),
        Some(&StackRequest::ConnectionCancel)
    );
    c.handle(StackEvent::ConnectionCreateComplete {
        status: Status::CANCELLED,
        handle: ConnHandle::INVALID,
        peer: peer(2),
        params: ConnParams::default(),
    });

    assert_eq!(c.pending_op(), None);
    assert_eq!(c.links().active_count(), 0);
    assert_eq!(events(&mut c), vec![AppEvent::ConnectFailed(Status::CANCELLED)]);
}

#[test]
fn disconnect_is_idempotent() {
    let mut c = booted();
    connect(&mut c, 1, 1);

    c.disconnect(ConnHandle(99), Status::REMOTE_USER_TERMINATED)
        .unwrap();
    assert!(requests(&mut c).is_empty());

    c.disconnect(ConnHandle(1), Status::REMOTE_USER_TERMINATED)
        .unwrap();
    c.disconnect(ConnHandle(1), Status::REMOTE_USER_TERMINATED)
        .unwrap();
    assert_eq!(requests(&mut c).len(), 1);

    c.handle(StackEvent::ConnectionTerminated {
        handle: ConnHandle(1),
        reason: Status::LOCAL_HOST_TERMINATED,
    });
    c.handle(StackEvent::ConnectionTerminated {
        handle: ConnHandle(1),
        reason: Status::LOCAL_HOST_TERMINATED,
    });
    let disconnects = events(&mut c)
        .into_iter()
        .filter(|e| matches!(e, AppEvent::Disconnected { .. }))
        .count();
    assert_eq!(disconnects, 1);
    assert_eq!(c.links().active_count(), 0);
}

// ═══════════════════════════════════════════════════════════════════════════
// Bonding
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn bond_requires_security_and_link() {
    let mut c = booted_with(AppConfig {
        security: None,
        ..AppConfig::default()
    });
    let p = connect(&mut c, 1, 1);
    assert_eq!(c.request_bond(p.addr), Err(Error::SecurityDisabled));

    let mut c = booted();
    assert_eq!(c.request_bond(peer(5).addr), Err(Error::NotConnected));
}

#[test]
fn auth_failure_retries_at_lower_tier() {
    let mut c = booted();
    let p = connect(&mut c, 1, 1);
    c.request_bond(p.addr).unwrap();
    let Some(StackRequest::BondInitiate { params, .. }) = c.next_request() else {
        panic!("expected BondInitiate");
    };
    assert_eq!(params.tier, SecurityTier::MitmBond);

    c.handle(StackEvent::BondComplete {
        handle: ConnHandle(1),
        status: BondStatus::Failed(PairingFailure::AuthRequirements),
        bonded: false,
        properties: properties(),
        keys: BondKeys::default(),
    });

    let Some(StackRequest::BondInitiate { params, .. }) = c.next_request() else {
        panic!("expected a retry");
    };
    assert_eq!(params.tier, SecurityTier::NoMitmBond);
    assert!(events(&mut c).is_empty());
    assert!(matches!(
        c.links().lookup_by_handle(ConnHandle(1)).unwrap().bond,
        BondState::Pairing(_)
    ));
}

#[test]
fn terminal_failure_clears_bond_state() {
    let mut c = booted();
    let p = connect(&mut c, 1, 1);
    c.request_bond(p.addr).unwrap();
    requests(&mut c);

    c.handle(StackEvent::BondComplete {
        handle: ConnHandle(1),
        status: BondStatus::Failed(PairingFailure::PairingNotSupported),
        bonded: false,
        properties: properties(),
        keys: BondKeys::default(),
    });

    assert!(requests(&mut c).is_empty());
    assert_eq!(
        events(&mut c),
        vec![AppEvent::BondFailed {
            handle: ConnHandle(1),
            peer: p.addr,
            failure: PairingFailure::PairingNotSupported
        }]
    );
    let link = c.links().lookup_by_handle(ConnHandle(1)).unwrap();
    assert!(link.bond.is_idle());
    assert!(link.security.is_none());
    assert!(!c.bonds().is_bonded(&p.addr));
}

#[test]
fn retry_with_full_outbox_ends_procedure() {
    let mut c = booted();
    let p = connect(&mut c, 1, 1);
    c.request_bond(p.addr).unwrap();
    fill_outbox(&mut c, 1);

    c.handle(bond_failed(1, PairingFailure::AuthRequirements));

    let initiates = requests(&mut c)
        .into_iter()
        .filter(|r| matches!(r, StackRequest::BondInitiate { .. }))
        .count();
    assert_eq!(initiates, 1);
    assert_eq!(
        events(&mut c),
        vec![AppEvent::BondFailed {
            handle: ConnHandle(1),
            peer: p.addr,
            failure: PairingFailure::AuthRequirements
        }]
    );
    assert!(c.links().lookup_by_handle(ConnHandle(1)).unwrap().bond.is_idle());
    c.request_bond(p.addr).unwrap();
}

#[test]
fn oob_unavailable_retries_without_oob() {
    let mut c = booted_with(AppConfig {
        security: Some(SecurityConfig {
            oob: true,
            ..SecurityConfig::default()
        }),
        ..AppConfig::default()
    });
    let p = connect(&mut c, 1, 1);
    c.request_bond(p.addr).unwrap();
    let Some(StackRequest::BondInitiate { params: first, .. }) = c.next_request() else {
        panic!("expected BondInitiate");
    };
    assert!(first.oob);

    c.handle(bond_failed(1, PairingFailure::OobNotAvailable));
    let Some(StackRequest::BondInitiate { params, .. }) = c.next_request() else {
        panic!("expected a retry");
    };
    assert!(!params.oob);
    assert_eq!(params.tier, first.tier);
    assert!(events(&mut c).is_empty());
}

#[test]
fn key_size_rejection_retries_once_with_other_size() {
    let mut c = booted();
    let p = connect(&mut c, 1, 1);
    c.request_bond(p.addr).unwrap();
    requests(&mut c);

    c.handle(bond_failed(1, PairingFailure::EncryptionKeySize));
    let Some(StackRequest::BondInitiate { params, .. }) = c.next_request() else {
        panic!("expected a retry");
    };
    assert_eq!(params.max_key_size, SMP_MIN_ENC_KEY_SIZE);

    c.handle(bond_failed(1, PairingFailure::EncryptionKeySize));
    assert!(requests(&mut c).is_empty());
    assert!(matches!(
        events(&mut c).as_slice(),
        [AppEvent::BondFailed {
            failure: PairingFailure::EncryptionKeySize,
            ..
        }]
    ));
}

#[test]
fn failure_while_responding_is_not_retried() {
    let mut c = booted();
    let p = connect(&mut c, 1, 1);
    c.handle(StackEvent::BondRequested {
        handle: ConnHandle(1),
        peer_auth_req: 0x0D,
        peer_io_capability: IoCapability::DisplayOnly,
    });
    requests(&mut c);

    c.handle(bond_failed(1, PairingFailure::AuthRequirements));

    assert!(requests(&mut c).is_empty());
    assert_eq!(
        events(&mut c),
        vec![AppEvent::BondFailed {
            handle: ConnHandle(1),
            peer: p.addr,
            failure: PairingFailure::AuthRequirements
        }]
    );
    assert!(c.links().lookup_by_handle(ConnHandle(1)).unwrap().bond.is_idle());
}

#[test]
fn unsupported_pairing_drops_existing_link_security() {
    let mut c = booted();
    let p = connect(&mut c, 1, 1);
    c.request_bond(p.addr).unwrap();
    requests(&mut c);
    c.handle(StackEvent::BondComplete {
        handle: ConnHandle(1),
        status: BondStatus::Success,
        bonded: false,
        properties: properties(),
        keys: BondKeys::default(),
    });
    events(&mut c);
    assert!(c.links().lookup_by_handle(ConnHandle(1)).unwrap().security.is_some());

    c.request_bond(p.addr).unwrap();
    requests(&mut c);
    c.handle(bond_failed(1, PairingFailure::PairingNotSupported));

    assert!(c.links().lookup_by_handle(ConnHandle(1)).unwrap().security.is_none());
    assert!(matches!(
        events(&mut c).as_slice(),
        [AppEvent::BondFailed {
            failure: PairingFailure::PairingNotSupported,
            ..
        }]
    ));
}

#[test]
fn failed_repairing_keeps_stored_bond() {
    let mut c = booted();
    let p = connect(&mut c, 1, 1);
    bond(&mut c, p, 1);

    c.handle(StackEvent::BondRequested {
        handle: ConnHandle(1),
        peer_auth_req: 0x0D,
        peer_io_capability: IoCapability::DisplayYesNo,
    });
    requests(&mut c);
    c.handle(bond_failed(1, PairingFailure::Other(0x08)));

    assert!(c.bonds().is_bonded(&p.addr));
    assert!(c.links().lookup_by_handle(ConnHandle(1)).unwrap().security.is_none());
}

#[test]
fn second_bond_request_is_busy() {
    let mut c = booted();
    let p = connect(&mut c, 1, 1);
    c.request_bond(p.addr).unwrap();
    assert_eq!(c.request_bond(p.addr), Err(Error::Busy));
}

#[test]
fn bonded_peer_resumes_encryption() {
    let mut c = booted();
    let p = connect(&mut c, 1, 1);
    bond(&mut c, p, 1);
    assert!(c.bonds().is_bonded(&p.addr));

    c.handle(StackEvent::ConnectionTerminated {
        handle: ConnHandle(1),
        reason: Status::REMOTE_USER_TERMINATED,
    });
    connect(&mut c, 1, 2);

    c.request_bond(p.addr).unwrap();
    assert_eq!(
        c.next_request(),
        Some(StackRequest::EncryptStart {
            handle: ConnHandle(2),
            key: ltk(0x22)
        })
    );
    c.handle(StackEvent::EncryptComplete {
        handle: ConnHandle(2),
        status: Status::Success,
    });
    assert_eq!(
        events(&mut c),
        vec![AppEvent::Encrypted {
            handle: ConnHandle(2),
            properties: properties()
        }]
    );
}

#[test]
fn missing_keys_forget_bond() {
    let mut c = booted();
    let p = connect(&mut c, 1, 1);
    bond(&mut c, p, 1);

    c.request_bond(p.addr).unwrap();
    requests(&mut c);
    c.handle(StackEvent::EncryptComplete {
        handle: ConnHandle(1),
        status: Status::PIN_OR_KEY_MISSING,
    });

    assert!(!c.bonds().is_bonded(&p.addr));
    assert_eq!(
        events(&mut c),
        vec![AppEvent::BondFailed {
            handle: ConnHandle(1),
            peer: p.addr,
            failure: PairingFailure::EncryptionFailed
        }]
    );
}

#[test]
fn transient_encryption_failure_keeps_bond() {
    let mut c = booted();
    let p = connect(&mut c, 1, 1);
    bond(&mut c, p, 1);

    c.request_bond(p.addr).unwrap();
    requests(&mut c);
    // Connection terminated due to MIC failure.
    c.handle(StackEvent::EncryptComplete {
        handle: ConnHandle(1),
        status: Status::Failed(0x3D),
    });

    assert!(c.bonds().is_bonded(&p.addr));
    let link = c.links().lookup_by_handle(ConnHandle(1)).unwrap();
    assert!(link.security.is_none());
    assert!(link.bond.is_idle());
    assert!(matches!(
        events(&mut c).as_slice(),
        [AppEvent::BondFailed {
            failure: PairingFailure::EncryptionFailed,
            ..
        }]
    ));
}

#[test]
fn full_bond_table_reports_store_full() {
    let mut c = booted();
    let mut peers = Vec::new();
    for i in 0..=MAX_BONDED_DEVICES as u8 {
        peers.push(connect(&mut c, i, i as u16 + 1));
    }
    for (i, p) in peers.iter().take(MAX_BONDED_DEVICES).enumerate() {
        bond(&mut c, *p, i as u16 + 1);
    }

    let last = peers[MAX_BONDED_DEVICES];
    let handle = MAX_BONDED_DEVICES as u16 + 1;
    c.request_bond(last.addr).unwrap();
    requests(&mut c);
    c.handle(bond_success(handle));

    let evs = events(&mut c);
    assert!(evs.contains(&AppEvent::BondStoreFull {
        handle: ConnHandle(handle),
        peer: last.addr
    }));
    assert!(evs.contains(&AppEvent::Bonded {
        handle: ConnHandle(handle),
        peer: last.addr,
        bonded: false,
        properties: properties()
    }));
    assert_eq!(c.bonds().len(), MAX_BONDED_DEVICES);
    assert!(!c.bonds().is_bonded(&last.addr));
}

#[test]
fn peer_pairing_request_is_answered() {
    let mut c = booted();
    let p = connect(&mut c, 1, 1);
    c.request_bond(p.addr).unwrap();
    requests(&mut c);

    c.handle(StackEvent::BondRequested {
        handle: ConnHandle(1),
        peer_auth_req: 0x01,
        peer_io_capability: IoCapability::NoInputNoOutput,
    });
    assert_eq!(
        c.next_request(),
        Some(StackRequest::BondRespond {
            handle: ConnHandle(1),
            accept: true,
            auth_req: SecurityTier::MitmBond.auth_req(),
            io_capability: IoCapability::DisplayYesNo
        })
    );
    assert_eq!(
        c.links().lookup_by_handle(ConnHandle(1)).unwrap().bond,
        BondState::Responding
    );
}

#[test]
fn pairing_response_that_cannot_be_queued_leaves_link_idle() {
    let mut c = booted();
    let p = connect(&mut c, 1, 1);
    fill_outbox(&mut c, 1);

    c.handle(StackEvent::BondRequested {
        handle: ConnHandle(1),
        peer_auth_req: 0x01,
        peer_io_capability: IoCapability::NoInputNoOutput,
    });

    assert!(!requests(&mut c)
        .iter()
        .any(|r| matches!(r, StackRequest::BondRespond { .. })));
    assert!(c.links().lookup_by_handle(ConnHandle(1)).unwrap().bond.is_idle());
    c.request_bond(p.addr).unwrap();
}

#[test]
fn pairing_rejected_without_security() {
    let mut c = booted_with(AppConfig {
        security: None,
        ..AppConfig::default()
    });
    connect(&mut c, 1, 1);
    c.handle(StackEvent::BondRequested {
        handle: ConnHandle(1),
        peer_auth_req: 0x05,
        peer_io_capability: IoCapability::KeyboardOnly,
    });
    assert!(matches!(
        c.next_request(),
        Some(StackRequest::BondRespond { accept: false, .. })
    ));
}

#[test]
fn unpair_clears_bond_and_cache() {
    let mut c = booted();
    let p = connect(&mut c, 1, 1);
    bond(&mut c, p, 1);
    c.enable_profile(ConnHandle(1), ProfileId::Battery).unwrap();
    requests(&mut c);
    c.handle(StackEvent::ProfileEnableComplete {
        profile: ProfileId::Battery,
        handle: ConnHandle(1),
        status: Status::Success,
        discovered: Some(blob(&[0x20])),
    });

    assert!(c.unpair(p.addr));
    assert!(!c.unpair(p.addr));
    assert!(!c.bonds().is_bonded(&p.addr));
    assert!(c.session_cache().get(&p.addr, ProfileId::Battery).is_none());
}

// ═══════════════════════════════════════════════════════════════════════════
// Profiles
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn discovery_result_is_reused_after_reconnect() {
    let mut c = booted();
    let p = connect(&mut c, 1, 1);
    bond(&mut c, p, 1);
    c.enable_profile(ConnHandle(1), ProfileId::HeartRate).unwrap();
    assert!(matches!(
        c.next_request(),
        Some(StackRequest::ProfileEnable {
            hint: SessionHint::Discovery,
            cached: None,
            ..
        })
    ));
    c.handle(StackEvent::ProfileEnableComplete {
        profile: ProfileId::HeartRate,
        handle: ConnHandle(1),
        status: Status::Success,
        discovered: Some(blob(&[0x10, 0x11, 0x12])),
    });

    c.handle(StackEvent::ConnectionTerminated {
        handle: ConnHandle(1),
        reason: Status::REMOTE_USER_TERMINATED,
    });
    connect(&mut c, 1, 2);
    assert!(c.session_cache().get(&p.addr, ProfileId::HeartRate).is_some());

    c.enable_profile(ConnHandle(2), ProfileId::HeartRate).unwrap();
    assert_eq!(
        c.next_request(),
        Some(StackRequest::ProfileEnable {
            profile: ProfileId::HeartRate,
            handle: ConnHandle(2),
            hint: SessionHint::Normal,
            cached: Some(blob(&[0x10, 0x11, 0x12]))
        })
    );
}

#[test]
fn unbonded_reconnect_still_discovers() {
    let mut c = booted();
    let p = connect(&mut c, 9, 1);
    c.enable_profile(ConnHandle(1), ProfileId::HeartRate).unwrap();
    requests(&mut c);
    c.handle(StackEvent::ProfileEnableComplete {
        profile: ProfileId::HeartRate,
        handle: ConnHandle(1),
        status: Status::Success,
        discovered: Some(blob(&[0x10, 0x11])),
    });
    assert!(c.session_cache().get(&p.addr, ProfileId::HeartRate).is_none());

    c.handle(StackEvent::ConnectionTerminated {
        handle: ConnHandle(1),
        reason: Status::REMOTE_USER_TERMINATED,
    });
    connect(&mut c, 9, 2);
    c.enable_profile(ConnHandle(2), ProfileId::HeartRate).unwrap();
    assert_eq!(
        c.next_request(),
        Some(StackRequest::ProfileEnable {
            profile: ProfileId::HeartRate,
            handle: ConnHandle(2),
            hint: SessionHint::Discovery,
            cached: None
        })
    );
    assert_eq!(c.session_cache().peer_count(), 0);
}

#[test]
fn discovery_without_usable_table_fails() {
    let mut c = booted();
    let p = connect(&mut c, 1, 1);
    bond(&mut c, p, 1);

    for discovered in [None, Some(blob(&[0x30, 0x31]))] {
        c.enable_profile(ConnHandle(1), ProfileId::Glucose).unwrap();
        requests(&mut c);
        c.handle(StackEvent::ProfileEnableComplete {
            profile: ProfileId::Glucose,
            handle: ConnHandle(1),
            status: Status::Success,
            discovered,
        });

        assert_eq!(
            events(&mut c),
            vec![AppEvent::ProfileEnableFailed {
                handle: ConnHandle(1),
                profile: ProfileId::Glucose,
                status: Status::INVALID_PARAMETERS
            }]
        );
        assert!(c.session_cache().get(&p.addr, ProfileId::Glucose).is_none());
        assert_eq!(
            c.racp_request(ConnHandle(1), ProfileId::Glucose, report_all()),
            Err(Error::ProfileNotEnabled)
        );
    }
}

#[test]
fn failed_normal_enable_invalidates_cache() {
    let mut c = booted();
    let p = connect(&mut c, 1, 1);
    c.enable_profile_with(
        ConnHandle(1),
        ProfileId::Battery,
        SessionHint::Normal,
        Some(blob(&[0x20])),
    )
    .unwrap();
    c.handle(StackEvent::ProfileEnableComplete {
        profile: ProfileId::Battery,
        handle: ConnHandle(1),
        status: Status::Failed(0x0A),
        discovered: None,
    });
    assert!(c.session_cache().get(&p.addr, ProfileId::Battery).is_none());
    assert!(events(&mut c).contains(&AppEvent::ProfileEnableFailed {
        handle: ConnHandle(1),
        profile: ProfileId::Battery,
        status: Status::Failed(0x0A)
    }));
}

#[test]
fn normal_enable_needs_valid_handles() {
    let mut c = booted();
    connect(&mut c, 1, 1);
    assert_eq!(
        c.enable_profile_with(ConnHandle(1), ProfileId::Glucose, SessionHint::Normal, None),
        Err(Error::InvalidHandles)
    );
    assert_eq!(
        c.enable_profile_with(
            ConnHandle(1),
            ProfileId::Glucose,
            SessionHint::Normal,
            Some(blob(&[1, 2]))
        ),
        Err(Error::InvalidHandles)
    );
    assert!(requests(&mut c).is_empty());
}

#[test]
fn enable_twice_without_disable_is_busy() {
    let mut c = booted();
    connect(&mut c, 1, 1);
    c.enable_profile(ConnHandle(1), ProfileId::Battery).unwrap();
    assert_eq!(
        c.enable_profile(ConnHandle(1), ProfileId::Battery),
        Err(Error::Busy)
    );
    assert_eq!(
        c.enable_profile(ConnHandle(9), ProfileId::Battery),
        Err(Error::NotConnected)
    );
}

#[test]
fn unsupported_profile_is_rejected() {
    static ONLY_BATTERY: &[crate::profile::ProfileDescriptor] =
        &[crate::profile::ProfileDescriptor::new(ProfileId::Battery, 0x180F, 1, false)];
    let mut c = SessionController::with_profiles(AppConfig::default(), ONLY_BATTERY);
    assert_eq!(
        c.enable_profile(ConnHandle(1), ProfileId::HeartRate),
        Err(Error::UnsupportedProfile)
    );
}

fn glucose_enabled() -> SessionController {
    let mut c = booted();
    connect(&mut c, 1, 1);
    c.enable_profile(ConnHandle(1), ProfileId::Glucose).unwrap();
    c.handle(StackEvent::ProfileEnableComplete {
        profile: ProfileId::Glucose,
        handle: ConnHandle(1),
        status: Status::Success,
        discovered: Some(blob(&[0x30, 0x31, 0x32, 0x33])),
    });
    requests(&mut c);
    events(&mut c);
    c
}

fn report_all() -> RacpRequest {
    RacpRequest {
        op: RacpOpCode::ReportStoredRecords,
        operator: RacpOperator::AllRecords,
    }
}

#[test]
fn racp_allows_one_operation_and_one_abort() {
    let mut c = glucose_enabled();
    let h = ConnHandle(1);

    assert_eq!(
        c.racp_request(h, ProfileId::Glucose, RacpRequest::abort()),
        Err(Error::NotFound)
    );
    c.racp_request(h, ProfileId::Glucose, report_all()).unwrap();
    assert_eq!(
        c.racp_request(h, ProfileId::Glucose, report_all()),
        Err(Error::Busy)
    );
    c.racp_request(h, ProfileId::Glucose, RacpRequest::abort())
        .unwrap();
    assert_eq!(
        c.racp_request(h, ProfileId::Glucose, RacpRequest::abort()),
        Err(Error::Busy)
    );
    assert_eq!(requests(&mut c).len(), 2);

    c.handle(StackEvent::RacpResponse {
        profile: ProfileId::Glucose,
        handle: h,
        status: RacpStatus::Success,
    });
    assert_eq!(
        events(&mut c),
        vec![AppEvent::RacpComplete {
            handle: h,
            profile: ProfileId::Glucose,
            status: RacpStatus::Success
        }]
    );
    c.racp_request(h, ProfileId::Glucose, report_all()).unwrap();
}

#[test]
fn racp_needs_capable_enabled_profile() {
    let mut c = glucose_enabled();
    assert_eq!(
        c.racp_request(ConnHandle(1), ProfileId::Battery, report_all()),
        Err(Error::RacpUnsupported)
    );
    c.disable_profile(ConnHandle(1), ProfileId::Glucose).unwrap();
    assert_eq!(
        c.racp_request(ConnHandle(1), ProfileId::Glucose, report_all()),
        Err(Error::ProfileNotEnabled)
    );
}

#[test]
fn disconnect_during_racp_leaves_nothing_behind() {
    let mut c = glucose_enabled();
    c.racp_request(ConnHandle(1), ProfileId::Glucose, report_all())
        .unwrap();
    c.handle(StackEvent::ConnectionTerminated {
        handle: ConnHandle(1),
        reason: Status::REMOTE_USER_TERMINATED,
    });
    events(&mut c);

    c.handle(StackEvent::RacpResponse {
        profile: ProfileId::Glucose,
        handle: ConnHandle(1),
        status: RacpStatus::Success,
    });
    assert!(events(&mut c).is_empty());
    assert!(c.links().lookup_by_handle(ConnHandle(1)).is_none());
}

// ═══════════════════════════════════════════════════════════════════════════
// Dispatch
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn rejected_command_is_reported() {
    let mut c = booted();
    assert_eq!(
        c.execute(AppCommand::StopInquiry),
        Err(Error::InvalidState(DeviceState::Idle))
    );
    assert_eq!(
        events(&mut c),
        vec![AppEvent::Rejected(Error::InvalidState(DeviceState::Idle))]
    );

    c.execute(AppCommand::Unpair(peer(1).addr)).unwrap();
    assert!(events(&mut c).is_empty());
}

#[test]
fn full_outbox_rejects_without_side_effects() {
    let mut c = booted();
    connect(&mut c, 1, 1);
    connect(&mut c, 2, 2);

    for profile in FILLERS {
        c.enable_profile(ConnHandle(1), profile).unwrap();
    }

    assert_eq!(
        c.enable_profile(ConnHandle(2), ProfileId::Battery),
        Err(Error::OutboxFull)
    );
    let link = c.links().lookup_by_handle(ConnHandle(2)).unwrap();
    assert!(link.profiles.get(ProfileId::Battery).is_none());
}
