//! Session controller - the single dispatch context.
//!
//! Owns the device state machine, link registry, bond table, inquiry list
//! and profile session cache. Application operations and stack events are
//! processed synchronously to completion; whatever must go to the stack or
//! up to the application is queued in bounded outboxes that the owner
//! drains with [`SessionController::next_request`] and
//! [`SessionController::next_event`]. Nothing is called out while a
//! message is being handled, so a handler can never be re-entered.

use heapless::Deque;

use crate::ble::bonding::{BondRecord, BondState, BondTable};
use crate::ble::device_state::{
    DeviceMachine, DeviceState, PendingOp, SetupOutcome, SetupStep,
};
use crate::ble::inquiry::InquiryCollector;
use crate::ble::link::{LinkRecord, LinkRegistry};
use crate::ble::security::{
    classify_failure, BondKeys, BondStatus, FailureAction, IoCapability, PairingAttempt,
    PairingFailure, SecurityProperties,
};
use crate::ble::{BdAddr, ConnHandle, PeerAddr, Role, Status};
use crate::config::{AppConfig, ConnParams, EVENT_DEPTH, OUTBOX_DEPTH};
use crate::error::{Error, Result};
use crate::message::{AppCommand, AppEvent, LocalIdentity, SetupInfo, StackEvent, StackRequest};
use crate::profile::cache::SessionCache;
use crate::profile::racp::{RacpRequest, RacpStatus};
use crate::profile::session::EnableOutcome;
use crate::profile::{lookup, HandleBlob, ProfileDescriptor, ProfileId, SessionHint, ALL_PROFILES};

#[cfg(test)]
mod tests;

pub struct SessionController {
    config: AppConfig,
    profiles: &'static [ProfileDescriptor],
    device: DeviceMachine,
    links: LinkRegistry,
    bonds: BondTable,
    inquiry: InquiryCollector,
    cache: SessionCache,
    identity: LocalIdentity,
    requests: Deque<StackRequest, OUTBOX_DEPTH>,
    events: Deque<AppEvent, EVENT_DEPTH>,
}

impl SessionController {
    /// Controller driving every profile in [`ALL_PROFILES`].
    pub fn new(config: AppConfig) -> Self {
        Self::with_profiles(config, ALL_PROFILES)
    }

    /// Controller limited to the client roles in `profiles`.
    pub fn with_profiles(config: AppConfig, profiles: &'static [ProfileDescriptor]) -> Self {
        Self {
            config,
            profiles,
            device: DeviceMachine::new(),
            links: LinkRegistry::new(),
            bonds: BondTable::new(),
            inquiry: InquiryCollector::new(),
            cache: SessionCache::new(),
            identity: empty_identity(),
            requests: Deque::new(),
            events: Deque::new(),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn state(&self) -> DeviceState {
        self.device.state()
    }

    pub fn pending_op(&self) -> Option<PendingOp> {
        self.device.pending()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn identity(&self) -> &LocalIdentity {
        &self.identity
    }

    pub fn links(&self) -> &LinkRegistry {
        &self.links
    }

    pub fn bonds(&self) -> &BondTable {
        &self.bonds
    }

    pub fn inquiry(&self) -> &InquiryCollector {
        &self.inquiry
    }

    pub fn session_cache(&self) -> &SessionCache {
        &self.cache
    }

    /// Next request for the host stack, oldest first.
    pub fn next_request(&mut self) -> Option<StackRequest> {
        self.requests.pop_front()
    }

    /// Next notification for the application, oldest first.
    pub fn next_event(&mut self) -> Option<AppEvent> {
        self.events.pop_front()
    }

    // ------------------------------------------------------------------
    // Device state
    // ------------------------------------------------------------------

    /// Start the setup sequence from `Init`.
    pub fn boot(&mut self) -> Result<()> {
        self.reserve(1)?;
        let first = self.device.begin_setup()?;
        info!("GAP: boot - setup step {:?}", first);
        self.send(StackRequest::Setup(first))
    }

    /// Return to a fresh `Init` after a stack reset.
    ///
    /// Links, inquiry results and queued messages are dropped. Bonds and the
    /// session cache survive: they describe peers, not this power cycle.
    pub fn reset(&mut self) {
        warn!("GAP: reset - dropping {} links", self.links.active_count());
        self.device.reset();
        self.links = LinkRegistry::new();
        self.inquiry = InquiryCollector::new();
        self.identity = empty_identity();
        self.requests.clear();
        self.events.clear();
    }

    pub fn start_inquiry(&mut self) -> Result<()> {
        self.device.require(DeviceState::Idle)?;
        self.reserve(1)?;
        self.inquiry.begin();
        self.device.enter(DeviceState::Scanning);
        info!("GAP: inquiry started");
        self.send(StackRequest::DeviceInquiryStart {
            inquiry_type: self.config.inquiry_type,
            own_addr_type: self.config.own_addr_type,
        })?;
        self.notify(AppEvent::StateChanged(DeviceState::Scanning));
        Ok(())
    }

    pub fn stop_inquiry(&mut self) -> Result<()> {
        self.device.require(DeviceState::Scanning)?;
        self.reserve(1)?;
        self.device.set_pending(PendingOp::InquiryStop);
        self.send(StackRequest::DeviceInquiryStop)
    }

    pub fn start_advertising(&mut self) -> Result<()> {
        self.device.require(DeviceState::Idle)?;
        if self.links.is_full() {
            return Err(Error::NoSlotAvailable);
        }
        self.reserve(1)?;
        self.device.set_pending(PendingOp::AdvertisingStart);
        self.send(StackRequest::AdvertisingStart {
            own_addr_type: self.config.own_addr_type,
            interval_min: self.config.adv_interval_min,
            interval_max: self.config.adv_interval_max,
        })
    }

    pub fn stop_advertising(&mut self) -> Result<()> {
        self.device.require(DeviceState::Advertising)?;
        self.reserve(1)?;
        self.device.set_pending(PendingOp::AdvertisingStop);
        self.send(StackRequest::AdvertisingStop)
    }

    // ------------------------------------------------------------------
    // Links
    // ------------------------------------------------------------------

    pub fn begin_connect(&mut self, peer: PeerAddr) -> Result<()> {
        self.device.require(DeviceState::Idle)?;
        if self.links.is_full() {
            return Err(Error::NoSlotAvailable);
        }
        if self.links.lookup_by_address(&peer.addr).is_some() {
            return Err(Error::AlreadyConnected);
        }
        self.reserve(1)?;
        self.device.set_pending(PendingOp::Connect);
        info!("LINK: connecting to {:?}", peer.addr);
        self.send(StackRequest::ConnectionCreate {
            peer,
            own_addr_type: self.config.own_addr_type,
            params: self.config.conn_params,
        })
    }

    /// Connect to the peer at `index` of the last inquiry.
    pub fn connect_to_inquiry_result(&mut self, index: usize) -> Result<()> {
        let peer = self.inquiry.get(index).ok_or(Error::NotFound)?.peer;
        self.begin_connect(peer)
    }

    /// Connect to the first peer of the last inquiry that advertised the
    /// service of `profile`.
    pub fn connect_offering(&mut self, profile: ProfileId) -> Result<()> {
        let uuid = self.descriptor(profile)?.service_uuid;
        let index = self.inquiry.position_offering(uuid).ok_or(Error::NotFound)?;
        self.connect_to_inquiry_result(index)
    }

    /// Abort a connection attempt that has not completed yet.
    pub fn cancel_connect(&mut self) -> Result<()> {
        if self.device.pending() != Some(PendingOp::Connect) {
            return Err(Error::NotFound);
        }
        self.reserve(1)?;
        self.device.set_pending(PendingOp::ConnectCancel);
        self.send(StackRequest::ConnectionCancel)
    }

    /// Request termination. Unknown or already-terminating handles are a no-op.
    pub fn disconnect(&mut self, handle: ConnHandle, reason: u8) -> Result<()> {
        match self.links.lookup_by_handle(handle) {
            None => return Ok(()),
            Some(link) if link.terminating => return Ok(()),
            Some(_) => {}
        }
        self.reserve(1)?;
        if let Some(link) = self.links.lookup_by_handle_mut(handle) {
            link.terminating = true;
        }
        self.send(StackRequest::ConnectionTerminate { handle, reason })
    }

    // ------------------------------------------------------------------
    // Security
    // ------------------------------------------------------------------

    /// Pair with, or resume encryption towards, a connected peer.
    pub fn request_bond(&mut self, addr: BdAddr) -> Result<()> {
        let security = self.config.security.ok_or(Error::SecurityDisabled)?;
        let link = self.links.lookup_by_address(&addr).ok_or(Error::NotConnected)?;
        if !link.bond.is_idle() {
            return Err(Error::Busy);
        }
        let (handle, role) = (link.handle, link.role);
        self.reserve(1)?;

        let stored_key = self.bonds.find(&addr).and_then(|r| r.key_for_role(role));
        let (state, request) = match stored_key {
            Some(key) => {
                info!("BOND: {:?} already bonded - starting encryption", addr);
                (BondState::Encrypting, StackRequest::EncryptStart { handle, key })
            }
            None => {
                let attempt = PairingAttempt::new(security.initial_pairing());
                info!("BOND: pairing {:?} at {:?}", addr, attempt.params.tier);
                (
                    BondState::Pairing(attempt),
                    StackRequest::BondInitiate {
                        handle,
                        peer: addr,
                        params: attempt.params,
                    },
                )
            }
        };

        if let Some(link) = self.links.lookup_by_handle_mut(handle) {
            link.bond = state;
        }
        self.send(request)
    }

    /// Forget a bonded peer. Never fails; returns whether a bond existed.
    pub fn unpair(&mut self, addr: BdAddr) -> bool {
        let removed = self.bonds.remove(&addr);
        self.cache.forget(&addr);
        if removed {
            info!("BOND: unpaired {:?}", addr);
        }
        removed
    }

    // ------------------------------------------------------------------
    // Profiles
    // ------------------------------------------------------------------

    /// Enable `profile`, reusing retained handles when the peer is bonded.
    pub fn enable_profile(&mut self, handle: ConnHandle, profile: ProfileId) -> Result<()> {
        let descriptor = self.descriptor(profile)?;
        let link = self.links.lookup_by_handle(handle).ok_or(Error::NotConnected)?;
        let peer = link.peer.addr;
        let cached = self
            .cache
            .get(&peer, profile)
            .filter(|h| self.bonds.is_bonded(&peer) && descriptor.accepts(h))
            .cloned();
        let hint = if cached.is_some() {
            SessionHint::Normal
        } else {
            SessionHint::Discovery
        };
        self.enable_profile_with(handle, profile, hint, cached)
    }

    /// Enable `profile` in an explicit mode. `Normal` needs `handles`.
    pub fn enable_profile_with(
        &mut self,
        handle: ConnHandle,
        profile: ProfileId,
        hint: SessionHint,
        handles: Option<HandleBlob>,
    ) -> Result<()> {
        let descriptor = self.descriptor(profile)?;
        let cached = match hint {
            SessionHint::Discovery => None,
            SessionHint::Normal => match handles {
                Some(h) if descriptor.accepts(&h) => Some(h),
                _ => return Err(Error::InvalidHandles),
            },
        };

        let link = self.links.lookup_by_handle(handle).ok_or(Error::NotConnected)?;
        link.profiles.can_enable(profile)?;
        self.reserve(1)?;

        if let Some(link) = self.links.lookup_by_handle_mut(handle) {
            link.profiles.begin_enable(profile, hint, cached.clone())?;
        }
        debug!("PROFILE: enabling {:?} on {} ({:?})", profile, handle.0, hint);
        self.send(StackRequest::ProfileEnable {
            profile,
            handle,
            hint,
            cached,
        })
    }

    /// Stop using `profile` on the link. Returns whether it was active.
    pub fn disable_profile(&mut self, handle: ConnHandle, profile: ProfileId) -> Result<bool> {
        let link = self
            .links
            .lookup_by_handle_mut(handle)
            .ok_or(Error::NotConnected)?;
        Ok(link.profiles.disable(profile))
    }

    /// Issue a record access control point operation.
    pub fn racp_request(
        &mut self,
        handle: ConnHandle,
        profile: ProfileId,
        request: RacpRequest,
    ) -> Result<()> {
        if !self.descriptor(profile)?.racp {
            return Err(Error::RacpUnsupported);
        }
        self.reserve(1)?;
        let link = self
            .links
            .lookup_by_handle_mut(handle)
            .ok_or(Error::NotConnected)?;
        let racp = link
            .profiles
            .racp_mut(profile)
            .ok_or(Error::ProfileNotEnabled)?;
        racp.admit(&request)?;
        self.send(StackRequest::RacpWrite {
            profile,
            handle,
            request,
        })
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Run an application command. A refusal is also reported as
    /// [`AppEvent::Rejected`].
    pub fn execute(&mut self, command: AppCommand) -> Result<()> {
        let result = match command {
            AppCommand::StartInquiry => self.start_inquiry(),
            AppCommand::StopInquiry => self.stop_inquiry(),
            AppCommand::StartAdvertising => self.start_advertising(),
            AppCommand::StopAdvertising => self.stop_advertising(),
            AppCommand::Connect(peer) => self.begin_connect(peer),
            AppCommand::ConnectInquiryResult(index) => self.connect_to_inquiry_result(index),
            AppCommand::ConnectOffering(profile) => self.connect_offering(profile),
            AppCommand::CancelConnect => self.cancel_connect(),
            AppCommand::Disconnect(handle) => {
                self.disconnect(handle, Status::REMOTE_USER_TERMINATED)
            }
            AppCommand::Bond(addr) => self.request_bond(addr),
            AppCommand::Unpair(addr) => {
                self.unpair(addr);
                Ok(())
            }
            AppCommand::EnableProfile { handle, profile } => self.enable_profile(handle, profile),
            AppCommand::DisableProfile { handle, profile } => {
                self.disable_profile(handle, profile).map(|_| ())
            }
            AppCommand::Racp {
                handle,
                profile,
                request,
            } => self.racp_request(handle, profile, request),
        };

        if let Err(e) = result {
            warn!("GAP: command rejected: {:?}", e);
            self.notify(AppEvent::Rejected(e));
        }
        result
    }

    /// Apply one confirmation or indication from the host stack.
    pub fn handle(&mut self, event: StackEvent) {
        match event {
            StackEvent::SetupComplete { step, status, info } => {
                self.on_setup_complete(step, status, info)
            }
            StackEvent::DeviceInquiryResult {
                peer,
                rssi,
                adv_data,
            } => self.on_inquiry_result(peer, rssi, &adv_data),
            StackEvent::DeviceInquiryComplete { status } => self.on_inquiry_complete(status),
            StackEvent::AdvertisingStarted { status } => self.on_advertising_started(status),
            StackEvent::AdvertisingStopped { status } => self.on_advertising_stopped(status),
            StackEvent::ConnectionCreateComplete {
                status,
                handle,
                peer,
                params,
            } => self.on_connect_result(status, handle, peer, params),
            StackEvent::ConnectionTerminated { handle, reason } => {
                self.on_disconnect(handle, reason)
            }
            StackEvent::BondRequested {
                handle,
                peer_auth_req,
                peer_io_capability,
            } => self.on_bond_request_indication(handle, peer_auth_req, peer_io_capability),
            StackEvent::BondComplete {
                handle,
                status,
                bonded,
                properties,
                keys,
            } => self.on_bond_result(handle, status, bonded, properties, keys),
            StackEvent::EncryptComplete { handle, status } => {
                self.on_encrypt_result(handle, status)
            }
            StackEvent::ProfileEnableComplete {
                profile,
                handle,
                status,
                discovered,
            } => self.on_profile_enable_result(profile, handle, status, discovered),
            StackEvent::RacpResponse {
                profile,
                handle,
                status,
            } => self.on_racp_response(profile, handle, status),
        }
    }

    fn on_setup_complete(&mut self, step: SetupStep, status: Status, info: SetupInfo) {
        if status.is_success() {
            match info {
                SetupInfo::Version {
                    hci_version,
                    hci_revision,
                    manufacturer,
                } => {
                    self.identity.hci_version = hci_version;
                    self.identity.hci_revision = hci_revision;
                    self.identity.manufacturer = manufacturer;
                }
                SetupInfo::LocalAddress(addr) => self.identity.address = Some(addr),
                SetupInfo::None => {}
            }
        }

        match self.device.on_setup_complete(step, status) {
            SetupOutcome::Next(next) => {
                debug!("GAP: setup step {:?} done, next {:?}", step, next);
                if self.send(StackRequest::Setup(next)).is_err() {
                    let status = Status::MEMORY_CAPACITY_EXCEEDED;
                    if let Some(step) = self.device.abort_setup(status) {
                        error!("GAP: setup step {:?} could not be queued", step);
                        self.notify(AppEvent::SetupFailed { step, status });
                    }
                }
            }
            SetupOutcome::Complete => {
                info!("GAP: setup complete - device idle");
                self.notify(AppEvent::Ready(self.identity));
                self.notify(AppEvent::StateChanged(DeviceState::Idle));
            }
            SetupOutcome::Failed { step, status } => {
                error!("GAP: setup failed at {:?} ({:?})", step, status);
                self.notify(AppEvent::SetupFailed { step, status });
            }
            SetupOutcome::Ignored => {
                warn!("GAP: unexpected setup confirmation {:?}", step);
            }
        }
    }

    fn on_inquiry_result(&mut self, peer: PeerAddr, rssi: i8, adv_data: &[u8]) {
        if self.device.state() != DeviceState::Scanning {
            return;
        }
        let new_entry = self
            .inquiry
            .record(peer.addr, peer.kind, rssi, adv_data)
            .cloned();
        if let Some(entry) = new_entry {
            debug!("GAP: found {:?} (RSSI {})", entry.peer.addr, entry.rssi);
            self.notify(AppEvent::InquiryResult(entry));
        }
    }

    fn on_inquiry_complete(&mut self, status: Status) {
        if self.device.state() != DeviceState::Scanning {
            warn!("GAP: inquiry complete outside of scanning");
            return;
        }
        self.device.take_pending(PendingOp::InquiryStop);
        self.device.enter(DeviceState::Idle);
        let count = self.inquiry.len();
        info!("GAP: inquiry complete ({:?}) - {} peers", status, count);
        self.notify(AppEvent::InquiryComplete { count });
        self.notify(AppEvent::StateChanged(DeviceState::Idle));
    }

    fn on_advertising_started(&mut self, status: Status) {
        if !self.device.take_pending(PendingOp::AdvertisingStart) {
            warn!("GAP: unexpected advertising start confirmation");
            return;
        }
        if status.is_success() {
            self.device.enter(DeviceState::Advertising);
            self.notify(AppEvent::StateChanged(DeviceState::Advertising));
        } else {
            warn!("GAP: advertising start failed ({:?})", status);
            self.notify(AppEvent::AdvertisingFailed(status));
        }
    }

    fn on_advertising_stopped(&mut self, status: Status) {
        let requested = self.device.take_pending(PendingOp::AdvertisingStop);
        if self.device.state() != DeviceState::Advertising {
            return;
        }
        if status.is_success() {
            self.device.enter(DeviceState::Idle);
            self.notify(AppEvent::StateChanged(DeviceState::Idle));
        } else if requested {
            warn!("GAP: advertising stop failed ({:?})", status);
            self.notify(AppEvent::AdvertisingFailed(status));
        }
    }

    fn on_connect_result(
        &mut self,
        status: Status,
        handle: ConnHandle,
        peer: PeerAddr,
        params: ConnParams,
    ) {
        let initiated = self.device.take_pending(PendingOp::Connect)
            || self.device.take_pending(PendingOp::ConnectCancel);

        if !status.is_success() {
            if initiated {
                warn!("LINK: connection to {:?} failed ({:?})", peer.addr, status);
                self.notify(AppEvent::ConnectFailed(status));
            }
            return;
        }

        let role = if initiated {
            Role::Central
        } else {
            Role::Peripheral
        };

        if role == Role::Peripheral && self.device.state() == DeviceState::Advertising {
            // Accepting a connection ends advertising.
            self.device.take_pending(PendingOp::AdvertisingStop);
            self.device.enter(DeviceState::Idle);
            self.notify(AppEvent::StateChanged(DeviceState::Idle));
        }

        match self.links.insert(LinkRecord::new(handle, peer, role, params)) {
            Ok(id) => {
                info!(
                    "LINK: {:?} connected as {:?} - handle {} slot {}",
                    peer.addr, role, handle.0, id.0
                );
                self.notify(AppEvent::Connected { handle, peer, role });
            }
            Err(Error::NoSlotAvailable) => {
                warn!("LINK: no free slot for {:?} - refusing", peer.addr);
                let refused = self.send(StackRequest::ConnectionTerminate {
                    handle,
                    reason: Status::REMOTE_USER_TERMINATED,
                });
                if refused.is_err() {
                    error!("LINK: could not queue refusal of handle {}", handle.0);
                }
            }
            Err(e) => {
                error!("LINK: handle {} already in use ({:?})", handle.0, e);
            }
        }
    }

    fn on_disconnect(&mut self, handle: ConnHandle, reason: u8) {
        let Some(record) = self.links.remove(handle) else {
            debug!("LINK: disconnect for unknown handle {}", handle.0);
            return;
        };

        if !record.bond.is_idle() {
            debug!("BOND: abandoning {:?} on handle {}", record.bond, handle.0);
        }
        for session in record.profiles.iter() {
            if !session.racp.is_idle() {
                debug!("PROFILE: abandoning RACP on {:?}", session.profile);
            }
        }

        info!("LINK: {:?} disconnected (reason {})", record.peer.addr, reason);
        self.notify(AppEvent::Disconnected {
            handle,
            peer: record.peer,
            reason,
        });
    }

    fn on_bond_request_indication(
        &mut self,
        handle: ConnHandle,
        peer_auth_req: u8,
        peer_io: IoCapability,
    ) {
        let Some(link) = self.links.lookup_by_handle_mut(handle) else {
            return;
        };
        debug!(
            "BOND: peer requests pairing (auth {}, io {:?})",
            peer_auth_req, peer_io
        );

        let response = match self.config.security {
            Some(security) => {
                if matches!(link.bond, BondState::Pairing(_)) {
                    debug!("BOND: peer procedure supersedes local attempt");
                }
                StackRequest::BondRespond {
                    handle,
                    accept: true,
                    auth_req: security.tier.auth_req(),
                    io_capability: security.io_capability,
                }
            }
            None => {
                info!("BOND: security disabled - rejecting pairing");
                StackRequest::BondRespond {
                    handle,
                    accept: false,
                    auth_req: 0,
                    io_capability: IoCapability::NoInputNoOutput,
                }
            }
        };
        let accept = matches!(response, StackRequest::BondRespond { accept: true, .. });
        if self.send(response).is_err() {
            // The peer's SMP timeout ends its procedure; ours stays as it was.
            error!("BOND: could not queue pairing response on {}", handle.0);
            return;
        }
        if !accept {
            return;
        }
        if let Some(link) = self.links.lookup_by_handle_mut(handle) {
            link.bond = BondState::Responding;
        }
    }

    fn on_bond_result(
        &mut self,
        handle: ConnHandle,
        status: BondStatus,
        bonded: bool,
        properties: SecurityProperties,
        keys: BondKeys,
    ) {
        let Some(link) = self.links.lookup_by_handle_mut(handle) else {
            debug!("BOND: result for gone handle {}", handle.0);
            return;
        };
        let previous = core::mem::replace(&mut link.bond, BondState::Idle);
        let peer = link.peer;

        let failure = match status {
            BondStatus::Success => {
                link.security = Some(properties);
                self.on_bond_success(handle, peer, bonded, properties, keys);
                return;
            }
            BondStatus::Failed(failure) => failure,
        };

        if let BondState::Pairing(attempt) = previous {
            if let FailureAction::Retry(next) = classify_failure(&attempt, failure) {
                info!(
                    "BOND: {:?} - retrying at {:?} (retry {})",
                    failure, next.params.tier, next.retries
                );
                let retry = StackRequest::BondInitiate {
                    handle,
                    peer: peer.addr,
                    params: next.params,
                };
                if self.send(retry).is_ok() {
                    if let Some(link) = self.links.lookup_by_handle_mut(handle) {
                        link.bond = BondState::Pairing(next);
                    }
                    return;
                }
                error!("BOND: retry could not be queued - giving up");
            }
        }

        // A stored bond stays: only unpair or a key-missing encryption
        // failure removes it.
        if let Some(link) = self.links.lookup_by_handle_mut(handle) {
            link.security = None;
        }
        warn!("BOND: pairing with {:?} failed: {:?}", peer.addr, failure);
        self.notify(AppEvent::BondFailed {
            handle,
            peer: peer.addr,
            failure,
        });
    }

    fn on_bond_success(
        &mut self,
        handle: ConnHandle,
        peer: PeerAddr,
        bonded: bool,
        properties: SecurityProperties,
        keys: BondKeys,
    ) {
        if !bonded {
            info!("BOND: {:?} encrypted without bonding", peer.addr);
            self.notify(AppEvent::Bonded {
                handle,
                peer: peer.addr,
                bonded: false,
                properties,
            });
            return;
        }

        let record = BondRecord {
            peer,
            properties,
            keys,
        };
        match self.bonds.store(record) {
            Ok(()) => {
                info!("BOND: bonded with {:?}", peer.addr);
                self.notify(AppEvent::Bonded {
                    handle,
                    peer: peer.addr,
                    bonded: true,
                    properties,
                });
            }
            Err(_) => {
                warn!("BOND: table full - {:?} not remembered", peer.addr);
                self.notify(AppEvent::BondStoreFull {
                    handle,
                    peer: peer.addr,
                });
                self.notify(AppEvent::Bonded {
                    handle,
                    peer: peer.addr,
                    bonded: false,
                    properties,
                });
            }
        }
    }

    fn on_encrypt_result(&mut self, handle: ConnHandle, status: Status) {
        let Some(link) = self.links.lookup_by_handle_mut(handle) else {
            return;
        };
        if link.bond != BondState::Encrypting {
            debug!("BOND: encryption result without request on {}", handle.0);
            return;
        }
        link.bond = BondState::Idle;
        let peer = link.peer.addr;

        if status.is_success() {
            let properties = self.bonds.find(&peer).map(|r| r.properties);
            link.security = properties;
            if let Some(properties) = properties {
                info!("BOND: link {} encrypted with stored keys", handle.0);
                self.notify(AppEvent::Encrypted { handle, properties });
            }
            return;
        }

        link.security = None;
        if status == Status::PIN_OR_KEY_MISSING {
            info!("BOND: {:?} lost its keys - forgetting bond", peer);
            self.bonds.remove(&peer);
            self.cache.forget(&peer);
        }
        warn!("BOND: encryption with {:?} failed ({:?})", peer, status);
        self.notify(AppEvent::BondFailed {
            handle,
            peer,
            failure: PairingFailure::EncryptionFailed,
        });
    }

    fn on_profile_enable_result(
        &mut self,
        profile: ProfileId,
        handle: ConnHandle,
        status: Status,
        discovered: Option<HandleBlob>,
    ) {
        let Ok(descriptor) = self.descriptor(profile) else {
            debug!("PROFILE: enable result for unknown {:?}", profile);
            return;
        };
        let Some(link) = self.links.lookup_by_handle_mut(handle) else {
            return;
        };
        let peer = link.peer.addr;

        match link
            .profiles
            .complete_enable(&descriptor, status.is_success(), discovered)
        {
            EnableOutcome::Enabled { hint, handles } => {
                if hint == SessionHint::Discovery && self.bonds.is_bonded(&peer) {
                    self.cache.store(peer, profile, handles.clone());
                }
                info!("PROFILE: {:?} enabled on {} ({:?})", profile, handle.0, hint);
                self.notify(AppEvent::ProfileEnabled {
                    handle,
                    profile,
                    hint,
                    handles,
                });
            }
            EnableOutcome::Failed { hint } => {
                if hint == SessionHint::Normal {
                    self.cache.invalidate(&peer, profile);
                }
                warn!("PROFILE: {:?} enable failed ({:?})", profile, status);
                self.notify(AppEvent::ProfileEnableFailed {
                    handle,
                    profile,
                    status,
                });
            }
            EnableOutcome::UnusableTable => {
                warn!("PROFILE: {:?} discovery returned no usable handles", profile);
                self.notify(AppEvent::ProfileEnableFailed {
                    handle,
                    profile,
                    status: Status::INVALID_PARAMETERS,
                });
            }
            EnableOutcome::Unexpected => {
                debug!("PROFILE: stray enable result for {:?}", profile);
            }
        }
    }

    fn on_racp_response(&mut self, profile: ProfileId, handle: ConnHandle, status: RacpStatus) {
        let completed = self
            .links
            .lookup_by_handle_mut(handle)
            .and_then(|link| link.profiles.racp_mut(profile))
            .and_then(|racp| racp.complete());
        if completed.is_some() {
            self.notify(AppEvent::RacpComplete {
                handle,
                profile,
                status,
            });
        } else {
            debug!("PROFILE: RACP response with nothing outstanding");
        }
    }

    // ------------------------------------------------------------------
    // Outboxes
    // ------------------------------------------------------------------

    fn descriptor(&self, profile: ProfileId) -> Result<ProfileDescriptor> {
        lookup(self.profiles, profile)
            .copied()
            .ok_or(Error::UnsupportedProfile)
    }

    /// Make sure `count` requests fit before touching any state.
    fn reserve(&self, count: usize) -> Result<()> {
        if OUTBOX_DEPTH - self.requests.len() < count {
            return Err(Error::OutboxFull);
        }
        Ok(())
    }

    /// Queue a request. Operations `reserve` first, so only stack-event
    /// handlers can see this fail and they must undo their own state.
    fn send(&mut self, request: StackRequest) -> Result<()> {
        self.requests.push_back(request).map_err(|_| {
            error!("GAP: request queue full");
            Error::OutboxFull
        })
    }

    fn notify(&mut self, event: AppEvent) {
        if self.events.push_back(event).is_err() {
            warn!("GAP: event queue full - dropping event");
        }
    }
}

fn empty_identity() -> LocalIdentity {
    LocalIdentity {
        address: None,
        hci_version: 0,
        hci_revision: 0,
        manufacturer: 0,
    }
}
