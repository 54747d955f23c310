//! Link registry - one record per live connection.
//!
//! Backed by a fixed slot arena of `BLE_CONNECTION_MAX` entries. A
//! record's [`LinkId`] (its slot index) is stable for the life of the
//! connection; the connection handle is unique among live records.

use crate::ble::bonding::BondState;
use crate::ble::security::SecurityProperties;
use crate::ble::{BdAddr, ConnHandle, PeerAddr, Role};
use crate::config::{ConnParams, BLE_CONNECTION_MAX};
use crate::error::{Error, Result};
use crate::profile::session::ProfileSessions;
use crate::slots::Slots;

/// Slot index of a live link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkId(pub usize);

pub struct LinkRecord {
    pub handle: ConnHandle,
    pub peer: PeerAddr,
    pub role: Role,
    pub params: ConnParams,
    pub bond: BondState,
    /// Security currently in force on the link, if encrypted.
    pub security: Option<SecurityProperties>,
    /// A `ConnectionTerminate` was issued for this link.
    pub terminating: bool,
    pub profiles: ProfileSessions,
}

impl LinkRecord {
    pub fn new(handle: ConnHandle, peer: PeerAddr, role: Role, params: ConnParams) -> Self {
        Self {
            handle,
            peer,
            role,
            params,
            bond: BondState::Idle,
            security: None,
            terminating: false,
            profiles: ProfileSessions::new(),
        }
    }
}

pub struct LinkRegistry {
    links: Slots<LinkRecord, BLE_CONNECTION_MAX>,
}

impl LinkRegistry {
    pub fn new() -> Self {
        Self {
            links: Slots::new(),
        }
    }

    pub fn is_full(&self) -> bool {
        self.links.is_full()
    }

    pub fn active_count(&self) -> usize {
        self.links.len()
    }

    /// Allocate a record for a freshly established connection.
    pub fn insert(&mut self, record: LinkRecord) -> Result<LinkId> {
        if !record.handle.is_valid() || self.id_by_handle(record.handle).is_some() {
            return Err(Error::Busy);
        }
        self.links
            .insert(record)
            .map(LinkId)
            .map_err(|_| Error::NoSlotAvailable)
    }

    /// Free the record for `handle`, if any.
    pub fn remove(&mut self, handle: ConnHandle) -> Option<LinkRecord> {
        let id = self.id_by_handle(handle)?;
        self.links.remove(id.0)
    }

    pub fn id_by_handle(&self, handle: ConnHandle) -> Option<LinkId> {
        self.links.position(|l| l.handle == handle).map(LinkId)
    }

    pub fn lookup_by_handle(&self, handle: ConnHandle) -> Option<&LinkRecord> {
        self.id_by_handle(handle).and_then(|id| self.links.get(id.0))
    }

    pub fn lookup_by_handle_mut(&mut self, handle: ConnHandle) -> Option<&mut LinkRecord> {
        let id = self.id_by_handle(handle)?;
        self.links.get_mut(id.0)
    }

    pub fn lookup_by_address(&self, addr: &BdAddr) -> Option<&LinkRecord> {
        self.links
            .position(|l| l.peer.addr == *addr)
            .and_then(|i| self.links.get(i))
    }

    pub fn lookup_by_index(&self, id: LinkId) -> Option<&LinkRecord> {
        self.links.get(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (LinkId, &LinkRecord)> {
        self.links.iter().map(|(i, l)| (LinkId(i), l))
    }
}

impl Default for LinkRegistry {
    fn default() -> Self {
        Self::new()
    }
}
