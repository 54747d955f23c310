//! Bonded-peer table and per-link bonding state.
//!
//! Bond records are created when a bonding procedure completes, looked up
//! when a known peer reconnects, and removed only by an explicit unpair.
//! The table never evicts: a full table rejects new bonds.

use heapless::Vec;

use crate::ble::security::{BondKeys, LtkInfo, PairingAttempt, SecurityProperties};
use crate::ble::{BdAddr, PeerAddr, Role};
use crate::config::MAX_BONDED_DEVICES;
use crate::error::{Error, Result};

/// What we remember about a bonded peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BondRecord {
    pub peer: PeerAddr,
    pub properties: SecurityProperties,
    pub keys: BondKeys,
}

impl BondRecord {
    /// Key used to resume encryption for the given local role.
    ///
    /// As Central we encrypt with what the peer handed us during pairing;
    /// as Peripheral we answer with our own long-term key.
    pub fn key_for_role(&self, role: Role) -> Option<LtkInfo> {
        match role {
            Role::Central => self.keys.peer_ltk,
            Role::Peripheral => self.keys.local_ltk,
        }
    }
}

/// Bonding procedure state of one link. At most one procedure at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BondState {
    Idle,
    /// We initiated pairing; the attempt carries the retry bookkeeping.
    Pairing(PairingAttempt),
    /// We accepted a peer's pairing request.
    Responding,
    /// Resuming encryption with stored keys.
    Encrypting,
}

impl BondState {
    pub fn is_idle(&self) -> bool {
        matches!(self, BondState::Idle)
    }
}

pub struct BondTable {
    records: Vec<BondRecord, MAX_BONDED_DEVICES>,
}

impl BondTable {
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    pub fn find(&self, addr: &BdAddr) -> Option<&BondRecord> {
        self.records.iter().find(|r| r.peer.addr == *addr)
    }

    pub fn is_bonded(&self, addr: &BdAddr) -> bool {
        self.find(addr).is_some()
    }

    /// Store a bond. A peer that re-bonds has its record replaced in place.
    pub fn store(&mut self, record: BondRecord) -> Result<()> {
        if let Some(existing) = self
            .records
            .iter_mut()
            .find(|r| r.peer.addr == record.peer.addr)
        {
            *existing = record;
            debug!("BOND: updated record for {:?}", record.peer.addr);
            return Ok(());
        }

        self.records.push(record).map_err(|_| Error::BondStoreFull)?;
        info!("BOND: stored record - now {} bonded", self.records.len());
        Ok(())
    }

    /// Forget a peer. Returns whether a record existed.
    pub fn remove(&mut self, addr: &BdAddr) -> bool {
        let before = self.records.len();
        self.records.retain(|r| r.peer.addr != *addr);
        before != self.records.len()
    }

    pub fn records(&self) -> &[BondRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for BondTable {
    fn default() -> Self {
        Self::new()
    }
}
