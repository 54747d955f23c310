//! Retained discovery results, keyed by peer address.
//!
//! The key is the peer address rather than the connection handle because a
//! reconnecting peer gets a new handle. Entries are optimistic: nothing
//! detects a peer whose GATT database changed between connections.

use heapless::Vec;

use super::{HandleBlob, ProfileId};
use crate::ble::BdAddr;
use crate::config::{MAX_PROFILES_PER_LINK, SESSION_CACHE_MAX};

struct PeerEntry {
    addr: BdAddr,
    profiles: Vec<(ProfileId, HandleBlob), MAX_PROFILES_PER_LINK>,
}

pub struct SessionCache {
    /// Least recently stored peer first.
    peers: Vec<PeerEntry, SESSION_CACHE_MAX>,
}

impl SessionCache {
    pub const fn new() -> Self {
        Self { peers: Vec::new() }
    }

    pub fn get(&self, addr: &BdAddr, profile: ProfileId) -> Option<&HandleBlob> {
        self.peers
            .iter()
            .find(|p| p.addr == *addr)?
            .profiles
            .iter()
            .find(|(id, _)| *id == profile)
            .map(|(_, handles)| handles)
    }

    /// Retain `handles` for `profile` on `addr`, replacing an older table.
    ///
    /// A new peer evicts the least recently stored one when the cache is full.
    pub fn store(&mut self, addr: BdAddr, profile: ProfileId, handles: HandleBlob) {
        let mut entry = match self.peers.iter().position(|p| p.addr == addr) {
            Some(index) => self.peers.remove(index),
            None => {
                if self.peers.is_full() {
                    let evicted = self.peers.remove(0);
                    debug!("PROFILE: cache full - evicting {:?}", evicted.addr);
                }
                PeerEntry {
                    addr,
                    profiles: Vec::new(),
                }
            }
        };

        if let Some(slot) = entry.profiles.iter_mut().find(|(id, _)| *id == profile) {
            slot.1 = handles;
        } else if entry.profiles.push((profile, handles)).is_err() {
            warn!("PROFILE: cache entry full for {:?}", addr);
        }

        // A slot was freed above, so this cannot fail.
        let _ = self.peers.push(entry);
    }

    /// Drop one profile's table, e.g. after it proved stale.
    pub fn invalidate(&mut self, addr: &BdAddr, profile: ProfileId) {
        if let Some(entry) = self.peers.iter_mut().find(|p| p.addr == *addr) {
            entry.profiles.retain(|(id, _)| *id != profile);
        }
    }

    /// Forget everything about `addr`. Returns whether anything was held.
    pub fn forget(&mut self, addr: &BdAddr) -> bool {
        let before = self.peers.len();
        self.peers.retain(|p| p.addr != *addr);
        before != self.peers.len()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new()
    }
}
