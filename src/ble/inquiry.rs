//! Inquiry collector - peers seen during the current scan.
//!
//! The list is rebuilt from empty on every inquiry. Results are
//! deduplicated by address; once the list is full further peers are
//! dropped silently. After the inquiry completes the list stays available
//! so the application can pick a peer to connect to.

use heapless::{String, Vec};

use crate::ble::adv_parser::{local_name, service_uuids16};
use crate::ble::{AddrType, BdAddr, PeerAddr};
use crate::config::{ADV_SERVICES_MAX, INQUIRY_MAX};

/// One discovered peer.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InquiryEntry {
    pub peer: PeerAddr,
    /// Received Signal Strength Indicator (dBm) of the first report.
    pub rssi: i8,
    /// Advertised local name, empty when none was seen.
    pub name: String<32>,
    /// 16-bit service UUIDs advertised so far; extras beyond the capacity
    /// are dropped.
    pub services: Vec<u16, ADV_SERVICES_MAX>,
}

impl InquiryEntry {
    /// Whether the peer advertised `uuid`.
    pub fn offers(&self, uuid: u16) -> bool {
        self.services.contains(&uuid)
    }

    fn add_services(&mut self, adv_data: &[u8]) {
        for uuid in service_uuids16(adv_data) {
            if !self.services.contains(&uuid) && self.services.push(uuid).is_err() {
                break;
            }
        }
    }
}

pub struct InquiryCollector {
    entries: Vec<InquiryEntry, INQUIRY_MAX>,
}

impl InquiryCollector {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Forget the previous inquiry.
    pub fn begin(&mut self) {
        self.entries.clear();
    }

    /// Record an advertising report. Returns the entry if it is new.
    ///
    /// A repeated address only fills in a name that was missing the first
    /// time (scan responses usually carry it) and adds new service UUIDs.
    pub fn record(
        &mut self,
        addr: BdAddr,
        kind: AddrType,
        rssi: i8,
        adv_data: &[u8],
    ) -> Option<&InquiryEntry> {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.peer.addr == addr) {
            if existing.name.is_empty() {
                if let Some(name) = local_name(adv_data) {
                    existing.name = name;
                }
            }
            existing.add_services(adv_data);
            return None;
        }

        if self.entries.is_full() {
            return None;
        }

        let mut entry = InquiryEntry {
            peer: PeerAddr::new(addr, kind),
            rssi,
            name: local_name(adv_data).unwrap_or_default(),
            services: Vec::new(),
        };
        entry.add_services(adv_data);
        self.entries.push(entry).ok()?;
        self.entries.last()
    }

    pub fn entries(&self) -> &[InquiryEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&InquiryEntry> {
        self.entries.get(index)
    }

    /// Index of the first peer advertising `uuid`.
    pub fn position_offering(&self, uuid: u16) -> Option<usize> {
        self.entries.iter().position(|e| e.offers(uuid))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for InquiryCollector {
    fn default() -> Self {
        Self::new()
    }
}
