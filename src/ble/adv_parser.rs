//! Advertising data helpers for inquiry results.

use heapless::String;

/// AD types: Incomplete / Complete list of 16-bit service UUIDs.
pub const AD_UUID16_INCOMPLETE: u8 = 0x02;
pub const AD_UUID16_COMPLETE: u8 = 0x03;
/// AD types: Shortened / Complete local name.
pub const AD_NAME_SHORT: u8 = 0x08;
pub const AD_NAME_COMPLETE: u8 = 0x09;

/// Iterator over `(ad_type, payload)` pairs in raw advertising data.
///
/// Stops at the first zero-length or truncated structure.
pub struct AdStructures<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for AdStructures<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let len = *self.data.get(self.pos)? as usize;
        if len == 0 || self.pos + len >= self.data.len() {
            self.pos = self.data.len();
            return None;
        }
        let ad_type = self.data[self.pos + 1];
        let payload = &self.data[self.pos + 2..self.pos + 1 + len];
        self.pos += len + 1;
        Some((ad_type, payload))
    }
}

pub fn ad_structures(data: &[u8]) -> AdStructures<'_> {
    AdStructures { data, pos: 0 }
}

/// 16-bit service UUIDs from both the complete and incomplete lists.
pub fn service_uuids16(data: &[u8]) -> impl Iterator<Item = u16> + '_ {
    ad_structures(data)
        .filter(|(t, _)| *t == AD_UUID16_INCOMPLETE || *t == AD_UUID16_COMPLETE)
        .flat_map(|(_, payload)| payload.chunks_exact(2))
        .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
}

/// Complete or shortened local name, truncated to the string capacity.
/// A complete name wins over a shortened one.
pub fn local_name(data: &[u8]) -> Option<String<32>> {
    let mut shortened = None;
    for (ad_type, payload) in ad_structures(data) {
        match ad_type {
            AD_NAME_COMPLETE => return Some(to_name(payload)),
            AD_NAME_SHORT if shortened.is_none() => shortened = Some(to_name(payload)),
            _ => {}
        }
    }
    shortened
}

fn to_name(bytes: &[u8]) -> String<32> {
    let mut name = String::new();
    for &b in bytes {
        if name.push(b as char).is_err() {
            break;
        }
    }
    name
}
