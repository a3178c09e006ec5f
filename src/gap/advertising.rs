//! Advertising payload encoding.

use super::{ad_type, AdFlags};

/// Size of the legacy advertising and scan response data field.
pub const ADV_DATA_LEN: usize = 31;

/// Service data is only added while fewer than this many bytes are used,
/// leaving room for its length, tag and UUID.
const SERVICE_DATA_CUTOFF: usize = ADV_DATA_LEN - 3;

/// Encoded GAP payload: a zero-padded 31-byte buffer and the number of
/// significant bytes at its start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdvertisingPayload {
    bytes: [u8; ADV_DATA_LEN],
    len: usize,
}

impl AdvertisingPayload {
    /// Payload with no AD structures.
    pub const fn empty() -> Self {
        Self {
            bytes: [0; ADV_DATA_LEN],
            len: 0,
        }
    }

    /// Encode flags, local name and one 16-bit service data element, in that
    /// order.
    ///
    /// - `flags`, if set, takes the first 3 bytes.
    /// - `name`, if non-empty, takes `name.len() + 2` bytes. A name cut short
    ///   by the 31-byte ceiling is tagged as shortened.
    /// - `user_data`, if its data is non-empty and fewer than 28 bytes are
    ///   used so far, takes `data.len() + 4` bytes, truncated to the ceiling.
    ///
    /// Flags and service data are not mutually checked; callers that want
    /// only one of them pass `None` for the other.
    pub fn encode(flags: Option<AdFlags>, name: &str, user_data: Option<(u16, &[u8])>) -> Self {
        let mut out = Self::empty();

        if let Some(flags) = flags {
            out.push(ad_type::FLAGS, &[], &[flags.bits()]);
        }

        if !name.is_empty() {
            let room = ADV_DATA_LEN - out.len - 2;
            let n = name.len().min(room);
            let tag = if n < name.len() {
                ad_type::SHORTENED_LOCAL_NAME
            } else {
                ad_type::COMPLETE_LOCAL_NAME
            };
            out.push(tag, &[], &name.as_bytes()[..n]);
        }

        if let Some((uuid, data)) = user_data {
            if !data.is_empty() && out.len < SERVICE_DATA_CUTOFF {
                let room = ADV_DATA_LEN - out.len - 4;
                let n = data.len().min(room);
                out.push(ad_type::SERVICE_DATA_16, &uuid.to_le_bytes(), &data[..n]);
            }
        }

        out
    }

    /// Wrap pre-encoded AD structures. `None` if longer than 31 bytes.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() > ADV_DATA_LEN {
            return None;
        }
        let mut out = Self::empty();
        out.bytes[..data.len()].copy_from_slice(data);
        out.len = data.len();
        Some(out)
    }

    /// Append one AD structure. Callers keep `head + value` within the
    /// remaining room.
    fn push(&mut self, tag: u8, head: &[u8], value: &[u8]) {
        let body = head.len() + value.len();
        let at = self.len;
        self.bytes[at] = (body + 1) as u8;
        self.bytes[at + 1] = tag;
        self.bytes[at + 2..at + 2 + head.len()].copy_from_slice(head);
        self.bytes[at + 2 + head.len()..at + 2 + body].copy_from_slice(value);
        self.len = at + 2 + body;
    }

    /// Significant bytes, without padding. The radio is told this length;
    /// the padding only fills out the fixed-size command field.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// The full zero-padded buffer, as carried by LE Set Advertising Data.
    pub fn raw(&self) -> &[u8; ADV_DATA_LEN] {
        &self.bytes
    }

    /// Number of significant bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for AdvertisingPayload {
    fn default() -> Self {
        Self::empty()
    }
}
