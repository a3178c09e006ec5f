use bt_hci::param::BdAddr;

/// 48-bit device address, stored as a 16-bit most significant part and a
/// 32-bit least significant part.
///
/// Equality compares the address only; the public/random address type is
/// carried separately where it matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BleAddress {
    pub msb: u16,
    pub lsb: u32,
}

impl BleAddress {
    pub const fn new(msb: u16, lsb: u32) -> Self {
        Self { msb, lsb }
    }

    /// From the little-endian wire order used by HCI.
    pub const fn from_le_bytes(b: [u8; 6]) -> Self {
        Self {
            lsb: u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            msb: u16::from_le_bytes([b[4], b[5]]),
        }
    }

    pub const fn to_le_bytes(self) -> [u8; 6] {
        let l = self.lsb.to_le_bytes();
        let m = self.msb.to_le_bytes();
        [l[0], l[1], l[2], l[3], m[0], m[1]]
    }

    pub const fn as_u64(self) -> u64 {
        ((self.msb as u64) << 32) | self.lsb as u64
    }
}

impl From<BdAddr> for BleAddress {
    fn from(addr: BdAddr) -> Self {
        let mut b = [0u8; 6];
        b.copy_from_slice(addr.raw());
        Self::from_le_bytes(b)
    }
}

impl From<BleAddress> for BdAddr {
    fn from(addr: BleAddress) -> Self {
        BdAddr::new(addr.to_le_bytes())
    }
}

impl core::fmt::Display for BleAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let b = self.to_le_bytes();
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[5], b[4], b[3], b[2], b[1], b[0]
        )
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for BleAddress {
    fn format(&self, f: defmt::Formatter) {
        let b = self.to_le_bytes();
        defmt::write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[5],
            b[4],
            b[3],
            b[2],
            b[1],
            b[0]
        )
    }
}
