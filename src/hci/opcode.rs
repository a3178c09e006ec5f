//! HCI command opcodes.
//!
//! [`Opcode`] wraps [`bt_hci::cmd::Opcode`] and adds the raw pack/unpack
//! surface the engine needs for correlation and logging. The well-known
//! values below are taken from the `bt-hci` command definitions.

use bt_hci::cmd::{self, controller_baseband, info, le, Cmd, OpcodeGroup};

const LE_GROUP: u8 = 0x08;

/// HCI command opcode: a 6-bit group field (OGF) above a 10-bit command
/// field (OCF).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Opcode(cmd::Opcode);

impl Opcode {
    /// Pack an opcode from its group and command fields.
    pub fn new(ogf: u8, ocf: u16) -> Self {
        Self(cmd::Opcode::new(OpcodeGroup::new(ogf & 0x3F), ocf & 0x03FF))
    }

    /// Opcode of a `bt-hci` command type.
    pub const fn of<C: Cmd>() -> Self {
        Self(C::OPCODE)
    }

    /// Packed 16-bit value.
    pub fn raw(self) -> u16 {
        self.0.to_raw()
    }

    /// Group field.
    pub fn ogf(self) -> u8 {
        (self.raw() >> 10) as u8
    }

    /// Command field.
    pub fn ocf(self) -> u16 {
        self.0.cmd()
    }

    pub fn to_le_bytes(self) -> [u8; 2] {
        self.raw().to_le_bytes()
    }

    pub fn from_le_bytes(bytes: [u8; 2]) -> Self {
        let raw = u16::from_le_bytes(bytes);
        Self::new((raw >> 10) as u8, raw)
    }

    /// Whether this is an LE controller command.
    pub fn is_le(self) -> bool {
        self.ogf() == LE_GROUP
    }

    pub const fn into_inner(self) -> cmd::Opcode {
        self.0
    }
}

impl From<cmd::Opcode> for Opcode {
    fn from(op: cmd::Opcode) -> Self {
        Self(op)
    }
}

impl From<Opcode> for cmd::Opcode {
    fn from(op: Opcode) -> Self {
        op.0
    }
}

impl core::fmt::Display for Opcode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "0x{:04X} (ogf 0x{:02X}, ocf 0x{:03X})", self.raw(), self.ogf(), self.ocf())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Opcode {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "0x{:04X}", self.raw())
    }
}

pub const RESET: Opcode = Opcode::of::<controller_baseband::Reset>();

pub const READ_BD_ADDR: Opcode = Opcode::of::<info::ReadBdAddr>();

pub const LE_SET_ADVERTISING_PARAMETERS: Opcode = Opcode::of::<le::LeSetAdvParams>();
pub const LE_READ_ADVERTISING_CHANNEL_TX_POWER: Opcode =
    Opcode::of::<le::LeReadAdvPhysicalChannelTxPower>();
pub const LE_SET_ADVERTISING_DATA: Opcode = Opcode::of::<le::LeSetAdvData>();
pub const LE_SET_SCAN_RESPONSE_DATA: Opcode = Opcode::of::<le::LeSetScanResponseData>();
pub const LE_SET_ADVERTISE_ENABLE: Opcode = Opcode::of::<le::LeSetAdvEnable>();
pub const LE_SET_SCAN_PARAMETERS: Opcode = Opcode::of::<le::LeSetScanParams>();
pub const LE_SET_SCAN_ENABLE: Opcode = Opcode::of::<le::LeSetScanEnable>();
