//! HCI packet framing.
//!
//! Packet type codes (Bluetooth Core, Vol 4, Part A):
//! - `0x01`: command (host → controller)
//! - `0x02`: ACL data (both directions)
//! - `0x04`: event (controller → host)

use bt_hci::event::{CommandComplete, CommandStatus};
use bt_hci::{FromHciBytes, PacketKind};
use embassy_time::Instant;
use heapless::Vec;

use super::Opcode;

pub const PACKET_COMMAND: u8 = PacketKind::Cmd as u8;
pub const PACKET_ACL: u8 = PacketKind::AclData as u8;
pub const PACKET_EVENT: u8 = PacketKind::Event as u8;

/// Event codes.
pub mod event {
    pub const COMMAND_COMPLETE: u8 = 0x0E;
    pub const COMMAND_STATUS: u8 = 0x0F;
    pub const LE_META: u8 = 0x3E;
}

/// LE meta subevent codes.
pub mod subevent {
    pub const ADVERTISING_REPORT: u8 = 0x02;
}

pub const MAX_COMMAND_ARGS: usize = 255;
pub const MAX_EVENT_PARAMS: usize = 255;
/// LE data packet length extension maximum.
pub const MAX_ACL_PAYLOAD: usize = 251;

pub(crate) const COMMAND_HEADER_LEN: usize = 4;
pub(crate) const EVENT_HEADER_LEN: usize = 3;
pub(crate) const ACL_HEADER_LEN: usize = 5;

/// `[ncmd, opcode_lo, opcode_hi]` at the start of COMMAND_COMPLETE.
const COMPLETE_ECHO_LEN: usize = 3;

/// Encode a command frame from a raw opcode and argument block into `buf`,
/// returning the frame length. Typed commands go through `bt-hci`'s
/// `WriteHci` instead.
///
/// `buf` must hold `COMMAND_HEADER_LEN + args.len()` bytes and `args` must be
/// at most [`MAX_COMMAND_ARGS`] long.
pub(crate) fn encode_command(opcode: Opcode, args: &[u8], buf: &mut [u8]) -> usize {
    let [lo, hi] = opcode.to_le_bytes();
    buf[0] = PACKET_COMMAND;
    buf[1] = lo;
    buf[2] = hi;
    buf[3] = args.len() as u8;
    buf[COMMAND_HEADER_LEN..COMMAND_HEADER_LEN + args.len()].copy_from_slice(args);
    COMMAND_HEADER_LEN + args.len()
}

/// A buffered event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFrame {
    pub code: u8,
    pub params: Vec<u8, MAX_EVENT_PARAMS>,
    pub received_at: Instant,
}

impl EventFrame {
    /// LE meta subevent code, if this is an LE meta event.
    pub fn subevent(&self) -> Option<u8> {
        match self.code {
            event::LE_META => self.params.first().copied(),
            _ => None,
        }
    }

    pub fn is_advertising_report(&self) -> bool {
        self.subevent() == Some(subevent::ADVERTISING_REPORT)
    }

    /// The opcode this event completes, for COMMAND_COMPLETE and
    /// COMMAND_STATUS events. `None` for other events or a header too short
    /// to carry the opcode.
    pub fn completes(&self) -> Option<Opcode> {
        let opcode = match self.code {
            event::COMMAND_COMPLETE => CommandComplete::from_hci_bytes(&self.params).ok()?.0.cmd_opcode,
            event::COMMAND_STATUS => CommandStatus::from_hci_bytes(&self.params).ok()?.0.cmd_opcode,
            _ => return None,
        };
        Some(opcode.into())
    }
}

/// A buffered asynchronous (ACL) data packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclFrame {
    /// Connection handle (12 bits).
    pub handle: u16,
    /// Packet boundary and broadcast flags (4 bits).
    pub flags: u8,
    pub payload: Vec<u8, MAX_ACL_PAYLOAD>,
    pub received_at: Instant,
}

/// Return parameters of a completed command.
///
/// Holds the COMMAND_COMPLETE parameters after the opcode echo: the status
/// byte followed by command-specific return values. Empty for commands
/// completed through COMMAND_STATUS.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResponse {
    bytes: Vec<u8, MAX_EVENT_PARAMS>,
}

impl CommandResponse {
    pub(crate) fn from_complete(params: &[u8]) -> Self {
        let mut bytes = Vec::new();
        let rest = params.get(COMPLETE_ECHO_LEN..).unwrap_or(&[]);
        // Both bounded by MAX_EVENT_PARAMS.
        let _ = bytes.extend_from_slice(rest);
        Self { bytes }
    }

    /// Status byte, `0x00` on success.
    pub fn status(&self) -> Option<u8> {
        self.bytes.first().copied()
    }

    /// Return values after the status byte.
    pub fn return_params(&self) -> &[u8] {
        self.bytes.get(1..).unwrap_or(&[])
    }

    /// Status and return values.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
