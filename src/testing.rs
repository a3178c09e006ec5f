//! Scripted coprocessor for unit tests.

use std::collections::VecDeque;
use std::vec::Vec;

use bt_hci::cmd::Cmd;
use bt_hci::WriteHci;

use crate::hci::frame::{event, subevent, PACKET_COMMAND, PACKET_EVENT};
use crate::hci::opcode;
use crate::hci::Opcode;
use crate::transport::Transport;

/// Answers every command with a successful COMMAND_COMPLETE unless told
/// otherwise.
#[derive(Default)]
pub(crate) struct FakeController {
    /// Bytes waiting for the host.
    pub inbound: VecDeque<u8>,
    /// Every command frame the host wrote, in order.
    pub commands: Vec<(Opcode, Vec<u8>)>,
    /// Never reports ready-to-write.
    pub refuse_writes: bool,
    /// Commands that get no completion at all.
    pub silent: Vec<Opcode>,
    /// Commands completed with the given non-zero status.
    pub failing: Vec<(Opcode, u8)>,
    /// TX power reported by LE Read Advertising Channel TX Power.
    pub tx_power: i8,
}

impl FakeController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes.iter().copied());
    }

    pub fn opcodes(&self) -> Vec<Opcode> {
        self.commands.iter().map(|(op, _)| *op).collect()
    }

    pub fn args_of(&self, op: Opcode) -> Vec<Vec<u8>> {
        self.commands
            .iter()
            .filter(|(o, _)| *o == op)
            .map(|(_, a)| a.clone())
            .collect()
    }

    fn answer(&mut self, op: Opcode) {
        if self.silent.contains(&op) {
            return;
        }
        if let Some((_, status)) = self.failing.iter().find(|(o, _)| *o == op) {
            let frame = command_complete(op, *status, &[]);
            self.queue(&frame);
            return;
        }
        let ret: Vec<u8> = if op == opcode::LE_READ_ADVERTISING_CHANNEL_TX_POWER {
            std::vec![self.tx_power as u8]
        } else if op == opcode::READ_BD_ADDR {
            std::vec![0x66, 0x55, 0x44, 0x33, 0x22, 0x11]
        } else {
            Vec::new()
        };
        let frame = command_complete(op, 0x00, &ret);
        self.queue(&frame);
    }
}

impl embedded_io::ErrorType for FakeController {
    type Error = embedded_io::ErrorKind;
}

impl Transport for FakeController {
    fn bytes_available(&mut self) -> Result<usize, Self::Error> {
        Ok(self.inbound.len())
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let n = buf.len().min(self.inbound.len());
        for slot in buf[..n].iter_mut() {
            *slot = self.inbound.pop_front().unwrap_or(0);
        }
        Ok(n)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        assert_eq!(bytes[0], PACKET_COMMAND);
        assert_eq!(bytes[3] as usize, bytes.len() - 4);
        let op = Opcode::from_le_bytes([bytes[1], bytes[2]]);
        self.commands.push((op, bytes[4..].to_vec()));
        self.answer(op);
        Ok(())
    }

    fn is_ready_to_accept(&mut self, _n: usize) -> Result<bool, Self::Error> {
        Ok(!self.refuse_writes)
    }
}

/// Parameter block of a typed command, as `bt-hci` serializes it, without
/// the opcode and length header.
pub(crate) fn command_params<C: Cmd>(cmd: &C) -> Vec<u8> {
    let mut buf = [0u8; 260];
    let left = {
        let mut out = &mut buf[..];
        cmd.write_hci(&mut out).unwrap();
        out.len()
    };
    buf[3..buf.len() - left].to_vec()
}

/// `[0x04, 0x0E, len, 1, opcode, status, ret...]`
pub(crate) fn command_complete(op: Opcode, status: u8, ret: &[u8]) -> Vec<u8> {
    let [lo, hi] = op.to_le_bytes();
    let mut frame = std::vec![PACKET_EVENT, event::COMMAND_COMPLETE, (4 + ret.len()) as u8, 0x01, lo, hi, status];
    frame.extend_from_slice(ret);
    frame
}

/// `[0x04, 0x0F, 4, status, 1, opcode]`
pub(crate) fn command_status(op: Opcode, status: u8) -> Vec<u8> {
    let [lo, hi] = op.to_le_bytes();
    std::vec![PACKET_EVENT, event::COMMAND_STATUS, 0x04, status, 0x01, lo, hi]
}

/// LE advertising report parameters (the bytes after the LE meta event
/// header): one report carrying `ad` and `rssi`.
pub(crate) fn report_params(address: [u8; 6], ad: &[u8], rssi: i8) -> Vec<u8> {
    let mut params = std::vec![subevent::ADVERTISING_REPORT, 0x01, 0x00, 0x00];
    params.extend_from_slice(&address);
    params.push(ad.len() as u8);
    params.extend_from_slice(ad);
    params.push(rssi as u8);
    params
}

/// Full wire frame of an LE advertising report event.
pub(crate) fn advertising_report(address: [u8; 6], ad: &[u8], rssi: i8) -> Vec<u8> {
    let params = report_params(address, ad, rssi);
    let mut frame = std::vec![PACKET_EVENT, event::LE_META, params.len() as u8];
    frame.extend_from_slice(&params);
    frame
}

/// AD structures: a complete local name followed by one 16-bit service data
/// element.
pub(crate) fn name_and_service_data(name: &str, uuid: u16, data: &[u8]) -> Vec<u8> {
    let mut ad = std::vec![(name.len() + 1) as u8, 0x09];
    ad.extend_from_slice(name.as_bytes());
    ad.push((data.len() + 3) as u8);
    ad.push(0x16);
    ad.extend_from_slice(&uuid.to_le_bytes());
    ad.extend_from_slice(data);
    ad
}
