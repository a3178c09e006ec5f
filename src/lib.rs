#![cfg_attr(not(test), no_std)]
#![doc = "HCI host for Bluetooth LE coprocessors attached over SPI."]
#![doc = ""]
#![doc = "Provides the SPI ready/IRQ transport, HCI command and event framing,"]
#![doc = "GAP advertising payload encoding, scan report decoding and a"]
#![doc = "coordinator that time-shares the radio between advertising and scanning."]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod config;
pub mod device;
pub mod gap;
pub mod hci;
pub mod irq;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{HciConfig, RadioConfig};
pub use device::{Device, Error, Mode, Step};
pub use gap::{AdFlags, AdvertisingPayload, AdvertisingReport, BleAddress, Registry, RemoteDevice};
pub use hci::{Hci, HciError, Opcode};
pub use transport::Transport;
