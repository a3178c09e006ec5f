//! SPI link with a ready/IRQ handshake.
//!
//! Every exchange starts with a 5-byte handshake clocked full duplex while chip
//! select is held low:
//!
//! | Direction | Handshake                    | Reply byte 0      | Reply byte 3          |
//! |-----------|------------------------------|-------------------|-----------------------|
//! | write     | `[0x0A, 0x00, 0x00, 0x00, 0x00]` | `0x02` = link up | bytes the peer accepts |
//! | read      | `[0x0B, 0x00, 0x00, 0x00, 0x00]` | `0x02` = link up | bytes the peer has     |
//!
//! When the handshake reports not-ready, chip select must go high again before
//! the next attempt or the coprocessor never leaves its sleep state.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, InputPin, OutputPin};
use embedded_hal::spi::{self, SpiBus};

use super::Transport;

const WRITE_HANDSHAKE: u8 = 0x0A;
const READ_HANDSHAKE: u8 = 0x0B;
const LINK_READY: u8 = 0x02;
const HANDSHAKE_LEN: usize = 5;
const STATUS_READY: usize = 0;
const STATUS_COUNT: usize = 3;
const FILLER: u8 = 0xFF;

/// Default chip-select settle time between handshake attempts.
const DEFAULT_SETTLE_US: u32 = 150;

/// SPI transport error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiTransportError {
    /// SPI bus error.
    Bus(spi::ErrorKind),
    /// Chip select or IRQ pin error.
    Pin(digital::ErrorKind),
    /// A write was attempted while the peer refused the frame size.
    NotReady,
}

#[cfg(feature = "defmt")]
impl defmt::Format for SpiTransportError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Bus(e) => defmt::write!(f, "SPI bus error: {:?}", defmt::Debug2Format(e)),
            Self::Pin(e) => defmt::write!(f, "SPI pin error: {:?}", defmt::Debug2Format(e)),
            Self::NotReady => defmt::write!(f, "SPI peer not ready"),
        }
    }
}

impl core::fmt::Display for SpiTransportError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Bus(e) => write!(f, "SPI bus error: {:?}", e),
            Self::Pin(e) => write!(f, "SPI pin error: {:?}", e),
            Self::NotReady => write!(f, "SPI peer not ready"),
        }
    }
}

impl core::error::Error for SpiTransportError {}

impl embedded_io::Error for SpiTransportError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            Self::NotReady => embedded_io::ErrorKind::WriteZero,
            _ => embedded_io::ErrorKind::Other,
        }
    }
}

fn bus_error<E: spi::Error>(e: E) -> SpiTransportError {
    SpiTransportError::Bus(e.kind())
}

fn pin_error<E: digital::Error>(e: E) -> SpiTransportError {
    SpiTransportError::Pin(e.kind())
}

/// Coprocessor link over an SPI bus, a chip-select output and a data-ready
/// input.
///
/// `IRQ` can be the GPIO itself or an [`IrqLine`](crate::irq::IrqLine)
/// mirrored from interrupt context.
pub struct SpiTransport<SPI, CS, IRQ, D> {
    spi: SPI,
    cs: CS,
    irq: IRQ,
    delay: D,
    settle_us: u32,
    /// Chip select is held low after a successful write handshake.
    armed: bool,
}

impl<SPI, CS, IRQ, D> SpiTransport<SPI, CS, IRQ, D>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
    IRQ: InputPin,
    D: DelayNs,
{
    /// Create a transport. Chip select is driven high immediately.
    pub fn new(spi: SPI, mut cs: CS, irq: IRQ, delay: D) -> Result<Self, SpiTransportError> {
        cs.set_high().map_err(pin_error)?;
        Ok(Self {
            spi,
            cs,
            irq,
            delay,
            settle_us: DEFAULT_SETTLE_US,
            armed: false,
        })
    }

    /// Set the chip-select settle time used by [`Transport::reenable`].
    pub fn with_settle_delay_us(mut self, us: u32) -> Self {
        self.settle_us = us;
        self
    }

    /// Give back the bus, pins and delay.
    pub fn release(self) -> (SPI, CS, IRQ, D) {
        (self.spi, self.cs, self.irq, self.delay)
    }

    fn select(&mut self) -> Result<(), SpiTransportError> {
        self.cs.set_low().map_err(pin_error)
    }

    fn deselect(&mut self) -> Result<(), SpiTransportError> {
        self.armed = false;
        self.spi.flush().map_err(bus_error)?;
        self.cs.set_high().map_err(pin_error)
    }

    /// Run one handshake with chip select already low. Returns the peer's byte
    /// count, or `None` when the link is not up.
    fn handshake(&mut self, op: u8) -> Result<Option<usize>, SpiTransportError> {
        let mut status = [0x00; HANDSHAKE_LEN];
        status[0] = op;
        self.spi.transfer_in_place(&mut status).map_err(bus_error)?;
        if status[STATUS_READY] != LINK_READY {
            trace!("[spi] handshake 0x{:02X}: link not ready (0x{:02X})", op, status[STATUS_READY]);
            return Ok(None);
        }
        Ok(Some(status[STATUS_COUNT] as usize))
    }

    fn data_ready(&mut self) -> Result<bool, SpiTransportError> {
        self.irq.is_high().map_err(pin_error)
    }

    fn read_window(&mut self, buf: &mut [u8]) -> Result<usize, SpiTransportError> {
        let Some(count) = self.handshake(READ_HANDSHAKE)? else {
            return Ok(0);
        };
        let n = count.min(buf.len());
        let window = &mut buf[..n];
        window.fill(FILLER);
        self.spi.transfer_in_place(window).map_err(bus_error)?;
        Ok(n)
    }

    /// Close a write window left open by a handshake nobody followed up on.
    fn disarm(&mut self) -> Result<(), SpiTransportError> {
        if self.armed {
            self.deselect()?;
        }
        Ok(())
    }
}

impl<SPI, CS, IRQ, D> embedded_io::ErrorType for SpiTransport<SPI, CS, IRQ, D> {
    type Error = SpiTransportError;
}

impl<SPI, CS, IRQ, D> Transport for SpiTransport<SPI, CS, IRQ, D>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
    IRQ: InputPin,
    D: DelayNs,
{
    fn bytes_available(&mut self) -> Result<usize, Self::Error> {
        if !self.data_ready()? {
            return Ok(0);
        }
        self.disarm()?;

        self.select()?;
        let status = self.handshake(READ_HANDSHAKE);
        self.deselect()?;
        Ok(status?.unwrap_or(0))
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() || !self.data_ready()? {
            return Ok(0);
        }
        self.disarm()?;

        self.select()?;
        let read = self.read_window(buf);
        self.deselect()?;
        let n = read?;
        trace!("[spi] rx {} bytes", n);
        Ok(n)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        if !self.armed && !self.is_ready_to_accept(bytes.len())? {
            return Err(SpiTransportError::NotReady);
        }

        let written = self.spi.write(bytes).map_err(bus_error);
        self.deselect()?;
        written?;
        trace!("[spi] tx {} bytes", bytes.len());
        Ok(())
    }

    fn is_ready_to_accept(&mut self, n: usize) -> Result<bool, Self::Error> {
        self.disarm()?;

        self.select()?;
        match self.handshake(WRITE_HANDSHAKE) {
            Ok(Some(room)) if room >= n => {
                self.armed = true;
                Ok(true)
            }
            Ok(_) => {
                self.deselect()?;
                Ok(false)
            }
            Err(e) => {
                let _ = self.deselect();
                Err(e)
            }
        }
    }

    fn reenable(&mut self) -> Result<(), Self::Error> {
        self.deselect()?;
        self.delay.delay_us(self.settle_us);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HciConfig;
    use crate::hci::{opcode, Hci, HciError};
    use core::convert::Infallible;
    use embassy_time::Duration;
    use std::collections::VecDeque;
    use std::vec::Vec;

    /// Records pin levels and replays scripted MISO bytes.
    #[derive(Default)]
    struct Wire {
        cs_low: bool,
        cs_toggles: usize,
        mosi: Vec<u8>,
        miso: VecDeque<u8>,
        /// MOSI bytes per chip-select window.
        windows: Vec<Vec<u8>>,
        /// Data-ready level, raised once the peer has taken a frame.
        data_ready: bool,
        delay_calls: usize,
        delay_ns: u64,
    }

    struct Bus<'a>(&'a std::cell::RefCell<Wire>);
    struct Cs<'a>(&'a std::cell::RefCell<Wire>);
    struct Irq(bool);
    struct NoDelay;
    /// Data-ready pin driven by the scripted peer.
    struct PeerIrq<'a>(&'a std::cell::RefCell<Wire>);
    struct CountingDelay<'a>(&'a std::cell::RefCell<Wire>);

    impl spi::ErrorType for Bus<'_> {
        type Error = Infallible;
    }

    impl SpiBus<u8> for Bus<'_> {
        fn read(&mut self, words: &mut [u8]) -> Result<(), Infallible> {
            let mut wire = self.0.borrow_mut();
            for w in words {
                *w = wire.miso.pop_front().unwrap_or(0);
            }
            Ok(())
        }

        fn write(&mut self, words: &[u8]) -> Result<(), Infallible> {
            let mut wire = self.0.borrow_mut();
            wire.mosi.extend_from_slice(words);
            if let Some(window) = wire.windows.last_mut() {
                window.extend_from_slice(words);
            }
            wire.data_ready = true;
            Ok(())
        }

        fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Infallible> {
            self.write(write)?;
            self.read(read)
        }

        fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Infallible> {
            let mut wire = self.0.borrow_mut();
            assert!(wire.cs_low, "clocked with chip select high");
            for w in words {
                wire.mosi.push(*w);
                if let Some(window) = wire.windows.last_mut() {
                    window.push(*w);
                }
                *w = wire.miso.pop_front().unwrap_or(0);
            }
            Ok(())
        }

        fn flush(&mut self) -> Result<(), Infallible> {
            Ok(())
        }
    }

    impl digital::ErrorType for Cs<'_> {
        type Error = Infallible;
    }

    impl OutputPin for Cs<'_> {
        fn set_low(&mut self) -> Result<(), Infallible> {
            let mut wire = self.0.borrow_mut();
            assert!(!wire.cs_low, "chip select lowered without being raised");
            wire.cs_low = true;
            wire.cs_toggles += 1;
            wire.windows.push(Vec::new());
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.0.borrow_mut().cs_low = false;
            Ok(())
        }
    }

    impl digital::ErrorType for Irq {
        type Error = Infallible;
    }

    impl InputPin for Irq {
        fn is_high(&mut self) -> Result<bool, Infallible> {
            Ok(self.0)
        }

        fn is_low(&mut self) -> Result<bool, Infallible> {
            Ok(!self.0)
        }
    }

    impl digital::ErrorType for PeerIrq<'_> {
        type Error = Infallible;
    }

    impl InputPin for PeerIrq<'_> {
        fn is_high(&mut self) -> Result<bool, Infallible> {
            Ok(self.0.borrow().data_ready)
        }

        fn is_low(&mut self) -> Result<bool, Infallible> {
            Ok(!self.0.borrow().data_ready)
        }
    }

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    impl DelayNs for CountingDelay<'_> {
        fn delay_ns(&mut self, ns: u32) {
            let mut wire = self.0.borrow_mut();
            wire.delay_calls += 1;
            wire.delay_ns += ns as u64;
        }
    }

    fn hci_over_spi(
        wire: &std::cell::RefCell<Wire>,
        timeout_ms: u64,
    ) -> Hci<SpiTransport<Bus<'_>, Cs<'_>, PeerIrq<'_>, CountingDelay<'_>>> {
        let link = SpiTransport::new(Bus(wire), Cs(wire), PeerIrq(wire), CountingDelay(wire)).unwrap();
        let config = HciConfig::new().command_timeout(Duration::from_millis(timeout_ms));
        Hci::new(link, config)
    }

    #[test]
    fn read_path_handshakes_then_clocks_filler() {
        let wire = std::cell::RefCell::new(Wire::default());
        wire.borrow_mut()
            .miso
            .extend([0x02, 0x00, 0x00, 0x03, 0x00, 0x04, 0x0E, 0x00]);
        let mut link = SpiTransport::new(Bus(&wire), Cs(&wire), Irq(true), NoDelay).unwrap();

        let mut buf = [0u8; 16];
        let n = link.read_bytes(&mut buf).unwrap();

        assert_eq!(n, 3);
        assert_eq!(&buf[..3], &[0x04, 0x0E, 0x00]);
        let wire = wire.borrow();
        assert_eq!(&wire.mosi[..5], &[READ_HANDSHAKE, 0, 0, 0, 0]);
        assert_eq!(&wire.mosi[5..], &[FILLER; 3]);
        assert!(!wire.cs_low);
    }

    #[test]
    fn idle_irq_skips_the_bus() {
        let wire = std::cell::RefCell::new(Wire::default());
        let mut link = SpiTransport::new(Bus(&wire), Cs(&wire), Irq(false), NoDelay).unwrap();

        assert_eq!(link.bytes_available().unwrap(), 0);
        assert!(wire.borrow().mosi.is_empty());
    }

    #[test]
    fn not_ready_handshake_releases_chip_select() {
        let wire = std::cell::RefCell::new(Wire::default());
        wire.borrow_mut().miso.extend([0x00, 0x00, 0x00, 0x00, 0x00]);
        let mut link = SpiTransport::new(Bus(&wire), Cs(&wire), Irq(false), NoDelay).unwrap();

        assert!(!link.is_ready_to_accept(4).unwrap());
        assert!(!wire.borrow().cs_low);
    }

    #[test]
    fn write_follows_handshake_in_same_window() {
        let wire = std::cell::RefCell::new(Wire::default());
        wire.borrow_mut().miso.extend([0x02, 0x00, 0x00, 0x20, 0x00]);
        let mut link = SpiTransport::new(Bus(&wire), Cs(&wire), Irq(false), NoDelay).unwrap();

        assert!(link.is_ready_to_accept(4).unwrap());
        assert!(wire.borrow().cs_low);
        link.write_bytes(&[0x01, 0x03, 0x0C, 0x00]).unwrap();

        let wire = wire.borrow();
        assert!(!wire.cs_low);
        assert_eq!(wire.cs_toggles, 1);
        assert_eq!(
            &wire.mosi[..],
            &[WRITE_HANDSHAKE, 0, 0, 0, 0, 0x01, 0x03, 0x0C, 0x00]
        );
    }

    #[test]
    fn write_refused_when_peer_buffer_too_small() {
        let wire = std::cell::RefCell::new(Wire::default());
        wire.borrow_mut().miso.extend([0x02, 0x00, 0x00, 0x02, 0x00]);
        let mut link = SpiTransport::new(Bus(&wire), Cs(&wire), Irq(false), NoDelay).unwrap();

        assert_eq!(
            link.write_bytes(&[0x01, 0x03, 0x0C, 0x00]),
            Err(SpiTransportError::NotReady)
        );
        assert!(!wire.borrow().cs_low);
    }

    #[test]
    fn refused_write_is_retried_in_a_fresh_window() {
        let wire = std::cell::RefCell::new(Wire::default());
        wire.borrow_mut().miso.extend(
            [
                // write handshake: link down
                &[0x00, 0x00, 0x00, 0x00, 0x00][..],
                // write handshake: link up, room for 32 bytes
                &[0x02, 0x00, 0x00, 0x20, 0x00],
                // read handshake for bytes_available, then for the read itself
                &[0x02, 0x00, 0x00, 0x07, 0x00],
                &[0x02, 0x00, 0x00, 0x07, 0x00],
                // COMMAND_COMPLETE for Reset
                &[0x04, 0x0E, 0x04, 0x01, 0x03, 0x0C, 0x00],
            ]
            .concat(),
        );
        let mut hci = hci_over_spi(&wire, 200);

        let response = hci.send_command(opcode::RESET, &[]).unwrap();
        assert_eq!(response.status(), Some(0x00));

        let wire = wire.borrow();
        assert!(!wire.cs_low);
        // Each handshake ran in its own chip-select window.
        assert_eq!(wire.windows.len(), 4);
        assert_eq!(wire.windows[0], [WRITE_HANDSHAKE, 0, 0, 0, 0]);
        assert_eq!(
            wire.windows[1],
            [WRITE_HANDSHAKE, 0, 0, 0, 0, 0x01, 0x03, 0x0C, 0x00]
        );
        assert_eq!(wire.windows[2], [READ_HANDSHAKE, 0, 0, 0, 0]);
        assert_eq!(&wire.windows[3][..5], &[READ_HANDSHAKE, 0, 0, 0, 0]);
        assert_eq!(&wire.windows[3][5..], &[FILLER; 7]);
        // Re-enabled once, between the refused and the accepted attempt.
        assert_eq!(wire.delay_calls, 1);
        assert_eq!(wire.delay_ns, DEFAULT_SETTLE_US as u64 * 1000);
    }

    #[test]
    fn link_that_never_comes_up_is_not_ready() {
        let wire = std::cell::RefCell::new(Wire::default());
        let mut hci = hci_over_spi(&wire, 50);

        let started = std::time::Instant::now();
        let result = hci.send_command(opcode::RESET, &[]);
        let elapsed = started.elapsed();

        assert_eq!(result, Err(HciError::NotReady));
        assert!(elapsed >= std::time::Duration::from_millis(50));
        assert!(elapsed < std::time::Duration::from_millis(1000));

        let wire = wire.borrow();
        assert!(!wire.cs_low);
        assert!(!wire.windows.is_empty());
        // Only handshakes went out; the frame never did.
        assert!(wire.windows.iter().all(|w| w[..] == [WRITE_HANDSHAKE, 0, 0, 0, 0]));
        assert_eq!(wire.delay_calls, wire.windows.len());
    }
}
