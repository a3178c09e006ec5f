//! Byte transports to the coprocessor.
//!
//! The controller interface only sees the [`Transport`] contract. Two links
//! implement it: [`SpiTransport`] for a coprocessor on an SPI bus with a
//! data-ready interrupt line, and [`SharedMemoryTransport`] for a radio core
//! that exchanges bytes through queues in shared RAM.

mod shared_memory;
mod spi;

pub use shared_memory::{SharedMemoryError, SharedMemoryTransport};
pub use spi::{SpiTransport, SpiTransportError};

/// Raw byte link to an HCI controller.
///
/// Implementations never block indefinitely: each call performs at most one
/// handshake with the peer. Retrying until a deadline is the caller's job.
pub trait Transport: embedded_io::ErrorType {
    /// Number of bytes the peer has pending for us.
    fn bytes_available(&mut self) -> Result<usize, Self::Error>;

    /// Read up to `buf.len()` pending bytes, returning how many were read.
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Write a complete frame.
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Whether the peer will accept `n` bytes right now.
    fn is_ready_to_accept(&mut self, n: usize) -> Result<bool, Self::Error>;

    /// Put the link back into an idle state between handshake attempts.
    fn reenable(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn bytes_available(&mut self) -> Result<usize, Self::Error> {
        T::bytes_available(self)
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        T::read_bytes(self, buf)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        T::write_bytes(self, bytes)
    }

    fn is_ready_to_accept(&mut self, n: usize) -> Result<bool, Self::Error> {
        T::is_ready_to_accept(self, n)
    }

    fn reenable(&mut self) -> Result<(), Self::Error> {
        T::reenable(self)
    }
}
