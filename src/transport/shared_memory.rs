//! Shared-memory link to a radio core on the same die.
//!
//! Each direction is a lock-free single-producer/single-consumer byte queue
//! placed in RAM visible to both cores. The host owns the producer of the
//! outbound queue and the consumer of the inbound one.

use heapless::spsc::{Consumer, Producer};

use super::Transport;

/// Shared-memory transport error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SharedMemoryError {
    /// The outbound queue filled up mid-frame.
    Overflow {
        /// Bytes of the frame that made it into the queue.
        written: usize,
    },
}

impl core::fmt::Display for SharedMemoryError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Overflow { written } => {
                write!(f, "shared-memory queue overflow after {} bytes", written)
            }
        }
    }
}

impl core::error::Error for SharedMemoryError {}

impl embedded_io::Error for SharedMemoryError {
    fn kind(&self) -> embedded_io::ErrorKind {
        embedded_io::ErrorKind::OutOfMemory
    }
}

/// [`Transport`] over a pair of SPSC byte queues.
pub struct SharedMemoryTransport<'a, const TX: usize, const RX: usize> {
    tx: Producer<'a, u8, TX>,
    rx: Consumer<'a, u8, RX>,
}

impl<'a, const TX: usize, const RX: usize> SharedMemoryTransport<'a, TX, RX> {
    /// Create a transport from the host ends of both queues.
    pub fn new(tx: Producer<'a, u8, TX>, rx: Consumer<'a, u8, RX>) -> Self {
        Self { tx, rx }
    }

    /// Give back the queue ends.
    pub fn release(self) -> (Producer<'a, u8, TX>, Consumer<'a, u8, RX>) {
        (self.tx, self.rx)
    }

    fn free(&self) -> usize {
        self.tx.capacity() - self.tx.len()
    }
}

impl<const TX: usize, const RX: usize> embedded_io::ErrorType for SharedMemoryTransport<'_, TX, RX> {
    type Error = SharedMemoryError;
}

impl<const TX: usize, const RX: usize> Transport for SharedMemoryTransport<'_, TX, RX> {
    fn bytes_available(&mut self) -> Result<usize, Self::Error> {
        Ok(self.rx.len())
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut n = 0;
        for slot in buf.iter_mut() {
            match self.rx.dequeue() {
                Some(b) => *slot = b,
                None => break,
            }
            n += 1;
        }
        Ok(n)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        for (written, b) in bytes.iter().enumerate() {
            if self.tx.enqueue(*b).is_err() {
                return Err(SharedMemoryError::Overflow { written });
            }
        }
        Ok(())
    }

    fn is_ready_to_accept(&mut self, n: usize) -> Result<bool, Self::Error> {
        Ok(self.free() >= n)
    }
}
