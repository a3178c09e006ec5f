//! Controller interface errors.

use super::Opcode;

/// Error returned by [`Hci`](super::Hci) operations.
///
/// `E` is the transport's error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HciError<E> {
    /// The transport itself failed.
    Transport(E),
    /// The link never accepted the command frame before the deadline.
    NotReady,
    /// The command went out but no completion arrived before the deadline.
    Timeout,
    /// The controller completed the command with a non-zero status.
    CommandFailed {
        opcode: Opcode,
        status: u8,
    },
    /// The completion carried return parameters that make no sense.
    InvalidResponse {
        opcode: Opcode,
    },
    /// Command arguments exceed the 255-byte parameter field.
    ArgumentsTooLong(usize),
}

impl<E> HciError<E> {
    /// The peer never answered (link down or no completion).
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::NotReady | Self::Timeout)
    }
}

impl<E: core::fmt::Debug> core::fmt::Display for HciError<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "HCI transport error: {:?}", e),
            Self::NotReady => write!(f, "HCI link not ready before deadline"),
            Self::Timeout => write!(f, "HCI command completion timed out"),
            Self::CommandFailed { opcode, status } => {
                write!(f, "HCI command {} failed with status 0x{:02X}", opcode, status)
            }
            Self::InvalidResponse { opcode } => {
                write!(f, "HCI command {} returned an invalid response", opcode)
            }
            Self::ArgumentsTooLong(len) => {
                write!(f, "HCI command arguments too long: {} bytes", len)
            }
        }
    }
}

impl<E: core::fmt::Debug> core::error::Error for HciError<E> {}

impl<E: embedded_io::Error> From<E> for HciError<E> {
    fn from(e: E) -> Self {
        Self::Transport(e)
    }
}
