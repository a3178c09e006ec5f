//! Coordinator error types.

use crate::hci::HciError;

/// HCI call site inside a coordinator operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Step {
    AdvertisingDisable,
    AdvertisingParameters,
    TxPowerRead,
    AdvertisingData,
    ScanResponseData,
    AdvertisingEnable,
    ScanDisable,
    ScanParameters,
    ScanEnable,
    Reset,
    ReadBdAddr,
    /// Draining incoming frames.
    Poll,
}

impl Step {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AdvertisingDisable => "advertising disable",
            Self::AdvertisingParameters => "advertising parameters",
            Self::TxPowerRead => "TX power read",
            Self::AdvertisingData => "advertising data",
            Self::ScanResponseData => "scan response data",
            Self::AdvertisingEnable => "advertising enable",
            Self::ScanDisable => "scan disable",
            Self::ScanParameters => "scan parameters",
            Self::ScanEnable => "scan enable",
            Self::Reset => "reset",
            Self::ReadBdAddr => "read BD_ADDR",
            Self::Poll => "poll",
        }
    }
}

impl core::fmt::Display for Step {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by [`Device`](super::Device) operations.
///
/// A failed command is reported with the step it belongs to. Commands issued
/// earlier in the same operation are not rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// Advertising is already enabled (running or on standby).
    AlreadyAdvertising,
    /// Scanning is already enabled (running or on standby).
    AlreadyScanning,
    /// An HCI command failed.
    Command(Step, HciError<E>),
}

impl<E> Error<E> {
    /// The step that failed, if a command failed.
    pub fn step(&self) -> Option<Step> {
        match self {
            Self::Command(step, _) => Some(*step),
            _ => None,
        }
    }
}

impl<E: core::fmt::Debug> core::fmt::Display for Error<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::AlreadyAdvertising => write!(f, "already advertising"),
            Self::AlreadyScanning => write!(f, "already scanning"),
            Self::Command(step, e) => write!(f, "{} rejected: {}", step, e),
        }
    }
}

impl<E: core::fmt::Debug> core::error::Error for Error<E> {}
