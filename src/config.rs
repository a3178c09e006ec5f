//! Controller interface and radio configuration.
//!
//! Both configs are plain `Copy` values built with `const` builder methods:
//!
//! ```
//! use ble_hci_spi::{HciConfig, RadioConfig};
//! use ble_hci_spi::config::ScanType;
//! use bt_hci::cmd::le::{LeSetAdvParams, LeSetScanParams};
//! use bt_hci::param::{
//!     AddrKind, AdvChannelMap, AdvFilterPolicy, AdvKind, BdAddr, Duration as Slots, LeScanKind,
//!     ScanningFilterPolicy,
//! };
//! use bt_hci::FromHciBytes;
//! use embassy_time::Duration;
//!
//! let hci = HciConfig::new().command_timeout(Duration::from_millis(500));
//! let radio = RadioConfig::new()
//!     .advertising_interval(Duration::from_millis(200), Duration::from_millis(250))
//!     .scan_type(ScanType::Passive);
//! ```

use bt_hci::cmd::le::{LeSetAdvParams, LeSetScanParams};
use bt_hci::param::{
    AddrKind, AdvChannelMap, AdvFilterPolicy, AdvKind, BdAddr, Duration as Slots, LeScanKind,
    ScanningFilterPolicy,
};
use bt_hci::FromHciBytes;
use embassy_time::Duration;

/// Controller interface timing and buffering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HciConfig {
    /// Deadline for a command to be accepted and completed.
    pub(crate) command_timeout: Duration,
    /// Buffered events and data older than this are discarded on poll.
    pub(crate) frame_expiry: Duration,
    /// Maximum bytes pulled from the transport per poll.
    pub(crate) read_chunk: usize,
}

impl HciConfig {
    pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(1000);
    pub const DEFAULT_FRAME_EXPIRY: Duration = Duration::from_millis(10_000);
    pub const MAX_READ_CHUNK: usize = 256;

    pub const fn new() -> Self {
        Self {
            command_timeout: Self::DEFAULT_COMMAND_TIMEOUT,
            frame_expiry: Self::DEFAULT_FRAME_EXPIRY,
            read_chunk: Self::MAX_READ_CHUNK,
        }
    }

    /// Set the command completion deadline (default 1000 ms).
    pub const fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Set the buffered frame expiry window (default 10 s).
    pub const fn frame_expiry(mut self, expiry: Duration) -> Self {
        self.frame_expiry = expiry;
        self
    }

    /// Set the per-poll read size, clamped to `1..=MAX_READ_CHUNK`.
    pub const fn read_chunk(mut self, bytes: usize) -> Self {
        self.read_chunk = if bytes == 0 {
            1
        } else if bytes > Self::MAX_READ_CHUNK {
            Self::MAX_READ_CHUNK
        } else {
            bytes
        };
        self
    }
}

impl Default for HciConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Advertising PDU type.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdvertisingType {
    ConnectableUndirected = 0x00,
    ScannableUndirected = 0x02,
    NonConnectableUndirected = 0x03,
}

impl From<AdvertisingType> for AdvKind {
    fn from(ty: AdvertisingType) -> Self {
        match ty {
            AdvertisingType::ConnectableUndirected => AdvKind::AdvInd,
            AdvertisingType::ScannableUndirected => AdvKind::AdvScanInd,
            AdvertisingType::NonConnectableUndirected => AdvKind::AdvNonconnInd,
        }
    }
}

/// Address the controller uses for its own PDUs.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OwnAddressType {
    Public = 0x00,
    Random = 0x01,
}

impl From<OwnAddressType> for AddrKind {
    fn from(ty: OwnAddressType) -> Self {
        match ty {
            OwnAddressType::Public => AddrKind::PUBLIC,
            OwnAddressType::Random => AddrKind::RANDOM,
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScanType {
    /// Listen only.
    Passive = 0x00,
    /// Send scan requests to collect scan responses.
    Active = 0x01,
}

impl From<ScanType> for LeScanKind {
    fn from(ty: ScanType) -> Self {
        match ty {
            ScanType::Passive => LeScanKind::Passive,
            ScanType::Active => LeScanKind::Active,
        }
    }
}

/// Advertising channel mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelMap(u8);

impl ChannelMap {
    pub const CH37: Self = Self(0x01);
    pub const CH38: Self = Self(0x02);
    pub const CH39: Self = Self(0x04);
    pub const ALL: Self = Self(0x07);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl From<ChannelMap> for AdvChannelMap {
    fn from(map: ChannelMap) -> Self {
        // Any 3-bit mask is a valid channel map.
        AdvChannelMap::from_hci_bytes(&[map.bits()]).map_or(AdvChannelMap::ALL, |(m, _)| m)
    }
}

impl core::ops::BitOr for ChannelMap {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// Advertising and scanning parameters pushed by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RadioConfig {
    pub(crate) advertising_interval: (Duration, Duration),
    pub(crate) advertising_type: AdvertisingType,
    pub(crate) own_address_type: OwnAddressType,
    pub(crate) channel_map: ChannelMap,
    pub(crate) scan_type: ScanType,
    pub(crate) scan_interval: Duration,
    pub(crate) scan_window: Duration,
    pub(crate) filter_duplicates: bool,
}

impl RadioConfig {
    pub const fn new() -> Self {
        Self {
            advertising_interval: (Duration::from_millis(100), Duration::from_millis(100)),
            advertising_type: AdvertisingType::ScannableUndirected,
            own_address_type: OwnAddressType::Public,
            channel_map: ChannelMap::ALL,
            scan_type: ScanType::Active,
            scan_interval: Duration::from_millis(10),
            scan_window: Duration::from_millis(10),
            filter_duplicates: false,
        }
    }

    /// Set the advertising interval range (default 100 ms).
    pub const fn advertising_interval(mut self, min: Duration, max: Duration) -> Self {
        self.advertising_interval = (min, max);
        self
    }

    pub const fn advertising_type(mut self, ty: AdvertisingType) -> Self {
        self.advertising_type = ty;
        self
    }

    pub const fn own_address_type(mut self, ty: OwnAddressType) -> Self {
        self.own_address_type = ty;
        self
    }

    /// Set the advertising channels (default all three).
    pub const fn channel_map(mut self, map: ChannelMap) -> Self {
        self.channel_map = map;
        self
    }

    pub const fn scan_type(mut self, ty: ScanType) -> Self {
        self.scan_type = ty;
        self
    }

    /// Set scan interval and window (default 10 ms / 10 ms).
    ///
    /// The window is clamped to the interval when pushed to the controller.
    pub const fn scan_timing(mut self, interval: Duration, window: Duration) -> Self {
        self.scan_interval = interval;
        self.scan_window = window;
        self
    }

    /// Ask the controller to drop repeated reports (default off, so RSSI
    /// keeps updating).
    pub const fn filter_duplicates(mut self, enable: bool) -> Self {
        self.filter_duplicates = enable;
        self
    }

    /// LE Set Advertising Parameters for this configuration. Intervals are
    /// clamped to the valid range and `max` is raised to at least `min`.
    pub(crate) fn advertising_parameters(&self) -> LeSetAdvParams {
        let (min, max) = self.advertising_interval;
        let min = to_slots(min, ADV_INTERVAL_SLOTS);
        let max = to_slots(max, ADV_INTERVAL_SLOTS).max(min);

        // Peer address is unused for undirected advertising.
        LeSetAdvParams::new(
            Slots::from_u16(min),
            Slots::from_u16(max),
            self.advertising_type.into(),
            self.own_address_type.into(),
            AddrKind::PUBLIC,
            BdAddr::new([0; 6]),
            self.channel_map.into(),
            AdvFilterPolicy::default(),
        )
    }

    /// LE Set Scan Parameters for this configuration. The window never
    /// exceeds the interval.
    pub(crate) fn scan_parameters(&self) -> LeSetScanParams {
        let interval = to_slots(self.scan_interval, SCAN_INTERVAL_SLOTS);
        let window = to_slots(self.scan_window, SCAN_INTERVAL_SLOTS).min(interval);

        LeSetScanParams::new(
            self.scan_type.into(),
            Slots::from_u16(interval),
            Slots::from_u16(window),
            self.own_address_type.into(),
            ScanningFilterPolicy::BasicUnfiltered,
        )
    }
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Valid advertising interval, in 0.625 ms slots.
const ADV_INTERVAL_SLOTS: (u16, u16) = (0x0020, 0x4000);
/// Valid scan interval and window, in 0.625 ms slots.
const SCAN_INTERVAL_SLOTS: (u16, u16) = (0x0004, 0x4000);

fn to_slots(d: Duration, (lo, hi): (u16, u16)) -> u16 {
    // T = N * 0.625 ms, so N = T / 625 us
    let slots = d.as_micros() / 625;
    slots.clamp(lo as u64, hi as u64) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn default_config_matches_contract() {
        let cfg = HciConfig::default();
        assert_eq!(cfg.command_timeout, Duration::from_millis(1000));
        assert_eq!(cfg.frame_expiry, Duration::from_millis(10_000));
        assert_eq!(cfg.read_chunk, HciConfig::MAX_READ_CHUNK);
    }

    #[test]
    fn read_chunk_is_clamped() {
        assert_eq!(HciConfig::new().read_chunk(0).read_chunk, 1);
        assert_eq!(HciConfig::new().read_chunk(10_000).read_chunk, HciConfig::MAX_READ_CHUNK);
        assert_eq!(HciConfig::new().read_chunk(32).read_chunk, 32);
    }

    #[test]
    fn advertising_parameters_layout() {
        let cfg = RadioConfig::new()
            .advertising_interval(Duration::from_millis(100), Duration::from_millis(200))
            .channel_map(ChannelMap::CH37 | ChannelMap::CH39);
        let args = testing::command_params(&cfg.advertising_parameters());

        assert_eq!(args.len(), 15);
        assert_eq!(&args[0..2], &160u16.to_le_bytes());
        assert_eq!(&args[2..4], &320u16.to_le_bytes());
        assert_eq!(args[4], AdvertisingType::ScannableUndirected as u8);
        assert_eq!(args[5], OwnAddressType::Public as u8);
        // Peer address type and address stay zero.
        assert_eq!(&args[6..13], &[0; 7]);
        assert_eq!(args[13], 0x05);
        assert_eq!(args[14], 0x00);
    }

    #[test]
    fn scan_parameters_layout() {
        let cfg = RadioConfig::new()
            .scan_type(ScanType::Passive)
            .own_address_type(OwnAddressType::Random)
            .scan_timing(Duration::from_millis(100), Duration::from_millis(50));
        let args = testing::command_params(&cfg.scan_parameters());

        assert_eq!(
            args,
            [
                ScanType::Passive as u8,
                0xA0,
                0x00,
                0x50,
                0x00,
                OwnAddressType::Random as u8,
                0x00
            ]
        );
    }

    #[test]
    fn intervals_clamp_to_valid_range() {
        let cfg = RadioConfig::new()
            .advertising_interval(Duration::from_millis(1), Duration::from_secs(60))
            .scan_timing(Duration::from_millis(20), Duration::from_millis(40));

        let adv = testing::command_params(&cfg.advertising_parameters());
        assert_eq!(u16::from_le_bytes([adv[0], adv[1]]), 0x0020);
        assert_eq!(u16::from_le_bytes([adv[2], adv[3]]), 0x4000);

        let scan = testing::command_params(&cfg.scan_parameters());
        assert_eq!(scan[0], ScanType::Active as u8);
        assert_eq!(u16::from_le_bytes([scan[1], scan[2]]), 32);
        // window never exceeds interval
        assert_eq!(u16::from_le_bytes([scan[3], scan[4]]), 32);
    }

    #[test]
    fn channel_map_mask() {
        let map = ChannelMap::CH37 | ChannelMap::CH38;
        assert!(map.contains(ChannelMap::CH38));
        assert!(!map.contains(ChannelMap::CH39));
        assert!(ChannelMap::ALL.contains(map));
    }
}
