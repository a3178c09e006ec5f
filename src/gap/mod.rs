//! GAP advertising data: payload encoding, scan report decoding and the
//! registry of peers seen while scanning.

mod address;
mod advertising;
mod registry;
mod report;

pub use address::BleAddress;
pub use advertising::{AdvertisingPayload, ADV_DATA_LEN};
pub use registry::{Registry, RemoteDevice, MAX_ACCUMULATED_SERVICE_DATA};
pub use report::{AdvertisingReport, ReportError, ServiceData, MAX_SERVICE_DATA};

/// AD structure type tags (Assigned Numbers, Common Data Types).
pub mod ad_type {
    pub const FLAGS: u8 = 0x01;
    pub const SHORTENED_LOCAL_NAME: u8 = 0x08;
    pub const COMPLETE_LOCAL_NAME: u8 = 0x09;
    pub const SERVICE_DATA_16: u8 = 0x16;
}

/// Longest value an AD structure can carry in a 31-byte payload.
pub const MAX_AD_VALUE: usize = ADV_DATA_LEN - 2;

/// Longest local name.
pub const MAX_NAME_LEN: usize = MAX_AD_VALUE;

/// Longest service data payload after the 16-bit UUID.
pub const MAX_SERVICE_DATA_LEN: usize = MAX_AD_VALUE - 2;

/// Flags AD value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdFlags(pub u8);

impl AdFlags {
    pub const LE_LIMITED_DISCOVERABLE: Self = Self(0x01);
    pub const LE_GENERAL_DISCOVERABLE: Self = Self(0x02);
    pub const BR_EDR_NOT_SUPPORTED: Self = Self(0x04);

    /// General discoverable, LE only.
    pub const LE_ONLY_GENERAL: Self = Self(0x06);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for AdFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}
