//! LE advertising report decoding.
//!
//! Input is the parameter block of an LE meta event with subevent
//! `0x02`:
//!
//! | Offset | Field |
//! |--------|-------|
//! | 0 | subevent (`0x02`) |
//! | 1 | number of reports (must be 1) |
//! | 2 | event type |
//! | 3 | address type |
//! | 4..10 | address, little-endian |
//! | 10 | AD data length `n` |
//! | 11..11+n | AD structures |
//! | 11+n | RSSI |
//!
//! The report body is read through `bt-hci`'s [`LeAdvReports`] and
//! [`LeAdvReport`]; lengths are checked up front so truncation is reported
//! with the sizes involved.

use bt_hci::param::{LeAdvReport, LeAdvReports, RemainingBytes};
use bt_hci::FromHciBytes;
use heapless::{String, Vec};

use super::{ad_type, AdFlags, BleAddress, MAX_NAME_LEN, MAX_SERVICE_DATA_LEN};
use crate::hci::frame::subevent;

/// Service data elements kept per report.
pub const MAX_SERVICE_DATA: usize = 8;

const REPORTS_AT: usize = 2;
const DATA_LEN_AT: usize = 10;
const DATA_AT: usize = 11;

/// Stand-in for name bytes outside printable ASCII.
const PLACEHOLDER: char = '?';

/// Report decoding error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReportError {
    /// Shorter than its header or its declared AD data length.
    Truncated { needed: usize, actual: usize },
    /// Not an advertising report subevent.
    NotAdvertisingReport(u8),
    /// Only single-report events are decoded.
    UnsupportedReportCount(u8),
    /// A report field holds a value HCI does not define.
    Malformed,
}

impl core::fmt::Display for ReportError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Truncated { needed, actual } => {
                write!(f, "report truncated: need {} bytes, have {}", needed, actual)
            }
            Self::NotAdvertisingReport(code) => write!(f, "not an advertising report: 0x{:02X}", code),
            Self::UnsupportedReportCount(n) => write!(f, "unsupported report count {}", n),
            Self::Malformed => write!(f, "malformed report"),
        }
    }
}

impl core::error::Error for ReportError {}

/// One 16-bit UUID service data element.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServiceData {
    pub uuid: u16,
    pub data: Vec<u8, MAX_SERVICE_DATA_LEN>,
}

impl ServiceData {
    /// `None` if `data` is longer than fits in an advertising payload.
    pub fn new(uuid: u16, data: &[u8]) -> Option<Self> {
        Some(Self {
            uuid,
            data: Vec::from_slice(data).ok()?,
        })
    }
}

/// A decoded advertising report.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdvertisingReport {
    pub event_type: u8,
    pub address_type: u8,
    pub address: BleAddress,
    pub rssi: i8,
    pub flags: Option<AdFlags>,
    /// Local name, empty if none was advertised.
    pub name: String<MAX_NAME_LEN>,
    pub service_data: Vec<ServiceData, MAX_SERVICE_DATA>,
}

impl AdvertisingReport {
    /// Decode a raw advertising report.
    ///
    /// AD structures are consumed as `(length, type, value)` until the
    /// declared data length is used up. Unknown types are skipped by their
    /// length; a zero length ends the block, as does a structure that runs
    /// past it.
    pub fn parse(raw: &[u8]) -> Result<Self, ReportError> {
        if raw.len() <= DATA_LEN_AT {
            return Err(ReportError::Truncated {
                needed: DATA_AT,
                actual: raw.len(),
            });
        }
        if raw[0] != subevent::ADVERTISING_REPORT {
            return Err(ReportError::NotAdvertisingReport(raw[0]));
        }

        let (bytes, _) =
            RemainingBytes::from_hci_bytes(&raw[REPORTS_AT..]).map_err(|_| ReportError::Malformed)?;
        let reports = LeAdvReports {
            num_reports: raw[1],
            bytes,
        };
        if reports.num_reports != 1 {
            return Err(ReportError::UnsupportedReportCount(reports.num_reports));
        }

        let rssi_at = DATA_AT + raw[DATA_LEN_AT] as usize;
        if raw.len() <= rssi_at {
            return Err(ReportError::Truncated {
                needed: rssi_at + 1,
                actual: raw.len(),
            });
        }

        let (adv, _) =
            LeAdvReport::from_hci_bytes(&reports.bytes).map_err(|_| ReportError::Malformed)?;
        let mut report = Self {
            event_type: reports.bytes[0],
            address_type: reports.bytes[1],
            address: BleAddress::from(adv.addr),
            rssi: adv.rssi,
            flags: None,
            name: String::new(),
            service_data: Vec::new(),
        };
        report.read_ad_structures(adv.data);
        Ok(report)
    }

    fn read_ad_structures(&mut self, mut ad: &[u8]) {
        while let Some((&len, rest)) = ad.split_first() {
            let len = len as usize;
            if len == 0 {
                break;
            }
            if len > rest.len() {
                debug!("[gap] AD structure overruns report ({} > {})", len, rest.len());
                break;
            }
            let (ty, value) = (rest[0], &rest[1..len]);
            ad = &rest[len..];

            match ty {
                ad_type::FLAGS => {
                    if let Some(&bits) = value.first() {
                        self.flags = Some(AdFlags(bits));
                    }
                }
                ad_type::COMPLETE_LOCAL_NAME | ad_type::SHORTENED_LOCAL_NAME => {
                    self.name = printable(value);
                }
                ad_type::SERVICE_DATA_16 => {
                    let Some(element) = service_data(value) else {
                        debug!("[gap] malformed service data ({} bytes)", value.len());
                        continue;
                    };
                    if self.service_data.push(element).is_err() {
                        debug!("[gap] service data list full");
                    }
                }
                _ => {
                    trace!("[gap] skipping AD type 0x{:02X}", ty);
                }
            }
        }
    }
}

fn printable(value: &[u8]) -> String<MAX_NAME_LEN> {
    let mut name = String::new();
    for &b in value {
        let c = if b.is_ascii_graphic() || b == b' ' {
            b as char
        } else {
            PLACEHOLDER
        };
        if name.push(c).is_err() {
            break;
        }
    }
    name
}

fn service_data(value: &[u8]) -> Option<ServiceData> {
    match value {
        [lo, hi, data @ ..] => ServiceData::new(u16::from_le_bytes([*lo, *hi]), data),
        _ => None,
    }
}
