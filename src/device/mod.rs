//! Advertising and scanning coordinator.
//!
//! The coprocessor has one radio. [`Device`] tracks advertising and scanning
//! separately as [`Mode`]s and keeps at most one of them [`Mode::Running`];
//! the other, if enabled, waits on [`Mode::Standby`] until
//! [`Device::swap_mode`] hands the radio over or the running one is stopped.

mod error;

pub use error::{Error, Step};

use bt_hci::cmd::controller_baseband::Reset;
use bt_hci::cmd::info::ReadBdAddr;
use bt_hci::cmd::le::{
    LeReadAdvPhysicalChannelTxPower, LeSetAdvData, LeSetAdvEnable, LeSetScanEnable,
    LeSetScanResponseData,
};
use bt_hci::cmd::Cmd;
use bt_hci::param::BdAddr;
use bt_hci::FromHciBytes;

use crate::config::{HciConfig, RadioConfig};
use crate::gap::{AdvertisingPayload, AdvertisingReport, BleAddress, Registry, RemoteDevice};
use crate::hci::{CommandResponse, EventFrame, Hci, HciError, Opcode};
use crate::transport::Transport;

/// TX power value the controller returns when it cannot report one.
const TX_POWER_UNAVAILABLE: i8 = 127;

/// Enablement of one radio function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    #[default]
    Disabled,
    /// Configured, waiting for the radio.
    Standby,
    /// Configured and on air.
    Running,
}

impl Mode {
    pub fn is_enabled(self) -> bool {
        self != Self::Disabled
    }
}

//=============================================================================
// Device
//=============================================================================

/// BLE coprocessor driven through HCI, with a registry of up to `N` peers
/// seen while scanning.
///
/// # Example
///
/// ```ignore
/// use ble_hci_spi::{AdFlags, AdvertisingPayload, Device, HciConfig, RadioConfig};
/// use ble_hci_spi::transport::SpiTransport;
///
/// let transport = SpiTransport::new(spi, cs, irq, delay)?;
/// let mut device: Device<_> = Device::new(transport, HciConfig::default(), RadioConfig::default());
///
/// let adv = AdvertisingPayload::encode(Some(AdFlags::LE_ONLY_GENERAL), "node-7", None);
/// device.start_advertising(&adv, &AdvertisingPayload::empty())?;
/// device.start_scanning()?;
///
/// loop {
///     device.poll()?;
///     for peer in device.drain_devices() {
///         // ...
///     }
/// }
/// ```
pub struct Device<T, const N: usize = 16> {
    hci: Hci<T>,
    radio: RadioConfig,
    advertising: Mode,
    scanning: Mode,
    registry: Registry<N>,
}

impl<T: Transport, const N: usize> Device<T, N> {
    pub fn new(transport: T, hci: HciConfig, radio: RadioConfig) -> Self {
        Self {
            hci: Hci::new(transport, hci),
            radio,
            advertising: Mode::Disabled,
            scanning: Mode::Disabled,
            registry: Registry::new(),
        }
    }

    /// Reset the controller. Both modes return to [`Mode::Disabled`].
    pub fn reset(&mut self) -> Result<(), Error<T::Error>> {
        self.exec(Step::Reset, &Reset::new())?;
        self.advertising = Mode::Disabled;
        self.scanning = Mode::Disabled;
        info!("[device] controller reset");
        Ok(())
    }

    /// Read the controller's public address.
    pub fn read_bd_addr(&mut self) -> Result<BleAddress, Error<T::Error>> {
        let response = self.exec(Step::ReadBdAddr, &ReadBdAddr::new())?;
        let Ok((addr, _)) = BdAddr::from_hci_bytes(response.return_params()) else {
            return Err(invalid::<ReadBdAddr, _>(Step::ReadBdAddr));
        };
        let addr = BleAddress::from(addr);
        debug!("[device] BD_ADDR {}", addr);
        Ok(addr)
    }

    /// Configure and start advertising.
    ///
    /// Advertising is switched off, parameters are set, the TX power is read
    /// back as a liveness check, and both payloads are loaded. If scanning
    /// holds the radio, advertising is left on [`Mode::Standby`]; otherwise
    /// it goes on air.
    pub fn start_advertising(
        &mut self,
        data: &AdvertisingPayload,
        scan_response: &AdvertisingPayload,
    ) -> Result<(), Error<T::Error>> {
        if self.advertising.is_enabled() {
            return Err(Error::AlreadyAdvertising);
        }

        self.set_advertise_enable(false)?;
        let params = self.radio.advertising_parameters();
        self.exec(Step::AdvertisingParameters, &params)?;
        self.read_tx_power()?;

        let len = data.len() as u8;
        self.exec(Step::AdvertisingData, &LeSetAdvData::new(len, *data.raw()))?;
        let len = scan_response.len() as u8;
        self.exec(
            Step::ScanResponseData,
            &LeSetScanResponseData::new(len, *scan_response.raw()),
        )?;

        if self.scanning == Mode::Running {
            self.advertising = Mode::Standby;
            info!("[device] advertising on standby");
        } else {
            self.set_advertise_enable(true)?;
            self.advertising = Mode::Running;
            info!("[device] advertising");
        }
        Ok(())
    }

    /// Configure and start scanning.
    ///
    /// Scanning takes the radio: running advertising is switched off and
    /// moved to [`Mode::Standby`].
    pub fn start_scanning(&mut self) -> Result<(), Error<T::Error>> {
        if self.scanning.is_enabled() {
            return Err(Error::AlreadyScanning);
        }

        self.set_scan_enable(false)?;
        let params = self.radio.scan_parameters();
        self.exec(Step::ScanParameters, &params)?;

        if self.advertising == Mode::Running {
            self.set_advertise_enable(false)?;
            self.advertising = Mode::Standby;
            info!("[device] advertising on standby");
        }
        self.set_scan_enable(true)?;
        self.scanning = Mode::Running;
        info!("[device] scanning");
        Ok(())
    }

    /// Stop advertising. Succeeds without touching the controller if it is
    /// already disabled.
    ///
    /// If advertising held the radio and scanning is on standby, scanning
    /// goes on air.
    pub fn stop_advertising(&mut self) -> Result<(), Error<T::Error>> {
        if !self.advertising.is_enabled() {
            return Ok(());
        }
        let held_radio = self.advertising == Mode::Running;
        self.set_advertise_enable(false)?;
        self.advertising = Mode::Disabled;
        info!("[device] advertising stopped");

        if held_radio && self.scanning == Mode::Standby {
            self.set_scan_enable(true)?;
            self.scanning = Mode::Running;
            info!("[device] scanning resumed");
        }
        Ok(())
    }

    /// Stop scanning. Succeeds without touching the controller if it is
    /// already disabled.
    ///
    /// If scanning held the radio and advertising is on standby, advertising
    /// goes on air.
    pub fn stop_scanning(&mut self) -> Result<(), Error<T::Error>> {
        if !self.scanning.is_enabled() {
            return Ok(());
        }
        let held_radio = self.scanning == Mode::Running;
        self.set_scan_enable(false)?;
        self.scanning = Mode::Disabled;
        info!("[device] scanning stopped");

        if held_radio && self.advertising == Mode::Standby {
            self.set_advertise_enable(true)?;
            self.advertising = Mode::Running;
            info!("[device] advertising resumed");
        }
        Ok(())
    }

    /// Hand the radio from whichever function is running to the one on
    /// standby. Does nothing unless one is running and the other waiting.
    pub fn swap_mode(&mut self) -> Result<(), Error<T::Error>> {
        match (self.advertising, self.scanning) {
            (Mode::Running, Mode::Standby) => {
                self.set_advertise_enable(false)?;
                self.advertising = Mode::Standby;
                self.set_scan_enable(true)?;
                self.scanning = Mode::Running;
                debug!("[device] swapped to scanning");
            }
            (Mode::Standby, Mode::Running) => {
                self.set_scan_enable(false)?;
                self.scanning = Mode::Standby;
                self.set_advertise_enable(true)?;
                self.advertising = Mode::Running;
                debug!("[device] swapped to advertising");
            }
            _ => {}
        }
        Ok(())
    }

    /// Drain the controller and merge every advertising report into the
    /// registry. Returns the number of reports merged.
    ///
    /// Malformed reports are dropped.
    pub fn poll(&mut self) -> Result<usize, Error<T::Error>> {
        self.hci.poll().map_err(|e| failed(Step::Poll, e))?;

        let mut merged = 0;
        while let Some(event) = self.hci.take_event(EventFrame::is_advertising_report) {
            match AdvertisingReport::parse(&event.params) {
                Ok(report) => {
                    if self.registry.merge(&report) {
                        merged += 1;
                    }
                }
                Err(e) => {
                    debug!("[device] dropping report: {}", e);
                }
            }
        }
        Ok(merged)
    }

    pub fn advertising(&self) -> Mode {
        self.advertising
    }

    pub fn scanning(&self) -> Mode {
        self.scanning
    }

    pub fn radio_config(&self) -> &RadioConfig {
        &self.radio
    }

    /// Replace the radio configuration. Takes effect on the next start.
    pub fn set_radio_config(&mut self, radio: RadioConfig) {
        self.radio = radio;
    }

    /// Peers seen so far, in first-seen order.
    pub fn devices(&self) -> &[RemoteDevice] {
        self.registry.devices()
    }

    /// Remove and yield every known peer.
    pub fn drain_devices(&mut self) -> impl Iterator<Item = RemoteDevice> + '_ {
        self.registry.drain()
    }

    /// Remove and return the peers last seen advertising `name`.
    pub fn drain_devices_named(&mut self, name: &str) -> heapless::Vec<RemoteDevice, N> {
        self.registry.drain_named(name)
    }

    pub fn registry(&self) -> &Registry<N> {
        &self.registry
    }

    pub fn hci(&self) -> &Hci<T> {
        &self.hci
    }

    /// Raw controller access. Commands issued here bypass the mode
    /// bookkeeping.
    pub fn hci_mut(&mut self) -> &mut Hci<T> {
        &mut self.hci
    }

    /// Give back the transport.
    pub fn release(self) -> T {
        self.hci.release()
    }

    fn exec<C: Cmd>(&mut self, step: Step, cmd: &C) -> Result<CommandResponse, Error<T::Error>> {
        self.hci.exec(cmd).map_err(|e| failed(step, e))
    }

    fn set_advertise_enable(&mut self, enable: bool) -> Result<(), Error<T::Error>> {
        let step = if enable {
            Step::AdvertisingEnable
        } else {
            Step::AdvertisingDisable
        };
        self.exec(step, &LeSetAdvEnable::new(enable))?;
        Ok(())
    }

    fn set_scan_enable(&mut self, enable: bool) -> Result<(), Error<T::Error>> {
        let step = if enable {
            Step::ScanEnable
        } else {
            Step::ScanDisable
        };
        let cmd = LeSetScanEnable::new(enable, self.radio.filter_duplicates);
        self.exec(step, &cmd)?;
        Ok(())
    }

    fn read_tx_power(&mut self) -> Result<i8, Error<T::Error>> {
        let cmd = LeReadAdvPhysicalChannelTxPower::new();
        let response = self.exec(Step::TxPowerRead, &cmd)?;
        match i8::from_hci_bytes(response.return_params()) {
            Ok((level, _)) if level != TX_POWER_UNAVAILABLE => {
                debug!("[device] advertising TX power {} dBm", level);
                Ok(level)
            }
            _ => Err(invalid::<LeReadAdvPhysicalChannelTxPower, _>(Step::TxPowerRead)),
        }
    }
}

fn failed<E>(step: Step, e: HciError<E>) -> Error<E> {
    warn!("[device] {} failed (timeout: {})", step, e.is_timeout());
    Error::Command(step, e)
}

fn invalid<C: Cmd, E>(step: Step) -> Error<E> {
    failed(step, HciError::InvalidResponse { opcode: Opcode::of::<C>() })
}
