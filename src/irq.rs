//! Interrupt glue for the coprocessor data-ready line.
//!
//! The application's interrupt handlers own an [`IrqRegistry`] (typically a
//! `static`) and forward edge notifications to it by handle. The registry
//! routes each notification to the [`IrqLine`] registered for that handle,
//! which a [`SpiTransport`](crate::transport::SpiTransport) can read in place
//! of the GPIO.
//!
//! ```ignore
//! static LINE: IrqLine = IrqLine::new();
//! static IRQS: IrqRegistry<'static, 2> = IrqRegistry::new();
//!
//! IRQS.register(IrqHandle(5), &LINE).unwrap();
//!
//! // in the EXTI5 handler:
//! IRQS.dispatch(IrqHandle(5), pin_level);
//! ```

use core::cell::RefCell;
use core::convert::Infallible;
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embedded_hal::digital::{ErrorType, InputPin};
use heapless::Vec;

/// Identifies one interrupt source (EXTI line, GPIO number, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IrqHandle(pub u8);

/// Registry error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IrqError {
    /// No free slot left.
    Full,
    /// The handle already has a line registered.
    Duplicate(IrqHandle),
}

impl core::fmt::Display for IrqError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Full => write!(f, "IRQ registry full"),
            Self::Duplicate(h) => write!(f, "IRQ handle {} already registered", h.0),
        }
    }
}

impl core::error::Error for IrqError {}

/// Level mirror of a data-ready line, written from interrupt context.
#[derive(Debug)]
pub struct IrqLine {
    level: AtomicBool,
}

impl IrqLine {
    pub const fn new() -> Self {
        Self {
            level: AtomicBool::new(false),
        }
    }

    pub fn set_level(&self, high: bool) {
        self.level.store(high, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.level.load(Ordering::Acquire)
    }
}

impl Default for IrqLine {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorType for &IrqLine {
    type Error = Infallible;
}

impl InputPin for &IrqLine {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(self.is_set())
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        Ok(!self.is_set())
    }
}

/// Arena of `{handle, line}` pairs shared with interrupt handlers.
pub struct IrqRegistry<'a, const N: usize> {
    entries: Mutex<CriticalSectionRawMutex, RefCell<Vec<(IrqHandle, &'a IrqLine), N>>>,
}

impl<'a, const N: usize> IrqRegistry<'a, N> {
    pub const fn new() -> Self {
        Self {
            entries: Mutex::new(RefCell::new(Vec::new())),
        }
    }

    /// Route notifications for `handle` to `line`.
    pub fn register(&self, handle: IrqHandle, line: &'a IrqLine) -> Result<(), IrqError> {
        self.entries.lock(|entries| {
            let mut entries = entries.borrow_mut();
            if entries.iter().any(|(h, _)| *h == handle) {
                return Err(IrqError::Duplicate(handle));
            }
            entries.push((handle, line)).map_err(|_| IrqError::Full)
        })
    }

    /// Stop routing `handle`. Returns whether it was registered.
    pub fn unregister(&self, handle: IrqHandle) -> bool {
        self.entries.lock(|entries| {
            let mut entries = entries.borrow_mut();
            let before = entries.len();
            entries.retain(|(h, _)| *h != handle);
            entries.len() != before
        })
    }

    /// Forward a level change. Returns `false` for an unknown handle.
    pub fn dispatch(&self, handle: IrqHandle, high: bool) -> bool {
        self.entries.lock(|entries| {
            match entries.borrow().iter().find(|(h, _)| *h == handle) {
                Some((_, line)) => {
                    line.set_level(high);
                    true
                }
                None => false,
            }
        })
    }
}

impl<const N: usize> Default for IrqRegistry<'_, N> {
    fn default() -> Self {
        Self::new()
    }
}
