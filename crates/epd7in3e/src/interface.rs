//! Hardware interface abstraction
//!
//! This module provides the [`DisplayInterface`] trait and the [`Interface`] struct
//! that frames controller transactions on top of a [`Backend`].
//!
//! ## Hardware Requirements
//!
//! The panel controller requires:
//! - A serial bus (MOSI + SCLK), hardware or bit-banged
//! - 5 GPIO pins:
//!   - **RST**: Reset (output, active low)
//!   - **DC**: Data/Command select (output, low = command)
//!   - **CS**: Chip select (output, active low, driven here rather than by the kernel)
//!   - **BUSY**: Busy status (input, **low = busy**)
//!   - **PWR**: Panel power switch (output, high = on)
//!
//! ## Example
//!
//! ```
//! use epd7in3e::backend::mock::RecordingBackend;
//! use epd7in3e::{DisplayInterface, Interface, Timing};
//!
//! let backend = RecordingBackend::new();
//! let probe = backend.clone();
//! let mut delay = backend.delay();
//!
//! let mut interface = Interface::new(backend, Timing::RASPBERRY_PI);
//! interface.acquire()?;
//! interface.command_with_data(0x07, &[0xA5])?;
//! interface.busy_wait(&mut delay)?;
//! interface.release();
//!
//! assert!(probe.is_released());
//! # Ok::<(), epd7in3e::Error>(())
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use embedded_hal::delay::DelayNs;

use crate::backend::{Backend, BackendError, Direction, Level, MAX_TRANSFER_LEN};
use crate::config::{PinRole, Timing};
use crate::error::Error;

/// Trait for the hardware interface to the panel controller
///
/// This trait abstracts over the transaction framing so the
/// [`Display`](crate::display::Display) protocol logic is written once,
/// whatever backend sits underneath.
///
/// ## Implementing
///
/// For most cases, use the provided [`Interface`] struct.
pub trait DisplayInterface {
    /// Claim every pin the backend needs, then open the bus
    ///
    /// On failure everything claimed so far is released again.
    fn acquire(&mut self) -> Result<(), Error>;

    /// Park the lines and give every resource back
    ///
    /// Never fails. Safe to call when nothing is claimed.
    fn release(&mut self);

    /// Send a command byte on its own
    ///
    /// The implementation must:
    /// 1. Assert CS
    /// 2. Set DC low (command mode) and send the byte
    /// 3. Deassert CS, even if the transfer failed
    fn send_command(&mut self, command: u8) -> Result<(), Error>;

    /// Send data bytes in their own transaction (DC high)
    fn send_data(&mut self, data: &[u8]) -> Result<(), Error>;

    /// Send a command and its parameters with CS held for both
    fn command_with_data(&mut self, command: u8, data: &[u8]) -> Result<(), Error>;

    /// Switch panel power on and wait for the supply to settle
    fn power_on<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error>;

    /// Perform hardware reset
    ///
    /// RST is driven high, pulsed low, then held high again, each phase
    /// lasting the platform's [`Timing`] value. The controller only leaves
    /// reset cleanly on a falling then rising edge of adequate width.
    fn reset<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error>;

    /// Wait for the busy line to report idle (high)
    ///
    /// # Errors
    ///
    /// Returns [`Error::BusyTimeout`] once [`Timing::busy_timeout_ms`] has
    /// been spent polling, and [`Error::Aborted`] if an abort was requested.
    fn busy_wait<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error>;

    /// Controller timing in use
    fn timing(&self) -> &Timing;
}

/// Hardware interface implementation over a [`Backend`]
///
/// Chip-select is driven from here so that a command and its parameters can
/// share a single assertion. Payloads longer than [`MAX_TRANSFER_LEN`] are
/// split into several transfers inside that assertion.
pub struct Interface<B> {
    backend: B,
    timing: Timing,
    abort: Arc<AtomicBool>,
    claimed: bool,
}

impl<B: Backend> Interface<B> {
    /// Create a new Interface; nothing is claimed until [`acquire`](DisplayInterface::acquire)
    pub fn new(backend: B, timing: Timing) -> Self {
        Self::with_abort_flag(backend, timing, Arc::new(AtomicBool::new(false)))
    }

    /// Create an Interface whose busy waits stop once `abort` is set
    pub fn with_abort_flag(backend: B, timing: Timing, abort: Arc<AtomicBool>) -> Self {
        Self {
            backend,
            timing,
            abort,
            claimed: false,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Whether [`acquire`](DisplayInterface::acquire) succeeded and no release followed
    pub fn is_claimed(&self) -> bool {
        self.claimed
    }

    fn claim_all(&mut self) -> Result<(), BackendError> {
        for &role in self.backend.roles() {
            self.backend.configure_pin(role, Direction::for_role(role))?;
        }
        self.backend.open_bus()
    }

    /// Run `body` with CS asserted; CS is deasserted whatever `body` returns
    fn framed<F>(&mut self, body: F) -> Result<(), Error>
    where
        F: FnOnce(&mut B) -> Result<(), BackendError>,
    {
        self.backend.write_pin(PinRole::ChipSelect, Level::Low)?;
        let result = body(&mut self.backend);
        let deselect = self.backend.write_pin(PinRole::ChipSelect, Level::High);
        result?;
        deselect?;
        Ok(())
    }

    fn park(&mut self, role: PinRole) {
        if let Err(e) = self.backend.write_pin(role, Level::Low) {
            log::warn!("Could not park {role:?}: {e}");
        }
    }
}

fn write_chunked<B: Backend>(backend: &mut B, data: &[u8]) -> Result<(), BackendError> {
    for chunk in data.chunks(MAX_TRANSFER_LEN) {
        backend.transfer(chunk)?;
    }
    Ok(())
}

impl<B: Backend> DisplayInterface for Interface<B> {
    fn acquire(&mut self) -> Result<(), Error> {
        if self.claimed {
            return Ok(());
        }
        if let Err(e) = self.claim_all() {
            log::error!("Resource acquisition failed: {e}");
            self.backend.release();
            return Err(e.into());
        }
        self.claimed = true;
        log::info!("Claimed {} pins and the serial bus", self.backend.roles().len());
        Ok(())
    }

    fn release(&mut self) {
        if !self.claimed {
            return;
        }
        // Same resting levels as a power-on default, panel unpowered
        for role in [
            PinRole::ChipSelect,
            PinRole::Power,
            PinRole::DataCommand,
            PinRole::Reset,
        ] {
            self.park(role);
        }
        self.backend.release();
        self.claimed = false;
        log::info!("Released panel resources");
    }

    fn send_command(&mut self, command: u8) -> Result<(), Error> {
        log::debug!("Command 0x{command:02X}");
        self.framed(|backend| {
            backend.write_pin(PinRole::DataCommand, Level::Low)?;
            backend.transfer(&[command])
        })
    }

    fn send_data(&mut self, data: &[u8]) -> Result<(), Error> {
        self.framed(|backend| {
            backend.write_pin(PinRole::DataCommand, Level::High)?;
            write_chunked(backend, data)
        })
    }

    fn command_with_data(&mut self, command: u8, data: &[u8]) -> Result<(), Error> {
        if data.len() <= 8 {
            log::debug!("Command 0x{command:02X} {data:02X?}");
        } else {
            log::debug!("Command 0x{command:02X} with {} data bytes", data.len());
        }
        self.framed(|backend| {
            backend.write_pin(PinRole::DataCommand, Level::Low)?;
            backend.transfer(&[command])?;
            if data.is_empty() {
                return Ok(());
            }
            backend.write_pin(PinRole::DataCommand, Level::High)?;
            write_chunked(backend, data)
        })
    }

    fn power_on<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error> {
        self.backend.write_pin(PinRole::Power, Level::High)?;
        delay.delay_ms(self.timing.power_settle_ms);
        Ok(())
    }

    fn reset<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error> {
        self.backend.write_pin(PinRole::Reset, Level::High)?;
        delay.delay_ms(self.timing.reset_high_ms);
        self.backend.write_pin(PinRole::Reset, Level::Low)?;
        delay.delay_ms(self.timing.reset_pulse_ms);
        self.backend.write_pin(PinRole::Reset, Level::High)?;
        delay.delay_ms(self.timing.reset_settle_ms);
        Ok(())
    }

    fn busy_wait<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error> {
        let mut waited_ms = 0u32;
        let poll_ms = self.timing.busy_poll_ms.max(1);

        loop {
            if self.abort.load(Ordering::Acquire) {
                log::warn!("Busy wait aborted after {waited_ms} ms");
                return Err(Error::Aborted);
            }
            if self.backend.read_pin(PinRole::Busy)? == Level::High {
                log::debug!("Panel idle after {waited_ms} ms");
                return Ok(());
            }
            if waited_ms >= self.timing.busy_timeout_ms {
                log::error!("Panel still busy after {waited_ms} ms");
                return Err(Error::BusyTimeout { waited_ms });
            }
            delay.delay_ms(poll_ms);
            waited_ms = waited_ms.saturating_add(poll_ms);
        }
    }

    fn timing(&self) -> &Timing {
        &self.timing
    }
}
