//! Low-level pin and bus backends
//!
//! A [`Backend`] owns the physical resources the panel needs: one GPIO line
//! per [`PinRole`] and a serial bus. The panel driver only ever talks to this
//! trait, so the three Linux variants are interchangeable:
//!
//! | Variant | Pins | Serial |
//! |---|---|---|
//! | [`CdevBackend`] | `/dev/gpiochipN` line requests | spidev |
//! | [`SysfsBackend`] | `/sys/class/gpio` | spidev |
//! | [`BitBangBackend`] | `/sys/class/gpio` | [`BitBangBus`] on two GPIOs |
//!
//! Chip-select is an ordinary output here. The driver frames transactions
//! itself because a command and its parameters must share one assertion.

use core::fmt;

use embedded_hal::digital::{InputPin, OutputPin};
use thiserror::Error;

use crate::config::PinRole;

mod bitbang;
#[cfg(all(feature = "linux", target_os = "linux"))]
mod cdev;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
#[cfg(all(feature = "linux", target_os = "linux"))]
mod sysfs;

pub use bitbang::{BitBangBus, BitBangError};
#[cfg(all(feature = "linux", target_os = "linux"))]
pub use cdev::CdevBackend;
#[cfg(all(feature = "linux", target_os = "linux"))]
pub use sysfs::{BitBangBackend, SysfsBackend};

/// Roles claimed by the hardware-serial variants, in acquisition order
pub const HARDWARE_SERIAL_ROLES: &[PinRole] = &[
    PinRole::Reset,
    PinRole::DataCommand,
    PinRole::ChipSelect,
    PinRole::Busy,
    PinRole::Power,
];

/// Roles claimed by the bit-banged variant, in acquisition order
pub const BIT_BANG_ROLES: &[PinRole] = &PinRole::ALL;

/// Largest single write handed to a bus (spidev's default `bufsiz`)
pub const MAX_TRANSFER_LEN: usize = 4096;

/// Logic level of a line
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

/// Line direction requested when claiming a pin
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Input,
    /// Output, driven to the role's idle level when claimed
    /// (see [`PinRole::idles_high`])
    Output,
}

impl Direction {
    /// Direction a role is always claimed with
    pub fn for_role(role: PinRole) -> Direction {
        match role {
            PinRole::Busy => Direction::Input,
            _ => Direction::Output,
        }
    }
}

/// Something a backend claims and must give back
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resource {
    Pin(PinRole),
    Bus,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Pin(role) => write!(f, "{role:?} pin"),
            Resource::Bus => f.write_str("serial bus"),
        }
    }
}

/// Faults raised by a [`Backend`]
///
/// Every variant reports through the same taxonomy so the driver never needs
/// to know which backend it runs on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The resource could not be claimed (busy, permission denied, no such line)
    #[error("cannot claim {resource}: {reason}")]
    PinConfiguration { resource: Resource, reason: String },
    /// A transfer or level change failed after the resource was claimed
    #[error("I/O fault on {resource}: {reason}")]
    Io { resource: Resource, reason: String },
    /// The resource was used before it was claimed
    #[error("{0} has not been claimed")]
    Unclaimed(Resource),
}

impl BackendError {
    pub(crate) fn claim(resource: Resource, reason: impl fmt::Display) -> Self {
        BackendError::PinConfiguration {
            resource,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn io(resource: Resource, reason: impl fmt::Display) -> Self {
        BackendError::Io {
            resource,
            reason: reason.to_string(),
        }
    }
}

/// Pin and bus capability set the panel driver is written against
///
/// Implementations must be behaviorally identical: the same ordering, the
/// same blocking semantics, the same [`BackendError`] variants.
pub trait Backend {
    /// Pin roles this variant claims, in acquisition order
    fn roles(&self) -> &'static [PinRole];

    /// Claim the line bound to `role` with the given direction
    ///
    /// # Errors
    ///
    /// [`BackendError::PinConfiguration`] if the line cannot be claimed.
    fn configure_pin(&mut self, role: PinRole, direction: Direction) -> Result<(), BackendError>;

    /// Open the serial bus; called once every pin in [`roles`](Self::roles) is claimed
    fn open_bus(&mut self) -> Result<(), BackendError>;

    /// Drive an output line
    fn write_pin(&mut self, role: PinRole, level: Level) -> Result<(), BackendError>;

    /// Sample an input line
    fn read_pin(&mut self, role: PinRole) -> Result<Level, BackendError>;

    /// Send `bytes` in order, blocking until they are on the wire
    ///
    /// Chip-select is not touched.
    fn transfer(&mut self, bytes: &[u8]) -> Result<(), BackendError>;

    /// Give back the bus and every claimed line, newest first
    ///
    /// Never fails; faults are logged and the remaining resources are still
    /// released. Calling it with nothing claimed is a no-op.
    fn release(&mut self);
}

impl<B: Backend + ?Sized> Backend for Box<B> {
    fn roles(&self) -> &'static [PinRole] {
        (**self).roles()
    }

    fn configure_pin(&mut self, role: PinRole, direction: Direction) -> Result<(), BackendError> {
        (**self).configure_pin(role, direction)
    }

    fn open_bus(&mut self) -> Result<(), BackendError> {
        (**self).open_bus()
    }

    fn write_pin(&mut self, role: PinRole, level: Level) -> Result<(), BackendError> {
        (**self).write_pin(role, level)
    }

    fn read_pin(&mut self, role: PinRole) -> Result<Level, BackendError> {
        (**self).read_pin(role)
    }

    fn transfer(&mut self, bytes: &[u8]) -> Result<(), BackendError> {
        (**self).transfer(bytes)
    }

    fn release(&mut self) {
        (**self).release()
    }
}

/// Build the backend selected by `config`
#[cfg(all(feature = "linux", target_os = "linux"))]
pub fn open(config: &crate::config::Config) -> Box<dyn Backend + Send> {
    use crate::config::BackendVariant;

    log::info!(
        "Using {:?} backend (gpiochip {}, spidev {})",
        config.backend,
        config.gpiochip,
        config.spidev
    );
    match config.backend {
        BackendVariant::Cdev => Box::new(CdevBackend::new(config)),
        BackendVariant::Sysfs => Box::new(SysfsBackend::new(config)),
        BackendVariant::BitBang => Box::new(BitBangBackend::new(config)),
    }
}

/// A claimed line
pub enum Claimed<O, I> {
    Output(O),
    Input(I),
}

/// Claimed lines keyed by role, kept in acquisition order
///
/// Shared by every variant: writes and reads go through the embedded-hal
/// digital traits, so only claiming and releasing differ per backend.
pub struct PinTable<O, I> {
    pins: Vec<(PinRole, Claimed<O, I>)>,
}

impl<O, I> Default for PinTable<O, I> {
    fn default() -> Self {
        Self { pins: Vec::new() }
    }
}

impl<O, I> PinTable<O, I>
where
    O: OutputPin,
    I: InputPin,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_claimed(&self, role: PinRole) -> bool {
        self.pins.iter().any(|(r, _)| *r == role)
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    /// Record a newly claimed line
    pub fn insert(&mut self, role: PinRole, pin: Claimed<O, I>) {
        self.pins.push((role, pin));
    }

    pub fn write(&mut self, role: PinRole, level: Level) -> Result<(), BackendError> {
        match self.pins.iter_mut().find(|(r, _)| *r == role) {
            Some((_, Claimed::Output(pin))) => {
                let result = match level {
                    Level::High => pin.set_high(),
                    Level::Low => pin.set_low(),
                };
                result.map_err(|e| BackendError::io(Resource::Pin(role), format!("{e:?}")))
            }
            Some((_, Claimed::Input(_))) => Err(BackendError::Io {
                resource: Resource::Pin(role),
                reason: "line is claimed as an input".into(),
            }),
            None => Err(BackendError::Unclaimed(Resource::Pin(role))),
        }
    }

    pub fn read(&mut self, role: PinRole) -> Result<Level, BackendError> {
        match self.pins.iter_mut().find(|(r, _)| *r == role) {
            Some((_, Claimed::Input(pin))) => pin
                .is_high()
                .map(Level::from)
                .map_err(|e| BackendError::io(Resource::Pin(role), format!("{e:?}"))),
            Some((_, Claimed::Output(_))) => Err(BackendError::Io {
                resource: Resource::Pin(role),
                reason: "line is claimed as an output".into(),
            }),
            None => Err(BackendError::Unclaimed(Resource::Pin(role))),
        }
    }

    /// Remove an output line, e.g. to hand it to a bit-banged bus
    pub fn take_output(&mut self, role: PinRole) -> Option<O> {
        let index = self
            .pins
            .iter()
            .position(|(r, pin)| *r == role && matches!(pin, Claimed::Output(_)))?;
        match self.pins.remove(index) {
            (_, Claimed::Output(pin)) => Some(pin),
            (_, Claimed::Input(_)) => None,
        }
    }

    /// Remove every line, newest first
    pub fn drain_newest_first(&mut self) -> impl Iterator<Item = (PinRole, Claimed<O, I>)> + '_ {
        self.pins.drain(..).rev()
    }
}
