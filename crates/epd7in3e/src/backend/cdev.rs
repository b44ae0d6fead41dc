//! GPIO character device pins with a spidev bus

use embedded_hal::spi::SpiBus;
use linux_embedded_hal::gpio_cdev::{Chip, LineRequestFlags};
use linux_embedded_hal::spidev::{SpiModeFlags, SpidevOptions};
use linux_embedded_hal::{CdevPin, SpidevBus};

use super::{Backend, BackendError, Claimed, Direction, Level, PinTable, Resource};
use super::HARDWARE_SERIAL_ROLES;
use crate::config::{Config, PinMap, PinRole};

/// Lines requested from `/dev/gpiochipN`; the kernel frees a line when its
/// handle is dropped
pub struct CdevBackend {
    gpiochip: String,
    spidev: String,
    spi_speed_hz: u32,
    pins: PinMap,
    chip: Option<Chip>,
    table: PinTable<CdevPin, CdevPin>,
    bus: Option<SpidevBus>,
}

impl CdevBackend {
    /// Nothing is opened until the first [`Backend::configure_pin`]
    pub fn new(config: &Config) -> Self {
        Self {
            gpiochip: config.gpiochip.clone(),
            spidev: config.spidev.clone(),
            spi_speed_hz: config.spi_speed_hz,
            pins: config.pins,
            chip: None,
            table: PinTable::new(),
            bus: None,
        }
    }

    fn chip(&mut self, role: PinRole) -> Result<&mut Chip, BackendError> {
        if self.chip.is_none() {
            let chip = Chip::new(&self.gpiochip).map_err(|e| {
                BackendError::claim(Resource::Pin(role), format!("{}: {e:?}", self.gpiochip))
            })?;
            self.chip = Some(chip);
        }
        self.chip
            .as_mut()
            .ok_or(BackendError::Unclaimed(Resource::Pin(role)))
    }
}

impl Backend for CdevBackend {
    fn roles(&self) -> &'static [PinRole] {
        HARDWARE_SERIAL_ROLES
    }

    fn configure_pin(&mut self, role: PinRole, direction: Direction) -> Result<(), BackendError> {
        let offset = self.pins.line(role);
        let chip = self.chip(role)?;
        let line = chip
            .get_line(offset)
            .map_err(|e| BackendError::claim(Resource::Pin(role), format!("line {offset}: {e:?}")))?;

        let flags = match direction {
            Direction::Input => LineRequestFlags::INPUT,
            Direction::Output => LineRequestFlags::OUTPUT,
        };
        let default = u8::from(role.idles_high());
        let handle = line
            .request(flags, default, role.label())
            .map_err(|e| BackendError::claim(Resource::Pin(role), format!("line {offset}: {e:?}")))?;
        let pin = CdevPin::new(handle)
            .map_err(|e| BackendError::claim(Resource::Pin(role), format!("line {offset}: {e:?}")))?;

        log::debug!("Claimed {role:?} on {} line {offset}", self.gpiochip);
        self.table.insert(
            role,
            match direction {
                Direction::Input => Claimed::Input(pin),
                Direction::Output => Claimed::Output(pin),
            },
        );
        Ok(())
    }

    fn open_bus(&mut self) -> Result<(), BackendError> {
        let mut bus = SpidevBus::open(&self.spidev)
            .map_err(|e| BackendError::claim(Resource::Bus, format!("{}: {e:?}", self.spidev)))?;
        let options = SpidevOptions::new()
            .bits_per_word(8)
            .max_speed_hz(self.spi_speed_hz)
            .mode(SpiModeFlags::SPI_MODE_0 | SpiModeFlags::SPI_NO_CS)
            .build();
        bus.configure(&options)
            .map_err(|e| BackendError::claim(Resource::Bus, format!("{}: {e:?}", self.spidev)))?;

        log::debug!("Opened {} at {} Hz", self.spidev, self.spi_speed_hz);
        self.bus = Some(bus);
        Ok(())
    }

    fn write_pin(&mut self, role: PinRole, level: Level) -> Result<(), BackendError> {
        self.table.write(role, level)
    }

    fn read_pin(&mut self, role: PinRole) -> Result<Level, BackendError> {
        self.table.read(role)
    }

    fn transfer(&mut self, bytes: &[u8]) -> Result<(), BackendError> {
        let bus = self
            .bus
            .as_mut()
            .ok_or(BackendError::Unclaimed(Resource::Bus))?;
        bus.write(bytes)
            .map_err(|e| BackendError::io(Resource::Bus, format!("{e:?}")))
    }

    fn release(&mut self) {
        if self.bus.take().is_some() {
            log::debug!("Closed {}", self.spidev);
        }
        for (role, _pin) in self.table.drain_newest_first() {
            log::debug!("Released {role:?}");
        }
        self.chip = None;
    }
}
