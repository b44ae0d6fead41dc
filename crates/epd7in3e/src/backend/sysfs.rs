//! Legacy `/sys/class/gpio` pins, with either spidev or a bit-banged bus
//!
//! Exported lines stay exported after the process exits unless they are
//! unexported, so both variants unexport every line on release.

use embedded_hal::spi::SpiBus;
use linux_embedded_hal::spidev::{SpiModeFlags, SpidevOptions};
use linux_embedded_hal::sysfs_gpio::Direction as SysfsDirection;
use linux_embedded_hal::{Delay, SpidevBus, SysfsPin};

use super::{
    Backend, BackendError, BitBangBus, Claimed, Direction, Level, PinTable, Resource,
    BIT_BANG_ROLES, HARDWARE_SERIAL_ROLES,
};
use crate::config::{Config, PinMap, PinRole};

fn claim(pins: &PinMap, role: PinRole, direction: Direction) -> Result<SysfsPin, BackendError> {
    let line = pins.line(role);
    let pin = SysfsPin::new(u64::from(line));
    pin.export()
        .map_err(|e| BackendError::claim(Resource::Pin(role), format!("gpio{line}: {e:?}")))?;

    let sysfs_direction = match direction {
        Direction::Input => SysfsDirection::In,
        Direction::Output if role.idles_high() => SysfsDirection::High,
        Direction::Output => SysfsDirection::Low,
    };
    if let Err(e) = pin.set_direction(sysfs_direction) {
        unexport(role, &pin);
        return Err(BackendError::claim(
            Resource::Pin(role),
            format!("gpio{line}: {e:?}"),
        ));
    }

    log::debug!("Exported {role:?} as gpio{line}");
    Ok(pin)
}

fn unexport(role: PinRole, pin: &SysfsPin) {
    match pin.unexport() {
        Ok(()) => log::debug!("Unexported {role:?}"),
        Err(e) => log::warn!("Failed to unexport {role:?}: {e:?}"),
    }
}

fn release_table(table: &mut PinTable<SysfsPin, SysfsPin>) {
    for (role, pin) in table.drain_newest_first() {
        match pin {
            Claimed::Output(pin) | Claimed::Input(pin) => unexport(role, &pin),
        }
    }
}

fn open_spidev(path: &str, speed_hz: u32) -> Result<SpidevBus, BackendError> {
    let mut bus = SpidevBus::open(path)
        .map_err(|e| BackendError::claim(Resource::Bus, format!("{path}: {e:?}")))?;
    let options = SpidevOptions::new()
        .bits_per_word(8)
        .max_speed_hz(speed_hz)
        .mode(SpiModeFlags::SPI_MODE_0 | SpiModeFlags::SPI_NO_CS)
        .build();
    bus.configure(&options)
        .map_err(|e| BackendError::claim(Resource::Bus, format!("{path}: {e:?}")))?;
    log::debug!("Opened {path} at {speed_hz} Hz");
    Ok(bus)
}

fn insert(table: &mut PinTable<SysfsPin, SysfsPin>, role: PinRole, direction: Direction, pin: SysfsPin) {
    let claimed = match direction {
        Direction::Input => Claimed::Input(pin),
        Direction::Output => Claimed::Output(pin),
    };
    table.insert(role, claimed);
}

/// Sysfs pins with hardware SPI through spidev
pub struct SysfsBackend {
    spidev: String,
    spi_speed_hz: u32,
    pins: PinMap,
    table: PinTable<SysfsPin, SysfsPin>,
    bus: Option<SpidevBus>,
}

impl SysfsBackend {
    pub fn new(config: &Config) -> Self {
        Self {
            spidev: config.spidev.clone(),
            spi_speed_hz: config.spi_speed_hz,
            pins: config.pins,
            table: PinTable::new(),
            bus: None,
        }
    }
}

impl Backend for SysfsBackend {
    fn roles(&self) -> &'static [PinRole] {
        HARDWARE_SERIAL_ROLES
    }

    fn configure_pin(&mut self, role: PinRole, direction: Direction) -> Result<(), BackendError> {
        let pin = claim(&self.pins, role, direction)?;
        insert(&mut self.table, role, direction, pin);
        Ok(())
    }

    fn open_bus(&mut self) -> Result<(), BackendError> {
        self.bus = Some(open_spidev(&self.spidev, self.spi_speed_hz)?);
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
        release_table(&mut self.table);
    }
}

/// Sysfs pins for every line, serial data and clock included
pub struct BitBangBackend {
    pins: PinMap,
    half_period_ns: u32,
    table: PinTable<SysfsPin, SysfsPin>,
    bus: Option<BitBangBus<SysfsPin, SysfsPin, Delay>>,
}

impl BitBangBackend {
    pub fn new(config: &Config) -> Self {
        Self {
            pins: config.pins,
            half_period_ns: config.timing.bitbang_half_period_ns,
            table: PinTable::new(),
            bus: None,
        }
    }
}

impl Backend for BitBangBackend {
    fn roles(&self) -> &'static [PinRole] {
        BIT_BANG_ROLES
    }

    fn configure_pin(&mut self, role: PinRole, direction: Direction) -> Result<(), BackendError> {
        let pin = claim(&self.pins, role, direction)?;
        insert(&mut self.table, role, direction, pin);
        Ok(())
    }

    fn open_bus(&mut self) -> Result<(), BackendError> {
        let mosi = self
            .table
            .take_output(PinRole::SerialOut)
            .ok_or(BackendError::Unclaimed(Resource::Pin(PinRole::SerialOut)))?;
        let sclk = match self.table.take_output(PinRole::SerialClock) {
            Some(pin) => pin,
            None => {
                unexport(PinRole::SerialOut, &mosi);
                return Err(BackendError::Unclaimed(Resource::Pin(PinRole::SerialClock)));
            }
        };

        log::debug!("Bit-banged bus ready, half period {} ns", self.half_period_ns);
        self.bus = Some(BitBangBus::new(mosi, sclk, Delay, self.half_period_ns));
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
            .map_err(|e| BackendError::io(Resource::Bus, format!("{:?}", e.0)))
    }

    fn release(&mut self) {
        // The bus holds the two newest lines
        if let Some(bus) = self.bus.take() {
            let (mosi, sclk) = bus.into_parts();
            unexport(PinRole::SerialClock, &sclk);
            unexport(PinRole::SerialOut, &mosi);
        }
        release_table(&mut self.table);
    }
}
