//! Display configuration types and builder
//!
//! Pin numbering and controller timing are fixed per [`Platform`]. The builder
//! only chooses the platform, the backend variant, device paths and the SPI
//! clock; it never exposes the timing values, which encode physical
//! requirements of the controller.

use core::str::FromStr;

pub use crate::error::ConfigError;

/// Physical line a pin role is bound to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PinRole {
    /// Controller reset (active low)
    Reset,
    /// Data/Command select (low = command, high = data)
    DataCommand,
    /// Chip select (active low)
    ChipSelect,
    /// Busy status input (low = busy)
    Busy,
    /// Panel power switch (high = on)
    Power,
    /// Serial data out, claimed only by the bit-banged backend
    SerialOut,
    /// Serial clock, claimed only by the bit-banged backend
    SerialClock,
}

impl PinRole {
    /// Every role in acquisition order
    pub const ALL: [PinRole; 7] = [
        PinRole::Reset,
        PinRole::DataCommand,
        PinRole::ChipSelect,
        PinRole::Busy,
        PinRole::Power,
        PinRole::SerialOut,
        PinRole::SerialClock,
    ];

    /// Whether an output for this role idles high once claimed
    pub fn idles_high(self) -> bool {
        matches!(self, PinRole::ChipSelect)
    }

    /// Consumer label used when requesting the line
    pub fn label(self) -> &'static str {
        match self {
            PinRole::Reset => "epd-rst",
            PinRole::DataCommand => "epd-dc",
            PinRole::ChipSelect => "epd-cs",
            PinRole::Busy => "epd-busy",
            PinRole::Power => "epd-pwr",
            PinRole::SerialOut => "epd-mosi",
            PinRole::SerialClock => "epd-sclk",
        }
    }
}

/// Line number per role
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PinMap {
    pub reset: u32,
    pub data_command: u32,
    pub chip_select: u32,
    pub busy: u32,
    pub power: u32,
    pub serial_out: u32,
    pub serial_clock: u32,
}

impl PinMap {
    /// Raspberry Pi header wiring, BCM numbering
    pub const RASPBERRY_PI: PinMap = PinMap {
        reset: 17,
        data_command: 25,
        chip_select: 8,
        busy: 24,
        power: 18,
        serial_out: 10,
        serial_clock: 11,
    };

    /// Line bound to `role`
    pub fn line(&self, role: PinRole) -> u32 {
        match role {
            PinRole::Reset => self.reset,
            PinRole::DataCommand => self.data_command,
            PinRole::ChipSelect => self.chip_select,
            PinRole::Busy => self.busy,
            PinRole::Power => self.power,
            PinRole::SerialOut => self.serial_out,
            PinRole::SerialClock => self.serial_clock,
        }
    }

    fn check_unique(&self) -> Result<(), ConfigError> {
        for (i, &first) in PinRole::ALL.iter().enumerate() {
            for &second in &PinRole::ALL[i + 1..] {
                if self.line(first) == self.line(second) {
                    return Err(ConfigError::DuplicateLine {
                        line: self.line(first),
                        first,
                        second,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Controller timing, in milliseconds unless noted
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timing {
    /// Delay after switching panel power on
    pub power_settle_ms: u32,
    /// Reset held high before the pulse
    pub reset_high_ms: u32,
    /// Width of the low reset pulse
    pub reset_pulse_ms: u32,
    /// Reset held high after the pulse
    pub reset_settle_ms: u32,
    /// Delay after the controller first reports idle following reset
    pub post_reset_ms: u32,
    /// Interval between busy-line samples; 0 is treated as 1
    pub busy_poll_ms: u32,
    /// Give up waiting for idle after this long
    pub busy_timeout_ms: u32,
    /// Delay after the deep sleep command
    pub sleep_settle_ms: u32,
    /// Half clock period of the bit-banged bus, in nanoseconds
    pub bitbang_half_period_ns: u32,
}

impl Timing {
    pub const RASPBERRY_PI: Timing = Timing {
        power_settle_ms: 10,
        reset_high_ms: 20,
        reset_pulse_ms: 2,
        reset_settle_ms: 20,
        post_reset_ms: 30,
        busy_poll_ms: 10,
        // A six-color refresh runs for roughly 20 s at room temperature
        busy_timeout_ms: 60_000,
        sleep_settle_ms: 2_000,
        bitbang_half_period_ns: 1_000,
    };
}

/// Board the panel HAT is mounted on
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Platform {
    #[default]
    RaspberryPi,
}

impl Platform {
    pub fn pins(self) -> PinMap {
        match self {
            Platform::RaspberryPi => PinMap::RASPBERRY_PI,
        }
    }

    pub fn timing(self) -> Timing {
        match self {
            Platform::RaspberryPi => Timing::RASPBERRY_PI,
        }
    }

    pub fn gpiochip(self) -> &'static str {
        match self {
            Platform::RaspberryPi => "/dev/gpiochip0",
        }
    }

    pub fn spidev(self) -> &'static str {
        match self {
            Platform::RaspberryPi => "/dev/spidev0.0",
        }
    }
}

/// Low-level pin and bus implementation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BackendVariant {
    /// GPIO character device line requests, spidev transfers
    #[default]
    Cdev,
    /// Legacy `/sys/class/gpio` pins, spidev transfers
    Sysfs,
    /// Legacy `/sys/class/gpio` pins, bit-banged serial clock and data
    BitBang,
}

impl BackendVariant {
    /// Whether the variant claims the serial data and clock lines as GPIOs
    pub fn drives_serial_lines(self) -> bool {
        matches!(self, BackendVariant::BitBang)
    }
}

impl FromStr for BackendVariant {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cdev" | "gpiod" | "chardev" => Ok(BackendVariant::Cdev),
            "sysfs" | "dev" => Ok(BackendVariant::Sysfs),
            "bitbang" | "soft-spi" | "softspi" => Ok(BackendVariant::BitBang),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

/// Display configuration
///
/// Use [`Builder`] to create a Config.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub platform: Platform,
    pub backend: BackendVariant,
    pub pins: PinMap,
    /// GPIO character device, used by [`BackendVariant::Cdev`]
    pub gpiochip: String,
    /// spidev node, used by the hardware-serial variants
    pub spidev: String,
    pub spi_speed_hz: u32,
    pub timing: Timing,
}

impl Config {
    /// Build a configuration from `EPD_*` environment variables
    ///
    /// See [`Builder::with_env`] for the recognised variables.
    pub fn from_env() -> Result<Config, ConfigError> {
        Builder::new()
            .with_env(|name| std::env::var(name).ok())?
            .build()
    }
}

/// Builder for constructing display configuration
///
/// # Example
///
/// ```
/// use epd7in3e::{BackendVariant, Builder};
///
/// let config = Builder::new()
///     .backend(BackendVariant::Sysfs)
///     .spi_speed_hz(4_000_000)
///     .build()
///     .expect("valid configuration");
/// assert_eq!(config.spidev, "/dev/spidev0.0");
/// ```
pub struct Builder {
    platform: Platform,
    backend: BackendVariant,
    pins: Option<PinMap>,
    gpiochip: Option<String>,
    spidev: Option<String>,
    spi_speed_hz: u32,
}

impl Default for Builder {
    fn default() -> Self {
        Builder {
            platform: Platform::RaspberryPi,
            backend: BackendVariant::Cdev,
            pins: None,
            gpiochip: None,
            spidev: None,
            spi_speed_hz: 10_000_000,
        }
    }
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn backend(mut self, backend: BackendVariant) -> Self {
        self.backend = backend;
        self
    }

    /// Override the platform pin map (custom wiring)
    pub fn pins(mut self, pins: PinMap) -> Self {
        self.pins = Some(pins);
        self
    }

    pub fn gpiochip(mut self, path: impl Into<String>) -> Self {
        self.gpiochip = Some(path.into());
        self
    }

    pub fn spidev(mut self, path: impl Into<String>) -> Self {
        self.spidev = Some(path.into());
        self
    }

    pub fn spi_speed_hz(mut self, hz: u32) -> Self {
        self.spi_speed_hz = hz;
        self
    }

    /// Apply `EPD_BACKEND`, `EPD_GPIOCHIP`, `EPD_SPIDEV` and `EPD_SPI_HZ`
    ///
    /// `lookup` returns the value of a variable, if set.
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("EPD_BACKEND") {
            self.backend = value.parse()?;
        }
        if let Some(value) = lookup("EPD_GPIOCHIP") {
            self.gpiochip = Some(value);
        }
        if let Some(value) = lookup("EPD_SPIDEV") {
            self.spidev = Some(value);
        }
        if let Some(value) = lookup("EPD_SPI_HZ") {
            self.spi_speed_hz = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv {
                    name: "EPD_SPI_HZ",
                    value,
                })?;
        }
        Ok(self)
    }

    /// Build the configuration
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSpiSpeed`] for a zero clock and
    /// [`ConfigError::DuplicateLine`] if two roles share a line.
    pub fn build(self) -> Result<Config, ConfigError> {
        if self.spi_speed_hz == 0 {
            return Err(ConfigError::InvalidSpiSpeed(self.spi_speed_hz));
        }
        let pins = self.pins.unwrap_or_else(|| self.platform.pins());
        pins.check_unique()?;

        Ok(Config {
            platform: self.platform,
            backend: self.backend,
            pins,
            gpiochip: self
                .gpiochip
                .unwrap_or_else(|| self.platform.gpiochip().to_string()),
            spidev: self
                .spidev
                .unwrap_or_else(|| self.platform.spidev().to_string()),
            spi_speed_hz: self.spi_speed_hz,
            timing: self.platform.timing(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Builder::new().build().unwrap();
        assert_eq!(config.backend, BackendVariant::Cdev);
        assert_eq!(config.pins, PinMap::RASPBERRY_PI);
        assert_eq!(config.gpiochip, "/dev/gpiochip0");
        assert_eq!(config.timing, Timing::RASPBERRY_PI);
    }

    #[test]
    fn test_pin_lookup() {
        let pins = PinMap::RASPBERRY_PI;
        assert_eq!(pins.line(PinRole::Reset), 17);
        assert_eq!(pins.line(PinRole::DataCommand), 25);
        assert_eq!(pins.line(PinRole::ChipSelect), 8);
        assert_eq!(pins.line(PinRole::Busy), 24);
        assert_eq!(pins.line(PinRole::Power), 18);
    }

    #[test]
    fn test_duplicate_line_rejected() {
        let pins = PinMap {
            power: 17,
            ..PinMap::RASPBERRY_PI
        };
        let err = Builder::new().pins(pins).build().unwrap_err();
        assert_eq!(
            err,
            ConfigError::DuplicateLine {
                line: 17,
                first: PinRole::Reset,
                second: PinRole::Power,
            }
        );
    }

    #[test]
    fn test_backend_names() {
        assert_eq!("cdev".parse::<BackendVariant>(), Ok(BackendVariant::Cdev));
        assert_eq!("SYSFS".parse::<BackendVariant>(), Ok(BackendVariant::Sysfs));
        assert_eq!(
            "bitbang".parse::<BackendVariant>(),
            Ok(BackendVariant::BitBang)
        );
        assert!(matches!(
            "wiringpi".parse::<BackendVariant>(),
            Err(ConfigError::UnknownBackend(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("EPD_BACKEND", "bitbang"),
            ("EPD_SPIDEV", "/dev/spidev1.0"),
            ("EPD_SPI_HZ", "2000000"),
        ]
        .into_iter()
        .collect();

        let config = Builder::new()
            .with_env(|name| env.get(name).map(|v| v.to_string()))
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(config.backend, BackendVariant::BitBang);
        assert_eq!(config.spidev, "/dev/spidev1.0");
        assert_eq!(config.spi_speed_hz, 2_000_000);
        assert_eq!(config.gpiochip, "/dev/gpiochip0");
    }

    #[test]
    fn test_env_invalid_speed() {
        let result = Builder::new().with_env(|name| {
            (name == "EPD_SPI_HZ").then(|| "fast".to_string())
        });
        assert!(matches!(
            result,
            Err(ConfigError::InvalidEnv {
                name: "EPD_SPI_HZ",
                ..
            })
        ));
    }
}
