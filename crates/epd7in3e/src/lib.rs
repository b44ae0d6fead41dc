//! Driver for the 7.3" six-color e-Paper panel (800 x 480) on Linux.
//!
//! The crate is layered the way the controller is driven:
//!
//! - [`backend`]: GPIO lines and a serial bus, with three interchangeable
//!   Linux variants (GPIO character device, sysfs, sysfs with a bit-banged bus)
//! - [`interface`]: transaction framing (chip-select, data/command, chunking),
//!   reset pulse and bounded busy polling
//! - [`display`]: the panel protocol state machine
//! - [`module`]: resource ownership, init-before-use and exit-releases-all
//! - [`framebuffer`] and [`color`]: the packed 4-bit pixel format
//!
//! ## Example
//!
//! ```no_run
//! use epd7in3e::{Builder, BackendVariant, Color, Framebuffer, LinuxModule, HEIGHT, WIDTH};
//!
//! let config = Builder::new().backend(BackendVariant::Cdev).build()?;
//! let mut module = LinuxModule::open(&config);
//! module.init()?;
//!
//! let mut frame = Framebuffer::new(WIDTH, HEIGHT);
//! frame.set_pixel(10, 10, Color::Red)?;
//! module.display_framebuffer(&frame)?;
//!
//! module.sleep()?;
//! module.exit();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![forbid(unsafe_code)]
#![cfg_attr(
    not(test),
    deny(
        clippy::expect_used,
        clippy::panic,
        clippy::todo,
        clippy::unimplemented,
        clippy::unreachable,
        clippy::unwrap_used
    )
)]

pub mod backend;
pub mod color;
pub mod command;
pub mod config;
pub mod display;
pub mod error;
pub mod framebuffer;
#[cfg(feature = "graphics")]
pub mod graphics;
pub mod interface;
pub mod module;
pub mod pattern;

pub use backend::{Backend, BackendError, Level};
pub use color::{Color, PALETTE};
pub use config::{BackendVariant, Builder, Config, PinMap, PinRole, Platform, Timing};
pub use display::{Display, PanelState};
pub use error::{ConfigError, Error};
pub use framebuffer::Framebuffer;
pub use interface::{DisplayInterface, Interface};
pub use module::{AbortHandle, EpdModule, ModuleState};
#[cfg(all(feature = "linux", target_os = "linux"))]
pub use module::LinuxModule;
pub use pattern::Pattern;

/// Panel width in pixels
pub const WIDTH: usize = 800;
/// Panel height in pixels
pub const HEIGHT: usize = 480;
/// Exact length of a packed frame
pub const BUFFER_SIZE: usize = framebuffer::buffer_size(WIDTH, HEIGHT);
