//! Error types for the driver
//!
//! This module defines error types for configuration building ([`ConfigError`])
//! and panel operations ([`Error`]).
//!
//! ## Error Types
//!
//! - [`ConfigError`] - Errors while building a [`Config`](crate::config::Config)
//! - [`Error`] - Runtime errors during panel operations
//! - [`BackendError`](crate::backend::BackendError) - Pin claim and transport faults
//!   raised by a [`Backend`](crate::backend::Backend), wrapped in [`Error::Backend`]
//!
//! None of these are retried by the driver. The busy-line poll is the only
//! bounded loop and it reports [`Error::BusyTimeout`] when the bound is hit.
//!
//! ## Example
//!
//! ```
//! use epd7in3e::{Builder, ConfigError};
//!
//! let result = Builder::new().spi_speed_hz(0).build();
//! assert!(matches!(result, Err(ConfigError::InvalidSpiSpeed(0))));
//! ```

use thiserror::Error;

use crate::backend::BackendError;
use crate::display::PanelState;

/// Errors that can occur when driving the panel
#[derive(Debug, Error)]
pub enum Error {
    /// A pin could not be claimed or a pin/bus transfer failed
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The busy line never reported idle within the platform bound
    #[error("panel stayed busy for {waited_ms} ms")]
    BusyTimeout {
        /// Time spent polling before giving up
        waited_ms: u32,
    },

    /// The operation is not valid in the panel's current state
    #[error("cannot {operation} while panel is {state:?}")]
    ProtocolState {
        /// Operation that was attempted
        operation: &'static str,
        /// State the panel driver was in
        state: PanelState,
    },

    /// A framebuffer did not have the exact size of the panel frame
    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    InvalidBufferSize {
        /// Required frame length in bytes
        expected: usize,
        /// Length that was provided
        actual: usize,
    },

    /// Pixel coordinate outside the framebuffer
    #[error("pixel ({x}, {y}) outside {width}x{height} frame")]
    OutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },

    /// A code that is not one of the six palette entries
    #[error("0x{0:X} is not a palette color code")]
    InvalidColor(u8),

    /// `init` was called on a module that is already Ready
    #[error("module already initialized")]
    AlreadyInitialized,

    /// An operation was attempted before `init` or after `exit`
    #[error("module not initialized")]
    NotInitialized,

    /// A busy wait was cut short by an [`AbortHandle`](crate::module::AbortHandle)
    #[error("operation aborted by exit request")]
    Aborted,
}

/// Errors that can occur when building configuration
///
/// These errors occur during the builder pattern before any resource is claimed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Backend name did not match a known variant
    #[error("unknown backend '{0}' (expected cdev, sysfs or bitbang)")]
    UnknownBackend(String),
    /// SPI clock must be non-zero
    #[error("invalid SPI speed {0} Hz")]
    InvalidSpiSpeed(u32),
    /// Two roles were mapped to the same line
    #[error("line {line} assigned to both {first:?} and {second:?}")]
    DuplicateLine {
        line: u32,
        first: crate::config::PinRole,
        second: crate::config::PinRole,
    },
    /// An environment variable held an unparseable value
    #[error("environment variable {name} has invalid value '{value}'")]
    InvalidEnv { name: &'static str, value: String },
}
