//! Resource lifecycle around the panel driver
//!
//! An [`EpdModule`] owns the backend for as long as it lives. It refuses to
//! draw before [`init`](EpdModule::init), refuses a second `init` while
//! resources are held, and gives everything back on
//! [`exit`](EpdModule::exit) or when dropped.
//!
//! There is no process-wide instance. Two modules pointed at the same lines
//! cannot both be Ready, because the second one fails to claim the pins and
//! reports [`BackendError::PinConfiguration`](crate::backend::BackendError::PinConfiguration).
//!
//! ## Example
//!
//! ```no_run
//! use epd7in3e::{Color, Config, LinuxModule, Pattern};
//!
//! let config = Config::from_env()?;
//! let mut module = LinuxModule::open(&config);
//!
//! module.init()?;
//! module.clear(Color::White)?;
//! module.show_pattern(Pattern::ColorBlocks)?;
//! module.sleep()?;
//! module.exit();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use embedded_hal::delay::DelayNs;

use crate::backend::Backend;
use crate::color::{Color, PALETTE};
use crate::config::Timing;
use crate::display::{Display, PanelState};
use crate::error::Error;
use crate::framebuffer::Framebuffer;
use crate::interface::Interface;
use crate::pattern::Pattern;
use crate::{BUFFER_SIZE, HEIGHT, WIDTH};

/// Whether the module currently holds its resources
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModuleState {
    /// Never initialized
    Uninitialized,
    /// Resources claimed and the panel initialized
    Ready,
    /// Resources released by [`EpdModule::exit`]; `init` may run again
    Exited,
}

/// Cross-thread request to stop a blocking operation
///
/// Setting it stops the current busy wait with [`Error::Aborted`]; the
/// module then releases every resource as [`EpdModule::exit`] does. The
/// panel is left in whatever state the interrupted sequence reached.
/// A request made while the module is not Ready is discarded by the next
/// [`EpdModule::init`].
#[derive(Clone, Debug, Default)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    fn reset(&self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Owned driver context: backend, protocol state and delay source
pub struct EpdModule<B, D>
where
    B: Backend,
    D: DelayNs,
{
    display: Display<Interface<B>>,
    delay: D,
    state: ModuleState,
    abort: AbortHandle,
}

/// Module on one of the Linux backends, sleeping with the OS timer
#[cfg(all(feature = "linux", target_os = "linux"))]
pub type LinuxModule = EpdModule<Box<dyn Backend + Send>, linux_embedded_hal::Delay>;

#[cfg(all(feature = "linux", target_os = "linux"))]
impl LinuxModule {
    /// Build the backend selected by `config`; nothing is claimed yet
    pub fn open(config: &crate::config::Config) -> Self {
        Self::new(
            crate::backend::open(config),
            config.timing,
            linux_embedded_hal::Delay,
        )
    }
}

impl<B, D> EpdModule<B, D>
where
    B: Backend,
    D: DelayNs,
{
    pub fn new(backend: B, timing: Timing, delay: D) -> Self {
        let abort = AbortHandle::default();
        let interface = Interface::with_abort_flag(backend, timing, Arc::clone(&abort.flag));
        Self {
            display: Display::new(interface),
            delay,
            state: ModuleState::Uninitialized,
            abort,
        }
    }

    pub const fn width() -> usize {
        WIDTH
    }

    pub const fn height() -> usize {
        HEIGHT
    }

    /// Exact length [`display`](Self::display) accepts
    pub const fn buffer_size() -> usize {
        BUFFER_SIZE
    }

    /// Palette name and color pairs
    pub fn colors() -> &'static [(&'static str, Color)] {
        &PALETTE
    }

    pub fn state(&self) -> ModuleState {
        self.state
    }

    pub fn panel_state(&self) -> PanelState {
        self.display.state()
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Backend access, e.g. to inspect a test double
    pub fn backend(&self) -> &B {
        self.display.interface().backend()
    }

    /// Claim every resource and run the reset and init sequence
    ///
    /// On failure everything claimed so far is released and the module
    /// state is unchanged, so `init` can simply be called again.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyInitialized`] if the module is Ready
    /// - [`Error::Backend`] if a pin or the bus cannot be claimed
    /// - [`Error::BusyTimeout`] if the controller never reports idle
    pub fn init(&mut self) -> Result<(), Error> {
        if self.state == ModuleState::Ready {
            return Err(Error::AlreadyInitialized);
        }
        // Nothing was running, so an earlier request has nothing to stop
        self.abort.reset();

        log::info!("Initializing panel module");
        self.display.acquire()?;
        if let Err(e) = self.display.init(&mut self.delay) {
            self.display.release();
            self.abort.reset();
            return Err(e);
        }

        self.state = ModuleState::Ready;
        Ok(())
    }

    /// Fill the panel with one color
    pub fn clear(&mut self, color: Color) -> Result<(), Error> {
        self.run(|display, delay| display.clear(color, delay))
    }

    /// Show caller-supplied packed bytes
    ///
    /// # Errors
    ///
    /// [`Error::InvalidBufferSize`] unless `buffer` is exactly
    /// [`buffer_size`](Self::buffer_size) bytes.
    pub fn display(&mut self, buffer: &[u8]) -> Result<(), Error> {
        self.run(|display, delay| display.display(buffer, delay))
    }

    /// Show a [`Framebuffer`], which must have the panel geometry
    pub fn display_framebuffer(&mut self, frame: &Framebuffer) -> Result<(), Error> {
        self.display(frame.as_bytes())
    }

    pub fn show_pattern(&mut self, pattern: Pattern) -> Result<(), Error> {
        self.run(|display, delay| display.show_pattern(pattern, delay))
    }

    /// Put the panel into deep sleep; resources stay claimed
    pub fn sleep(&mut self) -> Result<(), Error> {
        self.run(|display, delay| display.sleep(delay))
    }

    /// Re-run the reset and init sequence without re-claiming resources
    ///
    /// Valid when the panel is asleep, or after an error left it
    /// uninitialized while the module is still Ready.
    pub fn wake(&mut self) -> Result<(), Error> {
        self.run(|display, delay| display.init(delay))
    }

    /// Release every resource; idempotent and infallible
    ///
    /// Lines are parked low (power off) before the backend gives back the
    /// bus and pins in reverse order of acquisition.
    pub fn exit(&mut self) {
        if self.state == ModuleState::Ready {
            log::info!("Exiting panel module");
            self.display.release();
            self.state = ModuleState::Exited;
        }
        self.abort.reset();
    }

    /// Gate an operation on Ready and honor aborts before and during it
    fn run<T, F>(&mut self, op: F) -> Result<T, Error>
    where
        F: FnOnce(&mut Display<Interface<B>>, &mut D) -> Result<T, Error>,
    {
        if self.state != ModuleState::Ready {
            return Err(Error::NotInitialized);
        }
        if self.abort.is_aborted() {
            self.exit();
            return Err(Error::Aborted);
        }

        let result = op(&mut self.display, &mut self.delay);
        if let Err(Error::Aborted) = result {
            self.exit();
        }
        result
    }
}

impl<B, D> Drop for EpdModule<B, D>
where
    B: Backend,
    D: DelayNs,
{
    fn drop(&mut self) {
        self.exit();
    }
}
