//! Core panel protocol
//!
//! [`Display`] turns panel operations into command streams on a
//! [`DisplayInterface`] and tracks where the controller is in its lifecycle:
//!
//! ```text
//! Uninitialized -> PoweringUp -> Resetting -> Initializing -> Idle
//! Idle -> Transmitting -> Refreshing -> Idle      (clear, display, pattern)
//! Idle -> SleepPending -> Slept                    (sleep)
//! Slept -> PoweringUp -> ...                       (init again)
//! ```
//!
//! Any error in the middle of a sequence leaves the controller in an unknown
//! hardware state, so the driver drops back to `Uninitialized` and a fresh
//! [`init`](Display::init) is needed.

use embedded_hal::delay::DelayNs;

use crate::color::Color;
use crate::command::*;
use crate::error::Error;
use crate::framebuffer::{buffer_size, Framebuffer};
use crate::interface::DisplayInterface;
use crate::pattern::Pattern;
use crate::{HEIGHT, WIDTH};

/// Where the controller is in its lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PanelState {
    Uninitialized,
    PoweringUp,
    Resetting,
    Initializing,
    Idle,
    Transmitting,
    Refreshing,
    SleepPending,
    Slept,
}

/// Core display driver for the 7.3" six-color panel
///
/// Resources are claimed and released through the interface; this struct
/// only sequences commands. The [`EpdModule`](crate::module::EpdModule)
/// wraps it with resource lifecycle checks.
pub struct Display<I>
where
    I: DisplayInterface,
{
    /// Hardware interface
    interface: I,
    state: PanelState,
}

impl<I> Display<I>
where
    I: DisplayInterface,
{
    /// Create a new Display instance
    pub fn new(interface: I) -> Self {
        Self {
            interface,
            state: PanelState::Uninitialized,
        }
    }

    pub fn state(&self) -> PanelState {
        self.state
    }

    /// Access the underlying interface
    pub fn interface(&self) -> &I {
        &self.interface
    }

    /// Claim the interface resources
    pub fn acquire(&mut self) -> Result<(), Error> {
        self.interface.acquire()
    }

    /// Power up, reset and initialize the controller
    ///
    /// Valid from `Uninitialized` and `Slept`.
    pub fn init<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error> {
        self.expect_state("init", &[PanelState::Uninitialized, PanelState::Slept])?;
        let result = self.power_up_sequence(delay);
        self.settle(result, PanelState::Idle)
    }

    fn power_up_sequence<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error> {
        self.state = PanelState::PoweringUp;
        self.interface.power_on(delay)?;

        self.state = PanelState::Resetting;
        self.interface.reset(delay)?;
        self.interface.busy_wait(delay)?;
        delay.delay_ms(self.interface.timing().post_reset_ms);

        self.state = PanelState::Initializing;
        for &(command, data) in INIT_SEQUENCE {
            self.interface.command_with_data(command, data)?;
        }
        self.interface.send_command(POWER_ON)?;
        self.interface.busy_wait(delay)?;

        log::info!("Panel initialized");
        Ok(())
    }

    /// Show a single color over the whole panel
    pub fn clear<D: DelayNs>(&mut self, color: Color, delay: &mut D) -> Result<(), Error> {
        self.expect_idle("clear")?;
        let frame = Framebuffer::filled(WIDTH, HEIGHT, color);
        log::info!("Clearing panel to {color}");
        self.transmit(frame.as_bytes(), delay)
    }

    /// Show a packed frame
    ///
    /// # Errors
    ///
    /// [`Error::InvalidBufferSize`] unless `buffer` is exactly
    /// [`BUFFER_SIZE`](crate::BUFFER_SIZE) bytes long. The buffer is sent
    /// unmodified.
    pub fn display<D: DelayNs>(&mut self, buffer: &[u8], delay: &mut D) -> Result<(), Error> {
        self.expect_idle("display")?;
        let expected = buffer_size(WIDTH, HEIGHT);
        if buffer.len() != expected {
            return Err(Error::InvalidBufferSize {
                expected,
                actual: buffer.len(),
            });
        }
        log::info!("Displaying {} byte frame", buffer.len());
        self.transmit(buffer, delay)
    }

    /// Show one of the built-in test images
    pub fn show_pattern<D: DelayNs>(&mut self, pattern: Pattern, delay: &mut D) -> Result<(), Error> {
        self.expect_idle("show pattern")?;
        let frame = pattern.render(WIDTH, HEIGHT);
        log::info!("Showing {} pattern", pattern.name());
        self.transmit(frame.as_bytes(), delay)
    }

    /// Put the controller into deep sleep
    ///
    /// Only [`init`](Self::init) is accepted afterwards.
    pub fn sleep<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error> {
        self.expect_idle("sleep")?;
        self.state = PanelState::SleepPending;
        let settle_ms = self.interface.timing().sleep_settle_ms;
        let result = self
            .interface
            .command_with_data(DEEP_SLEEP, &[DEEP_SLEEP_CHECK])
            .map(|()| delay.delay_ms(settle_ms));
        self.settle(result, PanelState::Slept)?;
        log::info!("Panel asleep");
        Ok(())
    }

    /// Park the lines, release the interface and forget the panel state
    ///
    /// Valid from any state and never fails.
    pub fn release(&mut self) {
        self.interface.release();
        self.state = PanelState::Uninitialized;
    }

    fn transmit<D: DelayNs>(&mut self, frame: &[u8], delay: &mut D) -> Result<(), Error> {
        let result = self.transmit_and_refresh(frame, delay);
        self.settle(result, PanelState::Idle)
    }

    fn transmit_and_refresh<D: DelayNs>(&mut self, frame: &[u8], delay: &mut D) -> Result<(), Error> {
        self.state = PanelState::Transmitting;
        self.interface
            .command_with_data(DATA_START_TRANSMISSION, frame)?;

        self.state = PanelState::Refreshing;
        self.interface.send_command(POWER_ON)?;
        self.interface.busy_wait(delay)?;

        self.interface
            .command_with_data(BOOSTER_SOFT_START_2, &BOOSTER_2_REFRESH)?;

        self.interface.command_with_data(DISPLAY_REFRESH, &[0x00])?;
        self.interface.busy_wait(delay)?;

        self.interface.command_with_data(POWER_OFF, &[0x00])?;
        self.interface.busy_wait(delay)?;

        log::debug!("Refresh complete");
        Ok(())
    }

    /// Move to `next` on success, or back to `Uninitialized` on failure
    fn settle(&mut self, result: Result<(), Error>, next: PanelState) -> Result<(), Error> {
        match result {
            Ok(()) => {
                self.state = next;
                Ok(())
            }
            Err(e) => {
                log::error!("{:?} failed: {e}", self.state);
                self.state = PanelState::Uninitialized;
                Err(e)
            }
        }
    }

    fn expect_idle(&self, operation: &'static str) -> Result<(), Error> {
        self.expect_state(operation, &[PanelState::Idle])
    }

    fn expect_state(&self, operation: &'static str, allowed: &[PanelState]) -> Result<(), Error> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::ProtocolState {
                operation,
                state: self.state,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{Frame, RecordingBackend};
    use crate::backend::Level;
    use crate::config::Timing;
    use crate::interface::Interface;

    fn display() -> (Display<Interface<RecordingBackend>>, RecordingBackend) {
        let backend = RecordingBackend::new();
        let probe = backend.clone();
        let mut display = Display::new(Interface::new(backend, Timing::RASPBERRY_PI));
        display.acquire().unwrap();
        (display, probe)
    }

    fn ready() -> (Display<Interface<RecordingBackend>>, RecordingBackend) {
        let (mut display, probe) = display();
        display.init(&mut probe.delay()).unwrap();
        probe.take_events();
        (display, probe)
    }

    fn frame(command: u8, data: &[u8]) -> Frame {
        Frame {
            command,
            data: data.to_vec(),
        }
    }

    fn refresh_frames() -> Vec<Frame> {
        vec![
            frame(POWER_ON, &[]),
            frame(BOOSTER_SOFT_START_2, &BOOSTER_2_REFRESH),
            frame(DISPLAY_REFRESH, &[0x00]),
            frame(POWER_OFF, &[0x00]),
        ]
    }

    #[test]
    fn test_init_sequence() {
        let (mut display, probe) = display();
        display.init(&mut probe.delay()).unwrap();
        assert_eq!(display.state(), PanelState::Idle);

        let mut expected: Vec<Frame> = INIT_SEQUENCE
            .iter()
            .map(|&(command, data)| frame(command, data))
            .collect();
        expected.push(frame(POWER_ON, &[]));
        assert_eq!(probe.frames(), expected);
        assert_eq!(probe.commands()[0], 0xAA);
        assert_eq!(probe.commands().last(), Some(&POWER_ON));

        // power settle + reset phases + post-reset settle
        assert_eq!(probe.elapsed_ms(), 10 + 20 + 2 + 20 + 30);
    }

    #[test]
    fn test_init_times_out_on_stuck_busy() {
        let (mut display, probe) = display();
        probe.set_busy(Level::Low);

        let err = display.init(&mut probe.delay()).unwrap_err();
        assert!(matches!(err, Error::BusyTimeout { waited_ms: 60_000 }));
        assert_eq!(display.state(), PanelState::Uninitialized);
        // Timed out during the post-reset wait, before any command
        assert!(probe.frames().is_empty());
    }

    #[test]
    fn test_display_sends_buffer_unmodified() {
        let (mut display, probe) = ready();
        let buffer: Vec<u8> = (0..buffer_size(WIDTH, HEIGHT))
            .map(|i| (i % 251) as u8)
            .collect();
        display.display(&buffer, &mut probe.delay()).unwrap();

        let frames = probe.frames();
        assert_eq!(frames[0].command, DATA_START_TRANSMISSION);
        assert_eq!(frames[0].data, buffer);
        assert_eq!(frames[1..].to_vec(), refresh_frames());
        assert_eq!(display.state(), PanelState::Idle);
    }

    #[test]
    fn test_display_rejects_wrong_size() {
        let (mut display, probe) = ready();
        for len in [0, 191_999, 192_001] {
            let err = display.display(&vec![0x11; len], &mut probe.delay()).unwrap_err();
            assert!(matches!(
                err,
                Error::InvalidBufferSize {
                    expected: 192_000,
                    actual
                } if actual == len
            ));
        }
        assert!(probe.events().is_empty());
        assert_eq!(display.state(), PanelState::Idle);
    }

    #[test]
    fn test_clear_streams_single_color() {
        let (mut display, probe) = ready();
        display.clear(Color::Green, &mut probe.delay()).unwrap();

        let frames = probe.frames();
        assert_eq!(frames[0].command, DATA_START_TRANSMISSION);
        assert_eq!(frames[0].data.len(), 192_000);
        assert!(frames[0].data.iter().all(|&b| b == 0x66));
    }

    #[test]
    fn test_show_pattern() {
        let (mut display, probe) = ready();
        display
            .show_pattern(Pattern::ColorBlocks, &mut probe.delay())
            .unwrap();

        let data = &probe.frames()[0].data;
        assert_eq!(data[0], 0x00);
        assert_eq!(data[data.len() - 1], 0x11);
    }

    #[test]
    fn test_operations_require_idle() {
        let (mut display, probe) = display();
        let err = display.clear(Color::White, &mut probe.delay()).unwrap_err();
        assert!(matches!(
            err,
            Error::ProtocolState {
                operation: "clear",
                state: PanelState::Uninitialized
            }
        ));
        assert!(matches!(
            display.init(&mut probe.delay()).and_then(|()| display.init(&mut probe.delay())),
            Err(Error::ProtocolState {
                operation: "init",
                state: PanelState::Idle
            })
        ));
    }

    #[test]
    fn test_sleep_then_reinit() {
        let (mut display, probe) = ready();
        let start_ms = probe.elapsed_ms();
        display.sleep(&mut probe.delay()).unwrap();
        assert_eq!(display.state(), PanelState::Slept);
        assert_eq!(probe.frames(), vec![frame(DEEP_SLEEP, &[0xA5])]);
        assert_eq!(probe.elapsed_ms() - start_ms, 2_000);

        assert!(matches!(
            display.clear(Color::Red, &mut probe.delay()),
            Err(Error::ProtocolState {
                state: PanelState::Slept,
                ..
            })
        ));

        display.init(&mut probe.delay()).unwrap();
        assert_eq!(display.state(), PanelState::Idle);
    }

    #[test]
    fn test_transfer_fault_drops_to_uninitialized() {
        let (mut display, probe) = ready();
        probe.fail_transfer(true);
        let err = display.clear(Color::Black, &mut probe.delay()).unwrap_err();
        assert!(matches!(err, Error::Backend(_)));
        assert_eq!(display.state(), PanelState::Uninitialized);
    }

    #[test]
    fn test_release_from_any_state() {
        let (mut display, probe) = ready();
        display.release();
        assert_eq!(display.state(), PanelState::Uninitialized);
        assert!(probe.is_released());
    }
}
