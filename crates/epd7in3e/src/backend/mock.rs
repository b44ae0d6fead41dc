//! In-memory backend that records every call
//!
//! [`RecordingBackend`] is cheap to clone and every clone shares one log, so a
//! test keeps a clone as a probe after handing the original to the driver.
//! [`RecordingDelay`] writes into the same log, which lets a test check the
//! order of pin changes, transfers and waits together.
//!
//! ```
//! use epd7in3e::backend::mock::RecordingBackend;
//! use epd7in3e::backend::{Backend, Direction, Level};
//! use epd7in3e::PinRole;
//!
//! let mut backend = RecordingBackend::new();
//! let probe = backend.clone();
//! backend.set_busy(Level::Low);
//!
//! backend.configure_pin(PinRole::Busy, Direction::Input).unwrap();
//! assert_eq!(backend.read_pin(PinRole::Busy).unwrap(), Level::Low);
//! assert_eq!(probe.claimed(), vec![PinRole::Busy]);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use embedded_hal::delay::DelayNs;

use super::{
    Backend, BackendError, Direction, Level, Resource, BIT_BANG_ROLES, HARDWARE_SERIAL_ROLES,
};
use crate::config::PinRole;

/// One recorded call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Configure(PinRole, Direction),
    OpenBus,
    Write(PinRole, Level),
    Read(PinRole, Level),
    Transfer(Vec<u8>),
    Delay { ns: u64 },
    Release(Resource),
}

/// A command byte and the data bytes that followed it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub command: u8,
    pub data: Vec<u8>,
}

struct State {
    roles: &'static [PinRole],
    events: Vec<Event>,
    claimed: Vec<PinRole>,
    bus_open: bool,
    busy_default: Level,
    busy_script: VecDeque<Level>,
    fail_configure: Option<PinRole>,
    fail_open_bus: bool,
    fail_transfer: bool,
    elapsed_ns: u64,
}

/// Backend double with a scripted busy line and injectable faults
#[derive(Clone)]
pub struct RecordingBackend {
    state: Arc<Mutex<State>>,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::with_roles(HARDWARE_SERIAL_ROLES)
    }
}

impl RecordingBackend {
    /// Claims the hardware-serial role set; busy reads idle by default
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims every role, like the bit-banged variant
    pub fn bit_bang() -> Self {
        Self::with_roles(BIT_BANG_ROLES)
    }

    fn with_roles(roles: &'static [PinRole]) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                roles,
                events: Vec::new(),
                claimed: Vec::new(),
                bus_open: false,
                busy_default: Level::High,
                busy_script: VecDeque::new(),
                fail_configure: None,
                fail_open_bus: false,
                fail_transfer: false,
                elapsed_ns: 0,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A delay that logs into this backend's event list
    pub fn delay(&self) -> RecordingDelay {
        RecordingDelay {
            state: Arc::clone(&self.state),
        }
    }

    /// Level returned by busy reads once the script is exhausted
    pub fn set_busy(&self, level: Level) {
        self.state().busy_default = level;
    }

    /// Levels returned by the next busy reads, in order
    pub fn script_busy<I: IntoIterator<Item = Level>>(&self, levels: I) {
        self.state().busy_script.extend(levels);
    }

    /// Make claiming `role` fail with [`BackendError::PinConfiguration`]
    pub fn fail_configure(&self, role: Option<PinRole>) {
        self.state().fail_configure = role;
    }

    pub fn fail_open_bus(&self, fail: bool) {
        self.state().fail_open_bus = fail;
    }

    /// Make every transfer fail with [`BackendError::Io`]
    pub fn fail_transfer(&self, fail: bool) {
        self.state().fail_transfer = fail;
    }

    pub fn events(&self) -> Vec<Event> {
        self.state().events.clone()
    }

    /// Drain the log
    pub fn take_events(&self) -> Vec<Event> {
        std::mem::take(&mut self.state().events)
    }

    /// Roles currently claimed, in acquisition order
    pub fn claimed(&self) -> Vec<PinRole> {
        self.state().claimed.clone()
    }

    pub fn is_bus_open(&self) -> bool {
        self.state().bus_open
    }

    /// Nothing claimed and no bus open
    pub fn is_released(&self) -> bool {
        let state = self.state();
        state.claimed.is_empty() && !state.bus_open
    }

    /// Total time passed to [`RecordingDelay`]
    pub fn elapsed_ms(&self) -> u64 {
        self.state().elapsed_ns / 1_000_000
    }

    /// Number of busy-line samples taken
    pub fn busy_reads(&self) -> usize {
        self.state()
            .events
            .iter()
            .filter(|e| matches!(e, Event::Read(PinRole::Busy, _)))
            .count()
    }

    /// Transfers regrouped by the data/command line into command frames
    ///
    /// Data sent before any command is dropped.
    pub fn frames(&self) -> Vec<Frame> {
        let mut frames: Vec<Frame> = Vec::new();
        let mut dc = Level::Low;
        for event in self.state().events.iter() {
            match event {
                Event::Write(PinRole::DataCommand, level) => dc = *level,
                Event::Transfer(bytes) if dc == Level::Low => {
                    for &command in bytes {
                        frames.push(Frame {
                            command,
                            data: Vec::new(),
                        });
                    }
                }
                Event::Transfer(bytes) => {
                    if let Some(frame) = frames.last_mut() {
                        frame.data.extend_from_slice(bytes);
                    }
                }
                _ => {}
            }
        }
        frames
    }

    /// Command bytes only, in order
    pub fn commands(&self) -> Vec<u8> {
        self.frames().iter().map(|f| f.command).collect()
    }
}

impl Backend for RecordingBackend {
    fn roles(&self) -> &'static [PinRole] {
        self.state().roles
    }

    fn configure_pin(&mut self, role: PinRole, direction: Direction) -> Result<(), BackendError> {
        let mut state = self.state();
        if state.fail_configure == Some(role) {
            return Err(BackendError::claim(Resource::Pin(role), "line busy"));
        }
        state.events.push(Event::Configure(role, direction));
        state.claimed.push(role);
        Ok(())
    }

    fn open_bus(&mut self) -> Result<(), BackendError> {
        let mut state = self.state();
        if state.fail_open_bus {
            return Err(BackendError::claim(Resource::Bus, "no such device"));
        }
        state.events.push(Event::OpenBus);
        state.bus_open = true;
        Ok(())
    }

    fn write_pin(&mut self, role: PinRole, level: Level) -> Result<(), BackendError> {
        let mut state = self.state();
        if !state.claimed.contains(&role) {
            return Err(BackendError::Unclaimed(Resource::Pin(role)));
        }
        state.events.push(Event::Write(role, level));
        Ok(())
    }

    fn read_pin(&mut self, role: PinRole) -> Result<Level, BackendError> {
        let mut state = self.state();
        if !state.claimed.contains(&role) {
            return Err(BackendError::Unclaimed(Resource::Pin(role)));
        }
        let level = match role {
            PinRole::Busy => state
                .busy_script
                .pop_front()
                .unwrap_or(state.busy_default),
            _ => Level::Low,
        };
        state.events.push(Event::Read(role, level));
        Ok(level)
    }

    fn transfer(&mut self, bytes: &[u8]) -> Result<(), BackendError> {
        let mut state = self.state();
        if !state.bus_open {
            return Err(BackendError::Unclaimed(Resource::Bus));
        }
        if state.fail_transfer {
            return Err(BackendError::io(Resource::Bus, "transfer timed out"));
        }
        state.events.push(Event::Transfer(bytes.to_vec()));
        Ok(())
    }

    fn release(&mut self) {
        let mut state = self.state();
        if state.bus_open {
            state.bus_open = false;
            state.events.push(Event::Release(Resource::Bus));
        }
        while let Some(role) = state.claimed.pop() {
            state.events.push(Event::Release(Resource::Pin(role)));
        }
    }
}

/// Fake clock: records the requested wait and returns at once
pub struct RecordingDelay {
    state: Arc<Mutex<State>>,
}

impl RecordingDelay {
    fn record(&mut self, ns: u64) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.elapsed_ns += ns;
        state.events.push(Event::Delay { ns });
    }
}

impl DelayNs for RecordingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.record(u64::from(ns));
    }

    fn delay_us(&mut self, us: u32) {
        self.record(u64::from(us) * 1_000);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.record(u64::from(ms) * 1_000_000);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_script_then_default() {
        let mut backend = RecordingBackend::new();
        backend.configure_pin(PinRole::Busy, Direction::Input).unwrap();
        backend.script_busy([Level::Low, Level::Low]);

        assert_eq!(backend.read_pin(PinRole::Busy).unwrap(), Level::Low);
        assert_eq!(backend.read_pin(PinRole::Busy).unwrap(), Level::Low);
        assert_eq!(backend.read_pin(PinRole::Busy).unwrap(), Level::High);
        assert_eq!(backend.busy_reads(), 3);
    }

    #[test]
    fn test_frames_follow_dc_line() {
        let mut backend = RecordingBackend::new();
        backend
            .configure_pin(PinRole::DataCommand, Direction::Output)
            .unwrap();
        backend.open_bus().unwrap();

        backend.write_pin(PinRole::DataCommand, Level::Low).unwrap();
        backend.transfer(&[0x07]).unwrap();
        backend.write_pin(PinRole::DataCommand, Level::High).unwrap();
        backend.transfer(&[0xA5]).unwrap();
        backend.write_pin(PinRole::DataCommand, Level::Low).unwrap();
        backend.transfer(&[0x04]).unwrap();

        assert_eq!(
            backend.frames(),
            vec![
                Frame {
                    command: 0x07,
                    data: vec![0xA5]
                },
                Frame {
                    command: 0x04,
                    data: vec![]
                },
            ]
        );
    }

    #[test]
    fn test_release_reverses_claims() {
        let mut backend = RecordingBackend::new();
        let probe = backend.clone();
        for &role in HARDWARE_SERIAL_ROLES {
            backend.configure_pin(role, Direction::for_role(role)).unwrap();
        }
        backend.open_bus().unwrap();
        probe.take_events();

        backend.release();
        assert!(probe.is_released());
        assert_eq!(
            probe.events(),
            vec![
                Event::Release(Resource::Bus),
                Event::Release(Resource::Pin(PinRole::Power)),
                Event::Release(Resource::Pin(PinRole::Busy)),
                Event::Release(Resource::Pin(PinRole::ChipSelect)),
                Event::Release(Resource::Pin(PinRole::DataCommand)),
                Event::Release(Resource::Pin(PinRole::Reset)),
            ]
        );

        backend.release();
        assert_eq!(probe.events().len(), 6);
    }

    #[test]
    fn test_injected_faults() {
        let mut backend = RecordingBackend::new();
        backend.fail_configure(Some(PinRole::Power));
        assert!(matches!(
            backend.configure_pin(PinRole::Power, Direction::Output),
            Err(BackendError::PinConfiguration { .. })
        ));
        assert_eq!(
            backend.transfer(&[0x00]),
            Err(BackendError::Unclaimed(Resource::Bus))
        );

        backend.open_bus().unwrap();
        backend.fail_transfer(true);
        assert!(matches!(
            backend.transfer(&[0x00]),
            Err(BackendError::Io { .. })
        ));
    }

    #[test]
    fn test_delay_accumulates() {
        let backend = RecordingBackend::new();
        let mut delay = backend.delay();
        delay.delay_ms(20);
        delay.delay_us(500);
        delay.delay_ms(2_000);
        assert_eq!(backend.elapsed_ms(), 2_020);
    }
}
