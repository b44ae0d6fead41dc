use std::sync::{Arc, OnceLock};

use epd7in3e::backend::mock::{Event, RecordingBackend, RecordingDelay};
use epd7in3e::backend::{Direction, Resource};
use epd7in3e::{
    AbortHandle, Backend, BackendError, Color, EpdModule, Error, Framebuffer, Level, ModuleState,
    PanelState, Pattern, PinRole, Timing, BUFFER_SIZE, HEIGHT, WIDTH,
};

type Module = EpdModule<RecordingBackend, RecordingDelay>;

fn setup() -> (Module, RecordingBackend) {
    let backend = RecordingBackend::new();
    let probe = backend.clone();
    let delay = probe.delay();
    (EpdModule::new(backend, Timing::RASPBERRY_PI, delay), probe)
}

#[test]
fn draw_operations_before_init_fail() {
    let (mut module, probe) = setup();

    assert!(matches!(module.clear(Color::White), Err(Error::NotInitialized)));
    assert!(matches!(
        module.display(&vec![0x11; BUFFER_SIZE]),
        Err(Error::NotInitialized)
    ));
    assert!(matches!(
        module.show_pattern(Pattern::ColorBars),
        Err(Error::NotInitialized)
    ));
    assert!(matches!(module.sleep(), Err(Error::NotInitialized)));
    assert!(matches!(module.wake(), Err(Error::NotInitialized)));

    // Nothing was claimed or sent
    assert!(probe.events().is_empty());
}

#[test]
fn double_init_and_double_exit() {
    let (mut module, probe) = setup();

    module.init().unwrap();
    assert!(matches!(module.init(), Err(Error::AlreadyInitialized)));
    assert_eq!(module.state(), ModuleState::Ready);

    module.exit();
    let after_first_exit = probe.events().len();
    module.exit();
    assert_eq!(probe.events().len(), after_first_exit);
    assert_eq!(module.state(), ModuleState::Exited);

    assert!(matches!(module.clear(Color::Red), Err(Error::NotInitialized)));
}

#[test]
fn exit_before_init_is_noop() {
    let (mut module, probe) = setup();
    module.exit();
    module.exit();
    assert_eq!(module.state(), ModuleState::Uninitialized);
    assert!(probe.events().is_empty());
}

#[test]
fn exit_releases_in_reverse_acquisition_order() {
    let (mut module, probe) = setup();
    module.init().unwrap();
    module.clear(Color::White).unwrap();

    let acquired: Vec<Resource> = probe
        .events()
        .iter()
        .filter_map(|e| match e {
            Event::Configure(role, _) => Some(Resource::Pin(*role)),
            Event::OpenBus => Some(Resource::Bus),
            _ => None,
        })
        .collect();

    probe.take_events();
    module.exit();

    let released: Vec<Resource> = probe
        .events()
        .iter()
        .filter_map(|e| match e {
            Event::Release(resource) => Some(*resource),
            _ => None,
        })
        .collect();

    let mut expected = acquired;
    expected.reverse();
    assert_eq!(released, expected);
    assert!(probe.is_released());

    // Power is switched off before anything is released
    let first_release = probe
        .events()
        .iter()
        .position(|e| matches!(e, Event::Release(_)))
        .unwrap();
    let power_off = probe
        .events()
        .iter()
        .position(|e| *e == Event::Write(PinRole::Power, Level::Low))
        .unwrap();
    assert!(power_off < first_release);
}

#[test]
fn wrong_buffer_size_is_rejected() {
    let (mut module, probe) = setup();
    module.init().unwrap();
    probe.take_events();

    for len in [0, BUFFER_SIZE - 1, BUFFER_SIZE + 1, BUFFER_SIZE * 2] {
        let err = module.display(&vec![0x11; len]).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidBufferSize { expected, actual } if expected == BUFFER_SIZE && actual == len
        ));
    }
    assert!(probe.events().is_empty());
    assert_eq!(module.panel_state(), PanelState::Idle);
}

#[test]
fn framebuffer_roundtrip_through_display() {
    let (mut module, probe) = setup();
    module.init().unwrap();
    probe.take_events();

    let mut frame = Framebuffer::new(WIDTH, HEIGHT);
    frame.set_pixel(0, 0, Color::Red).unwrap();
    frame.set_pixel(1, 0, Color::Blue).unwrap();
    module.display_framebuffer(&frame).unwrap();

    let sent = &probe.frames()[0];
    assert_eq!(sent.command, 0x10);
    assert_eq!(sent.data.len(), 192_000);
    assert_eq!(sent.data[0], 0x35);
    assert_eq!(sent.data[1], 0x11);
}

#[test]
fn stuck_busy_line_times_out() {
    let (mut module, probe) = setup();
    probe.set_busy(Level::Low);

    let err = module.init().unwrap_err();
    assert!(matches!(err, Error::BusyTimeout { waited_ms } if waited_ms == 60_000));
    assert_eq!(module.state(), ModuleState::Uninitialized);
    assert!(probe.is_released());

    // Bounded: the fake clock advanced by the timeout plus the reset sequence
    assert!(probe.elapsed_ms() <= 60_000 + 100);
}

#[test]
fn zero_poll_interval_cannot_hang_init() {
    let backend = RecordingBackend::new();
    let probe = backend.clone();
    let timing = Timing {
        busy_poll_ms: 0,
        ..Timing::RASPBERRY_PI
    };
    let mut module = EpdModule::new(backend, timing, probe.delay());
    probe.set_busy(Level::Low);

    let err = module.init().unwrap_err();
    assert!(matches!(err, Error::BusyTimeout { waited_ms } if waited_ms == 60_000));
    assert_eq!(module.state(), ModuleState::Uninitialized);
    assert!(probe.is_released());
}

#[test]
fn sleep_then_wake() {
    let (mut module, probe) = setup();
    module.init().unwrap();
    module.sleep().unwrap();
    assert_eq!(module.panel_state(), PanelState::Slept);

    assert!(matches!(
        module.clear(Color::Black),
        Err(Error::ProtocolState {
            state: PanelState::Slept,
            ..
        })
    ));

    probe.take_events();
    module.wake().unwrap();
    assert_eq!(module.panel_state(), PanelState::Idle);
    // Woken without claiming anything again
    assert!(!probe
        .events()
        .iter()
        .any(|e| matches!(e, Event::Configure(..) | Event::OpenBus)));

    module.show_pattern(Pattern::ColorBlocks).unwrap();
}

#[test]
fn init_after_exit_reacquires() {
    let (mut module, probe) = setup();
    module.init().unwrap();
    module.exit();
    probe.take_events();

    module.init().unwrap();
    let configured = probe
        .events()
        .iter()
        .filter(|e| matches!(e, Event::Configure(..)))
        .count();
    assert_eq!(configured, 5);
    assert_eq!(probe.claimed().len(), 5);
}

#[test]
fn pin_claim_failure_leaves_nothing_claimed() {
    let (mut module, probe) = setup();
    probe.fail_configure(Some(PinRole::Power));

    let err = module.init().unwrap_err();
    assert!(matches!(
        err,
        Error::Backend(BackendError::PinConfiguration {
            resource: Resource::Pin(PinRole::Power),
            ..
        })
    ));
    assert!(probe.is_released());
    assert_eq!(module.state(), ModuleState::Uninitialized);

    probe.fail_configure(None);
    module.init().unwrap();
}

#[test]
fn bus_failure_releases_pins() {
    let (mut module, probe) = setup();
    probe.fail_open_bus(true);

    assert!(matches!(
        module.init(),
        Err(Error::Backend(BackendError::PinConfiguration {
            resource: Resource::Bus,
            ..
        }))
    ));
    assert!(probe.claimed().is_empty());
}

#[test]
fn bit_bang_variant_claims_serial_lines() {
    let backend = RecordingBackend::bit_bang();
    let probe = backend.clone();
    let delay = probe.delay();
    let mut module = EpdModule::new(backend, Timing::RASPBERRY_PI, delay);

    module.init().unwrap();
    assert_eq!(probe.claimed(), PinRole::ALL.to_vec());
    module.clear(Color::Green).unwrap();
    module.exit();
    assert!(probe.is_released());
}

/// Sets the module's abort flag after a number of busy samples
struct AbortingBackend {
    inner: RecordingBackend,
    handle: Arc<OnceLock<AbortHandle>>,
    busy_reads: usize,
    abort_after: usize,
}

impl Backend for AbortingBackend {
    fn roles(&self) -> &'static [PinRole] {
        self.inner.roles()
    }

    fn configure_pin(&mut self, role: PinRole, direction: Direction) -> Result<(), BackendError> {
        self.inner.configure_pin(role, direction)
    }

    fn open_bus(&mut self) -> Result<(), BackendError> {
        self.inner.open_bus()
    }

    fn write_pin(&mut self, role: PinRole, level: Level) -> Result<(), BackendError> {
        self.inner.write_pin(role, level)
    }

    fn read_pin(&mut self, role: PinRole) -> Result<Level, BackendError> {
        if role == PinRole::Busy {
            self.busy_reads += 1;
            if self.busy_reads == self.abort_after {
                if let Some(handle) = self.handle.get() {
                    handle.abort();
                }
            }
        }
        self.inner.read_pin(role)
    }

    fn transfer(&mut self, bytes: &[u8]) -> Result<(), BackendError> {
        self.inner.transfer(bytes)
    }

    fn release(&mut self) {
        self.inner.release()
    }
}

#[test]
fn abort_during_refresh_releases_everything() {
    let inner = RecordingBackend::new();
    let probe = inner.clone();
    let slot = Arc::new(OnceLock::new());
    let backend = AbortingBackend {
        inner,
        handle: Arc::clone(&slot),
        busy_reads: 0,
        // Two reads during init, then stuck in the first refresh wait
        abort_after: 5,
    };
    let mut module = EpdModule::new(backend, Timing::RASPBERRY_PI, probe.delay());
    let _ = slot.set(module.abort_handle());

    module.init().unwrap();
    probe.set_busy(Level::Low);

    let err = module.clear(Color::Yellow).unwrap_err();
    assert!(matches!(err, Error::Aborted));
    assert_eq!(module.state(), ModuleState::Exited);
    assert!(probe.is_released());
    assert!(!module.abort_handle().is_aborted());

    // A fresh init works once the line behaves again
    probe.set_busy(Level::High);
    module.init().unwrap();
    assert_eq!(module.state(), ModuleState::Ready);
}

#[test]
fn drop_releases_resources() {
    let (mut module, probe) = setup();
    module.init().unwrap();
    drop(module);
    assert!(probe.is_released());
}
