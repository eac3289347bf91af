//! Descriptor-polling backend over the Linux joystick API (`/dev/input/jsN`).
//!
//! The device node is opened non-blocking and drained on every `update()`.
//! Each read yields one fixed-size `js_event`; button and axis events are
//! resolved through [`crate::controller::mapping`].

use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::controller::mapping::{self, AxisTarget};
use crate::controller::source::{BackendKind, ControllerSource, Lifecycle, SourceError};
use crate::controller::state::ControllerState;

pub const JS_EVENT_BUTTON: u8 = 0x01;
pub const JS_EVENT_AXIS: u8 = 0x02;
// Synthetic events describing the initial state right after open
pub const JS_EVENT_INIT: u8 = 0x80;
pub const JS_EVENT_SIZE: usize = 8;

/// Opens device nodes for the joystick backend.
pub trait DeviceOpener {
    type Device: Read;

    fn open(&self, path: &Path) -> io::Result<Self::Device>;
}

// Read-only, O_NONBLOCK
#[cfg(unix)]
#[derive(Debug, Clone, Copy, Default)]
pub struct NonBlockingOpener;

#[cfg(unix)]
impl DeviceOpener for NonBlockingOpener {
    type Device = std::fs::File;

    fn open(&self, path: &Path) -> io::Result<Self::Device> {
        use std::os::unix::fs::OpenOptionsExt;

        std::fs::OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
    }
}

// Layout of `struct js_event` from linux/joystick.h
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsEvent {
    pub time_ms: u32,
    pub value: i16,
    pub kind: u8,
    pub number: u8,
}

impl JsEvent {
    pub fn from_bytes(buf: [u8; JS_EVENT_SIZE]) -> Self {
        Self {
            time_ms: u32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]]),
            value: i16::from_ne_bytes([buf[4], buf[5]]),
            kind: buf[6],
            number: buf[7],
        }
    }

    pub fn to_bytes(self) -> [u8; JS_EVENT_SIZE] {
        let mut buf = [0u8; JS_EVENT_SIZE];
        buf[..4].copy_from_slice(&self.time_ms.to_ne_bytes());
        buf[4..6].copy_from_slice(&self.value.to_ne_bytes());
        buf[6] = self.kind;
        buf[7] = self.number;
        buf
    }
}

#[derive(Clone, Debug)]
pub struct JoystickSettings {
    // Probed in order, first successful open wins
    pub device_paths: Vec<PathBuf>,
    pub max_events_per_tick: usize,
}

impl Default for JoystickSettings {
    fn default() -> Self {
        Self {
            device_paths: vec![PathBuf::from("/dev/input/js0")],
            max_events_per_tick: 64,
        }
    }
}

enum ReadOutcome {
    Event(JsEvent),
    Drained,
    Failed(io::Error),
}

pub struct JoystickSource<O: DeviceOpener> {
    opener: O,
    settings: JoystickSettings,
    device: Option<O::Device>,
    device_path: Option<PathBuf>,
    lifecycle: Lifecycle,
    state: ControllerState,
    read_error_reported: bool,
}

impl<O: DeviceOpener> JoystickSource<O> {
    pub fn new(opener: O, settings: JoystickSettings) -> Self {
        Self {
            opener,
            settings,
            device: None,
            device_path: None,
            lifecycle: Lifecycle::Uninitialized,
            state: ControllerState::default(),
            read_error_reported: false,
        }
    }

    pub fn device_path(&self) -> Option<&Path> {
        self.device_path.as_deref()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn no_device(&self) -> SourceError {
        SourceError::NoDevice {
            candidates: self.settings.device_paths.clone(),
        }
    }

    fn read_event(device: &mut O::Device) -> ReadOutcome {
        let mut buf = [0u8; JS_EVENT_SIZE];
        loop {
            match device.read(&mut buf) {
                Ok(JS_EVENT_SIZE) => return ReadOutcome::Event(JsEvent::from_bytes(buf)),
                Ok(0) => return ReadOutcome::Drained,
                Ok(n) => {
                    warn!("Discarding short joystick read of {} bytes", n);
                    return ReadOutcome::Drained;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return ReadOutcome::Drained,
                Err(e) => return ReadOutcome::Failed(e),
            }
        }
    }

    fn apply_event(&mut self, event: JsEvent) {
        match event.kind & !JS_EVENT_INIT {
            JS_EVENT_BUTTON => match mapping::joystick_button(event.number) {
                Some(button) => self.state.set_button(button, event.value != 0),
                None => debug!("Ignoring unmapped joystick button {}", event.number),
            },
            JS_EVENT_AXIS => match mapping::joystick_axis(event.number) {
                AxisTarget::Stick(axis) => self.state.set_axis(axis, event.value),
                AxisTarget::Trigger(trigger) => self
                    .state
                    .set_trigger(trigger, mapping::trigger_from_axis(event.value)),
                AxisTarget::Unmapped => {
                    debug!("Ignoring unmapped joystick axis {}", event.number)
                }
            },
            other => debug!("Ignoring joystick event of type {:#04x}", other),
        }
    }
}

impl<O: DeviceOpener> ControllerSource for JoystickSource<O> {
    fn initialize(&mut self) -> Result<(), SourceError> {
        match self.lifecycle {
            Lifecycle::Ready => return Ok(()),
            Lifecycle::Failed => return Err(self.no_device()),
            Lifecycle::Uninitialized => {}
        }

        for path in &self.settings.device_paths {
            match self.opener.open(path) {
                Ok(device) => {
                    info!("Found controller at: {}", path.display());
                    self.device = Some(device);
                    self.device_path = Some(path.clone());
                    self.state.connected = true;
                    self.lifecycle = Lifecycle::Ready;
                    return Ok(());
                }
                Err(e) => debug!("Could not open {}: {}", path.display(), e),
            }
        }

        error!(
            "No controller found at any of {:?}",
            self.settings.device_paths
        );
        self.lifecycle = Lifecycle::Failed;
        Err(self.no_device())
    }

    fn update(&mut self) -> bool {
        let Some(mut device) = self.device.take() else {
            self.state.connected = false;
            return false;
        };

        let mut drained = 0;
        while drained < self.settings.max_events_per_tick {
            match Self::read_event(&mut device) {
                ReadOutcome::Event(event) => {
                    self.apply_event(event);
                    drained += 1;
                }
                ReadOutcome::Drained => break,
                ReadOutcome::Failed(e) => {
                    // A vanished node is not treated as a disconnect
                    if !self.read_error_reported {
                        warn!("Joystick read failed: {}", e);
                        self.read_error_reported = true;
                    }
                    break;
                }
            }
        }
        if drained == self.settings.max_events_per_tick {
            debug!(
                "Drained {} joystick events, leaving the rest for the next tick",
                drained
            );
        }

        self.device = Some(device);
        true
    }

    fn state(&self) -> &ControllerState {
        &self.state
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Joystick
    }
}
