use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::controller::state::ControllerState;

// Initialization failures. Disconnects during update() are not errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    #[error("No controller found at any of {candidates:?}")]
    NoDevice { candidates: Vec<PathBuf> },

    #[error("Failed to create HID manager")]
    ManagerCreate,

    #[error("Failed to open HID manager: IOReturn {0:#x}")]
    ManagerOpen(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Joystick,
    Hid,
    XInput,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Joystick => write!(f, "Linux joystick"),
            BackendKind::Hid => write!(f, "IOKit HID"),
            BackendKind::XInput => write!(f, "XInput"),
        }
    }
}

/// Where a source is in its lifecycle.
///
/// Only `initialize()` leaves `Uninitialized`. `Failed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    #[default]
    Uninitialized,
    Ready,
    Failed,
}

/// One controller read through one native input API.
///
/// Implementations own their native handle exclusively and are driven from a
/// single thread: `pump_events`, `update` and `state` are all called by the same
/// loop.
pub trait ControllerSource {
    /// Acquires the native handle. Calling it again once ready is a no-op.
    fn initialize(&mut self) -> Result<(), SourceError>;

    /// Refreshes the state from the backend. Returns false when there is nothing
    /// to publish, including when the source was never initialized.
    fn update(&mut self) -> bool;

    fn state(&self) -> &ControllerState;

    fn is_connected(&self) -> bool {
        self.state().connected
    }

    /// Runs the platform event pump for at most `timeout`. Only callback driven
    /// backends have one.
    fn pump_events(&mut self, _timeout: Duration) {}

    fn backend(&self) -> BackendKind;
}

impl<T: ControllerSource + ?Sized> ControllerSource for Box<T> {
    fn initialize(&mut self) -> Result<(), SourceError> {
        (**self).initialize()
    }

    fn update(&mut self) -> bool {
        (**self).update()
    }

    fn state(&self) -> &ControllerState {
        (**self).state()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn pump_events(&mut self, timeout: Duration) {
        (**self).pump_events(timeout)
    }

    fn backend(&self) -> BackendKind {
        (**self).backend()
    }
}
