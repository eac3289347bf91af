//! Controller subsystem for gamepad input
//!
//! Every backend fills the same [`state::ControllerState`] snapshot:
//!
//! 1. [`joystick`] - Linux joystick device polling (`/dev/input/js*`)
//! 2. [`hid`] - HID value callbacks merged into a pending snapshot (macOS IOKit)
//! 3. [`xinput`] - XInput state queries by controller index (Windows)
//!
//! # Architecture
//!
//! ```text
//! Device ──► ControllerSource::update ──► ControllerState ──► CanonicalDocument
//!            (backend specific)           (normalized)        (JSON)
//! ```
//!
//! Raw codes are translated through the tables in [`mapping`]. The backend
//! compiled into the binary is picked by target OS, see [`NativeSource`].

pub mod hid;
#[cfg(target_os = "macos")]
pub mod iokit;
pub mod joystick;
pub mod mapping;
pub mod source;
pub mod state;
pub mod xinput;

use crate::config::ControllerConfig;

pub use source::{BackendKind, ControllerSource, Lifecycle, SourceError};
pub use state::{CanonicalDocument, ControllerState};

#[cfg(all(unix, not(target_os = "macos")))]
pub type NativeSource = joystick::JoystickSource<joystick::NonBlockingOpener>;

#[cfg(target_os = "macos")]
pub type NativeSource = hid::HidSource<iokit::IoKitManager>;

#[cfg(windows)]
pub type NativeSource = xinput::XInputSource<xinput::XInputQuery>;

#[cfg(all(unix, not(target_os = "macos")))]
pub fn native_source(config: &ControllerConfig) -> NativeSource {
    joystick::JoystickSource::new(
        joystick::NonBlockingOpener,
        joystick::JoystickSettings {
            device_paths: config.device_paths.clone(),
            max_events_per_tick: config.max_events_per_tick,
        },
    )
}

#[cfg(target_os = "macos")]
pub fn native_source(_config: &ControllerConfig) -> NativeSource {
    hid::HidSource::new(iokit::IoKitManager::new())
}

#[cfg(windows)]
pub fn native_source(config: &ControllerConfig) -> NativeSource {
    xinput::XInputSource::new(xinput::XInputQuery, config.index)
}
