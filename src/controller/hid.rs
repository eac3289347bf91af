//! Callback-driven device-matching backend.
//!
//! The native manager discovers devices by vendor/product ID and reports
//! changes through callbacks. Callbacks never touch the source's state: they
//! merge [`HidEvent`]s into a single-slot mailbox through a [`HidEventSink`],
//! and `update()` copies the merged snapshot out.
//!
//! ```text
//! device callbacks ──► HidEventSink ──► pending snapshot ──► update() ──► ControllerState
//! (pump_events)         (merge)         (Mutex)              (copy)
//! ```
//!
//! The slot holds a whole state rather than a queue, so a burst of callbacks
//! can never lose a device removal or a button release.
//!
//! Callbacks only fire while the platform event pump runs, so the driver has to
//! call [`ControllerSource::pump_events`] every tick.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, error, info};

use crate::controller::mapping::{self, UsageTarget};
use crate::controller::source::{BackendKind, ControllerSource, Lifecycle, SourceError};
use crate::controller::state::ControllerState;

pub const MICROSOFT_VENDOR_ID: u32 = 0x045e;

// Xbox 360, One, Series and Elite pads, wired and wireless
pub const XBOX_PRODUCT_IDS: [u32; 11] = [
    0x028e, 0x028f, 0x02d1, 0x02dd, 0x02e0, 0x02ea, 0x0b00, 0x0b05, 0x0b06, 0x0b12, 0x0b13,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceMatch {
    pub vendor_id: u32,
    pub product_id: u32,
}

/// Match filter for every supported Xbox controller.
pub fn xbox_device_matches() -> Vec<DeviceMatch> {
    [MICROSOFT_VENDOR_ID]
        .iter()
        .flat_map(|vendor_id| {
            XBOX_PRODUCT_IDS.iter().map(move |product_id| DeviceMatch {
                vendor_id: *vendor_id,
                product_id: *product_id,
            })
        })
        .collect()
}

// Messages produced by the native callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HidEvent {
    DeviceAdded,
    DeviceRemoved,
    InputValue { page: u32, usage: u32, value: i64 },
}

/// Producer side of the mailbox, handed to the native manager.
#[derive(Debug, Clone, Default)]
pub struct HidEventSink {
    pending: Arc<Mutex<ControllerState>>,
}

impl HidEventSink {
    pub fn push(&self, event: HidEvent) {
        merge_event(&mut self.lock(), event);
    }

    fn snapshot(&self) -> ControllerState {
        *self.lock()
    }

    // Poisoning is ignored, the snapshot is plain data
    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn merge_event(state: &mut ControllerState, event: HidEvent) {
    match event {
        HidEvent::DeviceAdded => {
            info!("Xbox controller connected");
            state.connected = true;
        }
        HidEvent::DeviceRemoved => {
            info!("Xbox controller disconnected");
            state.reset();
        }
        HidEvent::InputValue { page, usage, value } => {
            // Raw values are narrowed to the field width, no rescaling
            match mapping::hid_usage(page, usage) {
                UsageTarget::Stick(axis) => state.set_axis(axis, value as i16),
                UsageTarget::Trigger(trigger) => state.set_trigger(trigger, value as u8),
                UsageTarget::Button(button) => state.set_button(button, value != 0),
                UsageTarget::Hat => state.set_dpad(mapping::hat_directions(value)),
                UsageTarget::Unmapped => {
                    debug!("Ignoring HID usage {:#06x}:{:#06x}", page, usage)
                }
            }
        }
    }
}

/// Native device manager behind the HID backend.
pub trait HidManager {
    /// Registers the match filter and callbacks, opens the manager and schedules
    /// it on the current thread's event loop.
    fn open(&mut self, matches: &[DeviceMatch], sink: HidEventSink) -> Result<(), SourceError>;

    /// Runs the event loop for at most `timeout`, firing pending callbacks.
    fn pump(&mut self, timeout: Duration);
}

pub struct HidSource<M: HidManager> {
    manager: M,
    mailbox: Option<HidEventSink>,
    lifecycle: Lifecycle,
    failure: Option<SourceError>,
    state: ControllerState,
}

impl<M: HidManager> HidSource<M> {
    pub fn new(manager: M) -> Self {
        Self {
            manager,
            mailbox: None,
            lifecycle: Lifecycle::Uninitialized,
            failure: None,
            state: ControllerState::default(),
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }
}

impl<M: HidManager> ControllerSource for HidSource<M> {
    fn initialize(&mut self) -> Result<(), SourceError> {
        match self.lifecycle {
            Lifecycle::Ready => return Ok(()),
            Lifecycle::Failed => {
                return Err(self.failure.clone().unwrap_or(SourceError::ManagerCreate))
            }
            Lifecycle::Uninitialized => {}
        }

        let mailbox = HidEventSink::default();
        let matches = xbox_device_matches();
        debug!("Registering {} HID match entries", matches.len());

        match self.manager.open(&matches, mailbox.clone()) {
            Ok(()) => {
                info!("HID manager initialized for Xbox controllers");
                self.mailbox = Some(mailbox);
                self.lifecycle = Lifecycle::Ready;
                Ok(())
            }
            Err(e) => {
                error!("{}", e);
                self.lifecycle = Lifecycle::Failed;
                self.failure = Some(e.clone());
                Err(e)
            }
        }
    }

    fn update(&mut self) -> bool {
        let Some(mailbox) = &self.mailbox else {
            return false;
        };
        self.state = mailbox.snapshot();
        self.state.connected
    }

    fn state(&self) -> &ControllerState {
        &self.state
    }

    fn pump_events(&mut self, timeout: Duration) {
        if self.lifecycle == Lifecycle::Ready {
            self.manager.pump(timeout);
        }
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Hid
    }
}
