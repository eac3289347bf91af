//! Synchronous state-query backend over XInput.
//!
//! Every `update()` issues one query for the whole pad. There is nothing to
//! acquire up front, so `initialize()` always succeeds.

use tracing::info;

use crate::controller::mapping::XINPUT_BUTTONS;
use crate::controller::source::{BackendKind, ControllerSource, Lifecycle, SourceError};
use crate::controller::state::ControllerState;

// Mirror of XINPUT_GAMEPAD
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GamepadReport {
    pub buttons: u16,
    pub left_trigger: u8,
    pub right_trigger: u8,
    pub thumb_lx: i16,
    pub thumb_ly: i16,
    pub thumb_rx: i16,
    pub thumb_ry: i16,
}

pub trait StateQuery {
    /// Full pad state for the given user index, `None` when the query fails.
    fn query(&mut self, index: u32) -> Option<GamepadReport>;
}

#[cfg(windows)]
#[derive(Debug, Clone, Copy, Default)]
pub struct XInputQuery;

#[cfg(windows)]
impl StateQuery for XInputQuery {
    fn query(&mut self, index: u32) -> Option<GamepadReport> {
        use windows_sys::Win32::Foundation::ERROR_SUCCESS;
        use windows_sys::Win32::UI::Input::XboxController::{XInputGetState, XINPUT_STATE};

        let mut state: XINPUT_STATE = unsafe { std::mem::zeroed() };
        if unsafe { XInputGetState(index, &mut state) } != ERROR_SUCCESS {
            return None;
        }
        let pad = state.Gamepad;
        Some(GamepadReport {
            buttons: pad.wButtons,
            left_trigger: pad.bLeftTrigger,
            right_trigger: pad.bRightTrigger,
            thumb_lx: pad.sThumbLX,
            thumb_ly: pad.sThumbLY,
            thumb_rx: pad.sThumbRX,
            thumb_ry: pad.sThumbRY,
        })
    }
}

pub struct XInputSource<Q: StateQuery> {
    query: Q,
    controller_index: u32,
    lifecycle: Lifecycle,
    state: ControllerState,
}

impl<Q: StateQuery> XInputSource<Q> {
    pub fn new(query: Q, controller_index: u32) -> Self {
        Self {
            query,
            controller_index,
            lifecycle: Lifecycle::Uninitialized,
            state: ControllerState::default(),
        }
    }

    fn apply_report(&mut self, report: GamepadReport) {
        self.state.connected = true;
        self.state.left_stick_x = report.thumb_lx;
        self.state.left_stick_y = report.thumb_ly;
        self.state.right_stick_x = report.thumb_rx;
        self.state.right_stick_y = report.thumb_ry;
        self.state.left_trigger = report.left_trigger;
        self.state.right_trigger = report.right_trigger;
        for (bit, button) in XINPUT_BUTTONS {
            self.state.set_button(button, (report.buttons & bit) != 0);
        }
    }
}

impl<Q: StateQuery> ControllerSource for XInputSource<Q> {
    fn initialize(&mut self) -> Result<(), SourceError> {
        self.lifecycle = Lifecycle::Ready;
        Ok(())
    }

    fn update(&mut self) -> bool {
        if self.lifecycle != Lifecycle::Ready {
            return false;
        }

        match self.query.query(self.controller_index) {
            Some(report) => {
                if !self.state.connected {
                    info!("Controller {} connected", self.controller_index);
                }
                self.apply_report(report);
                true
            }
            None => {
                if self.state.connected {
                    info!("Controller {} disconnected", self.controller_index);
                }
                self.state.reset();
                false
            }
        }
    }

    fn state(&self) -> &ControllerState {
        &self.state
    }

    fn backend(&self) -> BackendKind {
        BackendKind::XInput
    }
}
