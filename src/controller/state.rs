use serde::{Deserialize, Serialize};

// Digital inputs of the canonical state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Button {
    A,
    B,
    X,
    Y,
    LeftBumper,
    RightBumper,
    Back,
    Start,
    LeftStick,
    RightStick,
    DPadUp,
    DPadDown,
    DPadLeft,
    DPadRight,
}

// Signed stick axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    LeftStickX,
    LeftStickY,
    RightStickX,
    RightStickY,
}

// Unsigned trigger axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Trigger {
    Left,
    Right,
}

/// Canonical snapshot of one controller, independent of the backend that produced it.
///
/// `Default` is the quiescent state: disconnected, every axis at zero, every button
/// released. Fields only return to that baseline through [`ControllerState::reset`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerState {
    // Analog sticks (-32768 to 32767)
    pub left_stick_x: i16,
    pub left_stick_y: i16,
    pub right_stick_x: i16,
    pub right_stick_y: i16,

    // Triggers (0 to 255)
    pub left_trigger: u8,
    pub right_trigger: u8,

    pub button_a: bool,
    pub button_b: bool,
    pub button_x: bool,
    pub button_y: bool,
    pub button_lb: bool,
    pub button_rb: bool,
    pub button_back: bool,
    pub button_start: bool,
    pub button_left_stick: bool,
    pub button_right_stick: bool,

    pub dpad_up: bool,
    pub dpad_down: bool,
    pub dpad_left: bool,
    pub dpad_right: bool,

    pub connected: bool,
}

impl ControllerState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn set_button(&mut self, button: Button, pressed: bool) {
        *self.button_mut(button) = pressed;
    }

    pub fn is_pressed(&self, button: Button) -> bool {
        match button {
            Button::A => self.button_a,
            Button::B => self.button_b,
            Button::X => self.button_x,
            Button::Y => self.button_y,
            Button::LeftBumper => self.button_lb,
            Button::RightBumper => self.button_rb,
            Button::Back => self.button_back,
            Button::Start => self.button_start,
            Button::LeftStick => self.button_left_stick,
            Button::RightStick => self.button_right_stick,
            Button::DPadUp => self.dpad_up,
            Button::DPadDown => self.dpad_down,
            Button::DPadLeft => self.dpad_left,
            Button::DPadRight => self.dpad_right,
        }
    }

    pub fn set_axis(&mut self, axis: Axis, value: i16) {
        match axis {
            Axis::LeftStickX => self.left_stick_x = value,
            Axis::LeftStickY => self.left_stick_y = value,
            Axis::RightStickX => self.right_stick_x = value,
            Axis::RightStickY => self.right_stick_y = value,
        }
    }

    pub fn set_trigger(&mut self, trigger: Trigger, value: u8) {
        match trigger {
            Trigger::Left => self.left_trigger = value,
            Trigger::Right => self.right_trigger = value,
        }
    }

    /// Sets all four d-pad directions at once. Diagonals set two of them.
    pub fn set_dpad(&mut self, dpad: DPad) {
        self.dpad_up = dpad.up;
        self.dpad_down = dpad.down;
        self.dpad_left = dpad.left;
        self.dpad_right = dpad.right;
    }

    /// Builds the published document, stamping it with the system clock.
    pub fn to_document(&self) -> CanonicalDocument {
        self.to_document_with(&SystemClock)
    }

    pub fn to_document_with(&self, clock: &impl Clock) -> CanonicalDocument {
        CanonicalDocument {
            left_stick: StickDocument {
                x: self.left_stick_x,
                y: self.left_stick_y,
            },
            right_stick: StickDocument {
                x: self.right_stick_x,
                y: self.right_stick_y,
            },
            triggers: TriggerDocument {
                left: self.left_trigger,
                right: self.right_trigger,
            },
            buttons: ButtonDocument {
                a: self.button_a,
                b: self.button_b,
                x: self.button_x,
                y: self.button_y,
                lb: self.button_lb,
                rb: self.button_rb,
                back: self.button_back,
                start: self.button_start,
                left_stick: self.button_left_stick,
                right_stick: self.button_right_stick,
            },
            dpad: DPad {
                up: self.dpad_up,
                down: self.dpad_down,
                left: self.dpad_left,
                right: self.dpad_right,
            },
            connected: self.connected,
            timestamp: clock.now_millis(),
        }
    }

    fn button_mut(&mut self, button: Button) -> &mut bool {
        match button {
            Button::A => &mut self.button_a,
            Button::B => &mut self.button_b,
            Button::X => &mut self.button_x,
            Button::Y => &mut self.button_y,
            Button::LeftBumper => &mut self.button_lb,
            Button::RightBumper => &mut self.button_rb,
            Button::Back => &mut self.button_back,
            Button::Start => &mut self.button_start,
            Button::LeftStick => &mut self.button_left_stick,
            Button::RightStick => &mut self.button_right_stick,
            Button::DPadUp => &mut self.dpad_up,
            Button::DPadDown => &mut self.dpad_down,
            Button::DPadLeft => &mut self.dpad_left,
            Button::DPadRight => &mut self.dpad_right,
        }
    }
}

/// Wall clock used to stamp published documents.
pub trait Clock {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        // Pre-epoch clocks clamp to zero
        u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
    }
}

// Published document. Field order here is the key order on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalDocument {
    pub left_stick: StickDocument,
    pub right_stick: StickDocument,
    pub triggers: TriggerDocument,
    pub buttons: ButtonDocument,
    pub dpad: DPad,
    pub connected: bool,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StickDocument {
    pub x: i16,
    pub y: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerDocument {
    pub left: u8,
    pub right: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonDocument {
    #[serde(rename = "A")]
    pub a: bool,
    #[serde(rename = "B")]
    pub b: bool,
    #[serde(rename = "X")]
    pub x: bool,
    #[serde(rename = "Y")]
    pub y: bool,
    #[serde(rename = "LB")]
    pub lb: bool,
    #[serde(rename = "RB")]
    pub rb: bool,
    pub back: bool,
    pub start: bool,
    pub left_stick: bool,
    pub right_stick: bool,
}

// D-pad directions, also used as the decoded form of a hatswitch value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DPad {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedClock(u64);

    impl Clock for FixedClock {
        fn now_millis(&self) -> u64 {
            self.0
        }
    }

    const ALL_BUTTONS: [Button; 14] = [
        Button::A,
        Button::B,
        Button::X,
        Button::Y,
        Button::LeftBumper,
        Button::RightBumper,
        Button::Back,
        Button::Start,
        Button::LeftStick,
        Button::RightStick,
        Button::DPadUp,
        Button::DPadDown,
        Button::DPadLeft,
        Button::DPadRight,
    ];

    fn busy_state() -> ControllerState {
        let mut state = ControllerState {
            left_stick_x: -32768,
            left_stick_y: 32767,
            right_stick_x: 12,
            right_stick_y: -12,
            left_trigger: 255,
            right_trigger: 1,
            connected: true,
            ..ControllerState::default()
        };
        for button in ALL_BUTTONS {
            state.set_button(button, true);
        }
        state
    }

    #[test]
    fn reset_returns_to_baseline_and_is_idempotent() {
        let mut state = busy_state();
        state.reset();
        assert_eq!(state, ControllerState::default());
        assert!(!state.connected);
        for button in ALL_BUTTONS {
            assert!(!state.is_pressed(button), "{button:?} still pressed");
        }

        state.reset();
        assert_eq!(state, ControllerState::default());
    }

    #[test]
    fn button_setters_touch_only_their_field() {
        for button in ALL_BUTTONS {
            let mut state = ControllerState::default();
            state.set_button(button, true);
            for other in ALL_BUTTONS {
                assert_eq!(state.is_pressed(other), other == button);
            }
        }
    }

    #[test]
    fn document_has_expected_shape_and_key_order() {
        let mut state = ControllerState::default();
        state.set_axis(Axis::LeftStickX, 100);
        state.set_axis(Axis::RightStickY, -400);
        state.set_trigger(Trigger::Right, 20);
        state.set_button(Button::A, true);
        state.set_dpad(DPad {
            up: true,
            right: true,
            ..DPad::default()
        });
        state.connected = true;

        let json = serde_json::to_string(&state.to_document_with(&FixedClock(1_700_000_000_123)))
            .expect("serialize");
        assert_eq!(
            json,
            concat!(
                r#"{"left_stick":{"x":100,"y":0},"right_stick":{"x":0,"y":-400},"#,
                r#""triggers":{"left":0,"right":20},"#,
                r#""buttons":{"A":true,"B":false,"X":false,"Y":false,"LB":false,"RB":false,"#,
                r#""back":false,"start":false,"left_stick":false,"right_stick":false},"#,
                r#""dpad":{"up":true,"down":false,"left":false,"right":true},"#,
                r#""connected":true,"timestamp":1700000000123}"#
            )
        );
    }

    #[test]
    fn document_is_stable_under_a_fixed_clock() {
        let state = busy_state();
        let clock = FixedClock(42);
        let first = state.to_document_with(&clock);
        let second = state.to_document_with(&clock);
        assert_eq!(first, second);
        assert_eq!(first.timestamp, 42);
    }

    #[test]
    fn system_clock_is_after_2020() {
        assert!(state_timestamp() > 1_577_836_800_000);
    }

    fn state_timestamp() -> u64 {
        ControllerState::default().to_document().timestamp
    }
}
