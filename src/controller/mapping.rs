//! Static lookup tables from raw backend codes to canonical state fields.
//!
//! Every backend resolves its raw inputs here. Codes with no canonical
//! counterpart resolve to an explicit `Unmapped` case instead of being dropped
//! silently, so gaps like the missing d-pad on the joystick backend are visible
//! in the tables themselves.

use crate::controller::state::{Axis, Button, DPad, Trigger};

// ---- Linux joystick API -------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisTarget {
    Stick(Axis),
    // Signed axis rescaled onto 0..=255
    Trigger(Trigger),
    Unmapped,
}

/// Joystick axis numbers as reported by the xpad driver.
pub const JOYSTICK_AXES: [AxisTarget; 8] = [
    AxisTarget::Stick(Axis::LeftStickX),
    AxisTarget::Stick(Axis::LeftStickY),
    AxisTarget::Trigger(Trigger::Left),
    AxisTarget::Stick(Axis::RightStickX),
    AxisTarget::Stick(Axis::RightStickY),
    AxisTarget::Trigger(Trigger::Right),
    // Hat X/Y. Not decoded on this backend.
    AxisTarget::Unmapped,
    AxisTarget::Unmapped,
];

pub const JOYSTICK_BUTTONS: [Button; 10] = [
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
];

pub fn joystick_axis(number: u8) -> AxisTarget {
    JOYSTICK_AXES
        .get(usize::from(number))
        .copied()
        .unwrap_or(AxisTarget::Unmapped)
}

pub fn joystick_button(number: u8) -> Option<Button> {
    JOYSTICK_BUTTONS.get(usize::from(number)).copied()
}

/// Maps a signed joystick axis onto the trigger byte with `(raw + 32768) / 256`.
///
/// Not clamped: over the `i16` domain the result spans exactly `0..=255`.
pub fn trigger_from_axis(raw: i16) -> u8 {
    ((i32::from(raw) + 32768) / 256) as u8
}

// ---- HID usage tables ---------------------------------------------------------

pub const PAGE_GENERIC_DESKTOP: u32 = 0x01;
pub const PAGE_SIMULATION: u32 = 0x02;
pub const PAGE_BUTTON: u32 = 0x09;

pub const USAGE_GD_X: u32 = 0x30;
pub const USAGE_GD_Y: u32 = 0x31;
pub const USAGE_GD_Z: u32 = 0x32;
pub const USAGE_GD_RZ: u32 = 0x35;
pub const USAGE_GD_HATSWITCH: u32 = 0x39;
pub const USAGE_SIM_ACCELERATOR: u32 = 0xC4;
pub const USAGE_SIM_BRAKE: u32 = 0xC5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageTarget {
    Stick(Axis),
    Hat,
    Button(Button),
    // Raw passthrough, no rescaling
    Trigger(Trigger),
    Unmapped,
}

const GENERIC_DESKTOP_USAGES: [(u32, UsageTarget); 5] = [
    (USAGE_GD_X, UsageTarget::Stick(Axis::LeftStickX)),
    (USAGE_GD_Y, UsageTarget::Stick(Axis::LeftStickY)),
    (USAGE_GD_Z, UsageTarget::Stick(Axis::RightStickX)),
    (USAGE_GD_RZ, UsageTarget::Stick(Axis::RightStickY)),
    (USAGE_GD_HATSWITCH, UsageTarget::Hat),
];

const SIMULATION_USAGES: [(u32, UsageTarget); 2] = [
    (USAGE_SIM_ACCELERATOR, UsageTarget::Trigger(Trigger::Right)),
    (USAGE_SIM_BRAKE, UsageTarget::Trigger(Trigger::Left)),
];

// Button page usages are 1-based
pub const HID_BUTTONS: [Button; 10] = JOYSTICK_BUTTONS;

pub fn hid_usage(page: u32, usage: u32) -> UsageTarget {
    let lookup = |table: &[(u32, UsageTarget)]| {
        table
            .iter()
            .find(|(code, _)| *code == usage)
            .map(|(_, target)| *target)
            .unwrap_or(UsageTarget::Unmapped)
    };

    match page {
        PAGE_GENERIC_DESKTOP => lookup(&GENERIC_DESKTOP_USAGES),
        PAGE_SIMULATION => lookup(&SIMULATION_USAGES),
        PAGE_BUTTON => usage
            .checked_sub(1)
            .and_then(|index| HID_BUTTONS.get(index as usize))
            .map(|button| UsageTarget::Button(*button))
            .unwrap_or(UsageTarget::Unmapped),
        _ => UsageTarget::Unmapped,
    }
}

/// Decodes an 8-direction compass hatswitch value, 0 being north and counting clockwise.
///
/// Values outside `0..=7` (the centered or null state) release all four directions.
pub fn hat_directions(value: i64) -> DPad {
    if !(0..=7).contains(&value) {
        return DPad::default();
    }
    DPad {
        up: matches!(value, 0 | 1 | 7),
        right: matches!(value, 1..=3),
        down: matches!(value, 3..=5),
        left: matches!(value, 5..=7),
    }
}

// ---- XInput -------------------------------------------------------------------

pub const XINPUT_BUTTONS: [(u16, Button); 14] = [
    (0x0001, Button::DPadUp),
    (0x0002, Button::DPadDown),
    (0x0004, Button::DPadLeft),
    (0x0008, Button::DPadRight),
    (0x0010, Button::Start),
    (0x0020, Button::Back),
    (0x0040, Button::LeftStick),
    (0x0080, Button::RightStick),
    (0x0100, Button::LeftBumper),
    (0x0200, Button::RightBumper),
    (0x1000, Button::A),
    (0x2000, Button::B),
    (0x4000, Button::X),
    (0x8000, Button::Y),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_formula_at_domain_extremes() {
        assert_eq!(trigger_from_axis(i16::MIN), 0);
        assert_eq!(trigger_from_axis(i16::MAX), 255);
        assert_eq!(trigger_from_axis(0), 128);
        assert_eq!(trigger_from_axis(-256), 127);
        assert_eq!(trigger_from_axis(-32767), 0);
    }

    #[test]
    fn joystick_axes_follow_xpad_layout() {
        assert_eq!(joystick_axis(0), AxisTarget::Stick(Axis::LeftStickX));
        assert_eq!(joystick_axis(1), AxisTarget::Stick(Axis::LeftStickY));
        assert_eq!(joystick_axis(2), AxisTarget::Trigger(Trigger::Left));
        assert_eq!(joystick_axis(3), AxisTarget::Stick(Axis::RightStickX));
        assert_eq!(joystick_axis(4), AxisTarget::Stick(Axis::RightStickY));
        assert_eq!(joystick_axis(5), AxisTarget::Trigger(Trigger::Right));
        assert_eq!(joystick_axis(6), AxisTarget::Unmapped);
        assert_eq!(joystick_axis(7), AxisTarget::Unmapped);
        assert_eq!(joystick_axis(200), AxisTarget::Unmapped);
    }

    #[test]
    fn joystick_buttons_stop_at_ten() {
        assert_eq!(joystick_button(0), Some(Button::A));
        assert_eq!(joystick_button(7), Some(Button::Start));
        assert_eq!(joystick_button(9), Some(Button::RightStick));
        assert_eq!(joystick_button(10), None);
        assert_eq!(joystick_button(255), None);
    }

    #[test]
    fn hat_table_matches_compass() {
        let expected = [
            // (up, down, left, right)
            (true, false, false, false),
            (true, false, false, true),
            (false, false, false, true),
            (false, true, false, true),
            (false, true, false, false),
            (false, true, true, false),
            (false, false, true, false),
            (true, false, true, false),
        ];
        for (value, (up, down, left, right)) in expected.into_iter().enumerate() {
            let dpad = hat_directions(value as i64);
            assert_eq!(
                (dpad.up, dpad.down, dpad.left, dpad.right),
                (up, down, left, right),
                "hat value {value}"
            );
        }
    }

    #[test]
    fn hat_outside_compass_is_released() {
        for value in [-1, 8, 15, 0xFF, i64::MAX] {
            assert_eq!(hat_directions(value), DPad::default(), "hat value {value}");
        }
    }

    #[test]
    fn hid_usages_resolve_by_page() {
        assert_eq!(
            hid_usage(PAGE_GENERIC_DESKTOP, USAGE_GD_Z),
            UsageTarget::Stick(Axis::RightStickX)
        );
        assert_eq!(
            hid_usage(PAGE_GENERIC_DESKTOP, USAGE_GD_HATSWITCH),
            UsageTarget::Hat
        );
        assert_eq!(
            hid_usage(PAGE_SIMULATION, USAGE_SIM_BRAKE),
            UsageTarget::Trigger(Trigger::Left)
        );
        assert_eq!(hid_usage(PAGE_BUTTON, 1), UsageTarget::Button(Button::A));
        assert_eq!(
            hid_usage(PAGE_BUTTON, 10),
            UsageTarget::Button(Button::RightStick)
        );
        assert_eq!(hid_usage(PAGE_BUTTON, 0), UsageTarget::Unmapped);
        assert_eq!(hid_usage(PAGE_BUTTON, 11), UsageTarget::Unmapped);
        // Rx lives on generic desktop but is not part of the layout
        assert_eq!(hid_usage(PAGE_GENERIC_DESKTOP, 0x33), UsageTarget::Unmapped);
        assert_eq!(hid_usage(0xFF00, 1), UsageTarget::Unmapped);
    }

    #[test]
    fn xinput_bits_are_distinct() {
        let mut seen = 0u16;
        for (bit, _) in XINPUT_BUTTONS {
            assert_eq!(bit.count_ones(), 1);
            assert_eq!(seen & bit, 0);
            seen |= bit;
        }
    }
}
