//! This module contains both user-configurable settings (implemented as enums) and traits to make them easier to work with in code.

mod chord_window;
pub use chord_window::*;

mod looper_mode;
pub use looper_mode::*;

use embassy_time::Duration;
use num_traits::{FromPrimitive, ToPrimitive};

/// A trait which allows infinite cycling of an enum's variants.
///
/// Useful for pushbutton user interfaces, allowing presses to advance from the current to the next variant,
/// cycling back to the beginning when all variants have been exhausted.
pub trait CycleConfig {
    /// Return the next variant, cycling back to the beginning as needed.
    fn cycle(self) -> Self
    where
        Self: FromPrimitive + ToPrimitive + Sized,
    {
        let index = self
            .to_u8()
            .expect("enum variants should be castable to u8");
        match <Self as FromPrimitive>::from_u8(index + 1) {
            Some(new_selection) => new_selection,
            None => FromPrimitive::from_u8(0).expect("enum should not be empty"),
        }
    }
}

/// Settings the looper starts up with.
///
/// Mode and chord window can be changed afterwards from the controls; the timings are fixed for the life of the device.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LooperConfig {
    /// Whether detected loops start playing on their own or wait for the performer.
    pub mode: LooperMode,
    /// How close together note presses must land to be treated as one chord.
    pub chord_window: ChordWindow,
    /// How long a transient message stays on the display before the status comes back.
    pub message_timeout: Duration,
    /// Minimum hold for a button release to count as a long press.
    pub long_press: Duration,
}

impl Default for LooperConfig {
    fn default() -> Self {
        Self {
            mode: LooperMode::default(),
            chord_window: ChordWindow::default(),
            message_timeout: Duration::from_millis(1500),
            long_press: Duration::from_millis(1000),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_derive::{FromPrimitive, ToPrimitive};

    #[derive(Debug, Clone, Copy, ToPrimitive, FromPrimitive, PartialEq)]
    enum Alpha {
        A,
        B,
        C,
    }
    impl CycleConfig for Alpha {}

    #[test]
    fn cycle() {
        let config = Alpha::A.cycle();
        assert_eq!(
            Alpha::B,
            config,
            "Should advance to next variant; expected left but got right"
        );

        let config = config.cycle();
        assert_eq!(
            Alpha::C,
            config,
            "Should advance to next variant; expected left but got right"
        );

        let config = config.cycle();
        assert_eq!(
            Alpha::A,
            config,
            "Should wrap around to first variant; expected left but got right"
        );
    }

    #[test]
    fn default_config() {
        let config = LooperConfig::default();
        assert_eq!(LooperMode::Auto, config.mode, "Expected left but got right");
        assert_eq!(
            ChordWindow::Tight,
            config.chord_window,
            "Expected left but got right"
        );
        assert_eq!(
            Duration::from_millis(1000),
            config.long_press,
            "Expected left but got right"
        );
    }
}
