use embassy_time::Duration;
use num_derive::{FromPrimitive, ToPrimitive};

/// Determines how close together two note presses must land for the looper to treat them as a single chord.
///
/// Performers rarely strike every key of a chord at exactly the same moment, and they rarely strike them in the same
/// order twice. Notes recorded within the window are grouped, so that when the looper compares a phrase against its
/// repetition, a chord counts as one unit regardless of which of its keys happened to land first.
///
/// Setting the window too wide merges quick runs into chords; setting it to [`ChordWindow::Off`] makes every note its
/// own unit, which is the right choice when recording from a sequencer.
#[derive(Debug, Default, Clone, Copy, ToPrimitive, FromPrimitive, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChordWindow {
    /// Disables chord grouping.
    Off,
    /// Groups notes landing within 10ms of each other.
    #[default]
    Tight,
    /// Groups notes landing within 30ms of each other; forgiving of a sloppy hand.
    Loose,
}

impl ChordWindow {
    /// Return the width of the window in a format compatible with Embassy's timekeeping API.
    pub fn duration(&self) -> Duration {
        match self {
            Self::Off => Duration::from_millis(0),
            Self::Tight => Duration::from_millis(10),
            Self::Loose => Duration::from_millis(30),
        }
    }
}

impl super::CycleConfig for ChordWindow {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::CycleConfig;

    #[test]
    fn off_is_zero_wide() {
        assert_eq!(
            Duration::from_millis(0),
            ChordWindow::Off.duration(),
            "Expected left but got right"
        );
    }

    #[test]
    fn cycles_back_to_off() {
        assert_eq!(
            ChordWindow::Off,
            ChordWindow::Loose.cycle(),
            "Expected left but got right"
        );
    }
}
