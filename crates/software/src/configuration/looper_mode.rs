use num_derive::{FromPrimitive, ToPrimitive};

/// Determines what happens once the looper recognizes a repeated phrase.
#[derive(Debug, Default, Clone, Copy, ToPrimitive, FromPrimitive, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LooperMode {
    /// The detected loop starts playing immediately, picking up exactly where the performer is in the phrase.
    #[default]
    Auto,
    /// The detected loop is only marked as ready. The performer may keep extending the phrase (should the first candidate
    /// have been premature) and starts playback with an explicit acknowledgement.
    Manual,
}

impl LooperMode {
    /// Single-letter label for the status display.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Auto => "A",
            Self::Manual => "M",
        }
    }
}

impl super::CycleConfig for LooperMode {}
