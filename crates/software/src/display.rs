//! What the looper tells the performer, and the interface through which it does.

use crate::configuration::{ChordWindow, LooperMode};
use crate::looper::{GlobalStatus, SlotStatus};
use core::fmt;
use embassy_time::Duration;

/// A snapshot of the looper's state, as shown on the pedal's main display.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Status {
    /// Auto or Manual commit.
    pub mode: LooperMode,
    /// Whether looping slots are audible at all.
    pub global: GlobalStatus,
    /// 0-based index of the slot the controls act upon.
    pub selected_slot: usize,
    /// What the selected slot is doing.
    pub slot_status: SlotStatus,
    /// Events per cycle of the selected slot's loop; 0 when it has none.
    pub loop_length: usize,
    /// Set while a detected loop awaits acknowledgement.
    pub loop_ready: bool,
    /// How closely presses must follow each other to form a chord.
    pub chord_window: ChordWindow,
}

/// A short-lived message which temporarily replaces the status.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Notice {
    /// A loop of this many events was committed and is playing.
    Looping(usize),
    /// A loop of this many events was detected and awaits acknowledgement.
    LoopReady(usize),
    /// The recording filled the slot without ever repeating.
    TooLong,
    /// There is no loop to play.
    NoSample,
    /// This many events were written to the log.
    Dumped(usize),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Looping(length) => write!(f, "Looping [{length}]"),
            Notice::LoopReady(length) => write!(f, "Loop ok [{length}]"),
            Notice::TooLong => f.write_str("Too long"),
            Notice::NoSample => f.write_str("No sample"),
            Notice::Dumped(length) => write!(f, "Dumped [{length}]"),
        }
    }
}

/// Something the performer did, worth acknowledging with a flash.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Activity {
    /// A note arrived.
    Note,
    /// A control was operated.
    Control,
}

/// Output device for the looper's state: an LCD, a handful of LEDs, a log...
pub trait Display {
    /// Show the looper's state, replacing whatever was shown.
    fn show_status(&mut self, status: &Status);

    /// Show `notice` in place of the status for about `timeout`. The looper takes care of showing the status again once
    /// the time is up.
    fn show_transient_message(&mut self, notice: Notice, timeout: Duration);

    /// Briefly signal `activity`. Does nothing by default.
    fn blink(&mut self, _activity: Activity) {}
}
