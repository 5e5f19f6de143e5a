//! This crate contains the architecture-agnostic logic of the MOOPZ, a MIDI loop-recording pedal. The pedal sits in a
//! [MIDI](https://midi.org/midi-1-0) signal path, listens for a phrase the performer repeats, and then keeps replaying that
//! phrase on its own while the performer plays over it. Up to [`DEFAULT_SLOT_COUNT`] phrases can loop at once, each in an
//! independently controlled slot.
//!
//! Nothing here touches hardware. Bytes arrive through [`midi::Decoder`], time is passed in explicitly as
//! [`Instant`]s, output leaves through the [`midi::MidiOut`] trait and user feedback through the
//! [`display::Display`] trait. The firmware crate supplies the implementations of those seams.

#![deny(missing_docs)]
#![no_std]

#[cfg(test)]
extern crate std;

// must stay first so the logging macros are visible to the modules below
#[macro_use]
mod fmt;

pub mod configuration;
pub mod controls;
pub mod display;
pub mod looper;
pub mod midi;

#[cfg(test)]
mod testutil;

pub use embassy_time::{Duration, Instant};
pub use looper::DEFAULT_SLOT_COUNT;
