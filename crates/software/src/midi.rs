//! MIDI plumbing shared by the looper: the byte-stream [`Decoder`], the [`MidiOut`] seam through which every outgoing byte
//! leaves, and helpers which build the few messages the looper generates on its own.

mod decoder;
pub use decoder::*;

use embassy_time::Instant;
use wmidi::{Channel, ControlFunction, MidiMessage, Note, U7};

/// Velocity used for generated Note Off messages and for the value of All Notes Off.
const ZERO: U7 = U7::from_u8_lossy(0);

/// A destination for raw MIDI bytes, e.g., a serial port's transmit buffer.
///
/// Writing is best effort. The looper sits in a live signal path and must keep servicing input no matter what happens
/// downstream, so implementations swallow (and ideally log) their own failures rather than reporting them back.
pub trait MidiOut {
    /// Queue `bytes` for transmission, preserving order.
    fn write(&mut self, bytes: &[u8]);
}

/// A completed Note On or Note Off, normalized so that a velocity of zero always means "off".
///
/// MIDI allows a note to be released either with a Note Off message or with a Note On carrying velocity 0; the
/// [`Decoder`] folds both into this one shape.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoteMessage {
    /// Channel the message was received on.
    pub channel: Channel,
    /// Pitch of the note.
    pub note: Note,
    /// Strike velocity; 0 for a release.
    pub velocity: U7,
}

impl NoteMessage {
    /// Construct a Note On; a `velocity` of 0 yields a release.
    pub fn on(channel: Channel, note: Note, velocity: U7) -> Self {
        Self {
            channel,
            note,
            velocity,
        }
    }

    /// Construct a release.
    pub fn off(channel: Channel, note: Note) -> Self {
        Self::on(channel, note, ZERO)
    }

    /// Returns `true` if this message releases the note.
    pub fn is_off(&self) -> bool {
        u8::from(self.velocity) == 0
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for NoteMessage {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "NoteMessage {{ channel: {}, note: {} ({}), velocity: {} }}",
            self.channel.number(),
            self.note.to_str(),
            u8::from(self.note),
            u8::from(self.velocity)
        );
    }
}

/// Receives the notes completed by the [`Decoder`].
///
/// There is exactly one implementation in practice (the [looper](`crate::looper::Looper`)), but keeping the seam a trait
/// lets the decoder be exercised on its own.
pub trait NoteHandler {
    /// Handle a note received at `timestamp`. Returns `true` if the message should be kept off the output ("silent"),
    /// meaning the handler has taken responsibility for emitting or withholding it; `false` echoes it unchanged.
    fn on_note(&mut self, note: NoteMessage, timestamp: Instant) -> bool;
}

/// Serialize `message` into `out`.
pub fn send<O: MidiOut + ?Sized>(out: &mut O, message: &MidiMessage<'_>) {
    let mut frame = [0_u8; 3];
    match message.copy_to_slice(&mut frame) {
        Ok(len) => out.write(&frame[..len]),
        Err(_) => error!("Generated MIDI message does not fit in a three-byte frame"),
    }
}

/// Send a Note On.
pub fn note_on<O: MidiOut + ?Sized>(out: &mut O, channel: Channel, note: Note, velocity: U7) {
    send(out, &MidiMessage::NoteOn(channel, note, velocity));
}

/// Send a Note Off with a release velocity of 0.
pub fn note_off<O: MidiOut + ?Sized>(out: &mut O, channel: Channel, note: Note) {
    send(out, &MidiMessage::NoteOff(channel, note, ZERO));
}

/// Send an All Notes Off (CC 123) so that nothing keeps ringing on `channel`.
pub fn all_notes_off<O: MidiOut + ?Sized>(out: &mut O, channel: Channel) {
    send(
        out,
        &MidiMessage::ControlChange(channel, ControlFunction::ALL_NOTES_OFF, ZERO),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::Recorder;

    #[test]
    fn builds_note_on() {
        let mut out = Recorder::default();
        note_on(&mut out, Channel::Ch2, Note::C4, U7::from_u8_lossy(100));
        assert_eq!(
            &[0x91, 60, 100][..],
            &out.bytes[..],
            "Expected left but got right"
        );
    }

    #[test]
    fn builds_note_off() {
        let mut out = Recorder::default();
        note_off(&mut out, Channel::Ch1, Note::E4);
        assert_eq!(&[0x80, 64, 0][..], &out.bytes[..], "Expected left but got right");
    }

    #[test]
    fn builds_all_notes_off() {
        let mut out = Recorder::default();
        all_notes_off(&mut out, Channel::Ch10);
        assert_eq!(&[0xB9, 123, 0][..], &out.bytes[..], "Expected left but got right");
    }

    #[test]
    fn zero_velocity_is_off() {
        assert!(NoteMessage::off(Channel::Ch1, Note::C4).is_off());
        assert!(NoteMessage::on(Channel::Ch1, Note::C4, U7::from_u8_lossy(0)).is_off());
        assert!(!NoteMessage::on(Channel::Ch1, Note::C4, U7::from_u8_lossy(1)).is_off());
    }
}
