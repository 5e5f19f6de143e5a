//! Provides the [`Decoder`], which turns a raw MIDI byte stream (as delivered by a 31250 baud serial port) into complete
//! commands, honoring the "running status" convention.

use super::{MidiOut, NoteHandler, NoteMessage};
use embassy_time::Instant;
use wmidi::MidiMessage;

/// Number of data bytes carried by a channel message, keyed by the status nibble.
fn channel_data_bytes(kind: u8) -> u8 {
    match kind {
        // Note Off, Note On, Poly Pressure, Control Change, Pitch Bend
        0x8 | 0x9 | 0xA | 0xB | 0xE => 2,
        // Program Change, Channel Pressure
        0xC | 0xD => 1,
        _ => 0,
    }
}

/// Parse state for one channel message whose data bytes are still arriving.
///
/// Lives only for the duration of one message; it is replaced by the next status byte or dropped when the message
/// completes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RawMidiCommand {
    /// Status byte followed by up to two data bytes.
    frame: [u8; 3],
    /// Data bytes still expected.
    pending: u8,
    /// Data bytes read so far.
    read: u8,
}

impl RawMidiCommand {
    fn new(status: u8) -> Self {
        Self {
            frame: [status, 0, 0],
            pending: channel_data_bytes(status >> 4),
            read: 0,
        }
    }

    /// The message kind, i.e., the top nibble of the status byte (0x8 to 0xE).
    pub fn kind(&self) -> u8 {
        self.frame[0] >> 4
    }

    /// The channel index (0 to 15), i.e., the bottom nibble of the status byte.
    pub fn channel(&self) -> u8 {
        self.frame[0] & 0x0F
    }

    /// The data bytes read so far.
    pub fn data(&self) -> &[u8] {
        &self.frame[1..1 + usize::from(self.read)]
    }

    /// Returns `true` once every expected data byte has been read.
    pub fn is_complete(&self) -> bool {
        self.pending == 0
    }

    /// The command as it would appear on the wire, status byte included.
    pub fn bytes(&self) -> &[u8] {
        &self.frame[..1 + usize::from(self.read)]
    }

    fn push(&mut self, byte: u8) {
        self.frame[1 + usize::from(self.read)] = byte;
        self.read += 1;
        self.pending -= 1;
    }
}

/// What the decoder is in the middle of.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Pending {
    Nothing,
    Channel(RawMidiCommand),
    /// A System Common message; its data bytes are forwarded as they arrive.
    SystemCommon { remaining: u8 },
    /// System Exclusive; everything is forwarded until End of Exclusive.
    SysEx,
}

/// Byte-at-a-time MIDI stream decoder.
///
/// Channel messages are assembled in full and then either handed to a [`NoteHandler`] (Note On/Off) or echoed to the
/// output verbatim (everything else). System messages are not decoded at all: they are passed straight through while
/// their length is tracked, so they cannot knock the parser out of step. Realtime bytes may arrive in the middle of
/// another message and never disturb it.
///
/// Bytes that cannot be attributed to any message (data bytes before any status has ever been seen, or after a System
/// message cancelled running status) are dropped.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Decoder {
    pending: Pending,
    /// Status of the last completed channel message, reused when a data byte arrives without one.
    running: Option<u8>,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    /// Construct a `Decoder` with no status established.
    pub const fn new() -> Self {
        Self {
            pending: Pending::Nothing,
            running: None,
        }
    }

    /// The channel message currently being assembled, if any.
    pub fn current(&self) -> Option<&RawMidiCommand> {
        match &self.pending {
            Pending::Channel(command) => Some(command),
            _ => None,
        }
    }

    /// Consume one byte received at `timestamp`.
    ///
    /// Produces at most one of: a call to `handler`, bytes written to `out`, or nothing (the byte was buffered or dropped).
    pub fn feed<H, O>(&mut self, byte: u8, timestamp: Instant, handler: &mut H, out: &mut O)
    where
        H: NoteHandler + ?Sized,
        O: MidiOut + ?Sized,
    {
        if byte & 0x80 != 0 {
            self.read_status(byte, out);
        } else {
            self.read_data(byte, timestamp, handler, out);
        }
    }

    fn read_status<O: MidiOut + ?Sized>(&mut self, status: u8, out: &mut O) {
        match status {
            0x80..=0xEF => {
                if let Pending::Channel(superseded) = self.pending {
                    debug!(
                        "Incomplete command {=u8:#x} superseded by new status {=u8:#x}",
                        superseded.frame[0],
                        status
                    );
                }
                self.pending = Pending::Channel(RawMidiCommand::new(status));
            }
            // System Realtime: single byte, may interleave with anything
            0xF8 | 0xFA | 0xFB | 0xFC | 0xFE | 0xFF => out.write(&[status]),
            0xF9 | 0xFD => {
                warn!("Undefined realtime status {=u8:#x}", status);
                out.write(&[status]);
            }
            // System Common cancels running status
            0xF0 => {
                self.running = None;
                self.pending = Pending::SysEx;
                out.write(&[status]);
            }
            0xF1 | 0xF3 => self.start_system_common(status, 1, out),
            0xF2 => self.start_system_common(status, 2, out),
            0xF6 | 0xF7 => self.start_system_common(status, 0, out),
            _ => {
                warn!(
                    "Undefined status {=u8:#x}, treating it as a command without data",
                    status
                );
                self.start_system_common(status, 0, out);
            }
        }
    }

    fn start_system_common<O: MidiOut + ?Sized>(&mut self, status: u8, data_bytes: u8, out: &mut O) {
        self.running = None;
        self.pending = match data_bytes {
            0 => Pending::Nothing,
            remaining => Pending::SystemCommon { remaining },
        };
        out.write(&[status]);
    }

    fn read_data<H, O>(&mut self, byte: u8, timestamp: Instant, handler: &mut H, out: &mut O)
    where
        H: NoteHandler + ?Sized,
        O: MidiOut + ?Sized,
    {
        match self.pending {
            Pending::Channel(mut command) => {
                command.push(byte);
                if command.is_complete() {
                    self.pending = Pending::Nothing;
                    self.complete(command, timestamp, handler, out);
                } else {
                    self.pending = Pending::Channel(command);
                }
            }
            Pending::SystemCommon { remaining } => {
                out.write(&[byte]);
                self.pending = match remaining - 1 {
                    0 => Pending::Nothing,
                    remaining => Pending::SystemCommon { remaining },
                };
            }
            Pending::SysEx => out.write(&[byte]),
            Pending::Nothing => match self.running {
                Some(status) => {
                    let mut command = RawMidiCommand::new(status);
                    command.push(byte);
                    if command.is_complete() {
                        self.complete(command, timestamp, handler, out);
                    } else {
                        self.pending = Pending::Channel(command);
                    }
                }
                None => trace!("Dropping data byte {=u8:#x} without status", byte),
            },
        }
    }

    fn complete<H, O>(
        &mut self,
        command: RawMidiCommand,
        timestamp: Instant,
        handler: &mut H,
        out: &mut O,
    ) where
        H: NoteHandler + ?Sized,
        O: MidiOut + ?Sized,
    {
        self.running = Some(command.frame[0]);

        let note = match MidiMessage::from_bytes(command.bytes()) {
            Ok(MidiMessage::NoteOn(channel, note, velocity)) => {
                Some(NoteMessage::on(channel, note, velocity))
            }
            Ok(MidiMessage::NoteOff(channel, note, _)) => Some(NoteMessage::off(channel, note)),
            Ok(_) => None,
            Err(_) => {
                warn!("Could not interpret command {=[u8]:#x}", command.bytes());
                None
            }
        };

        let silent = match note {
            Some(note) => handler.on_note(note, timestamp),
            None => false,
        };
        if !silent {
            out.write(command.bytes());
        }
    }
}
