//! Test doubles shared across modules.

use crate::display::{Activity, Display, Notice, Status};
use crate::midi::{MidiOut, NoteHandler, NoteMessage};
use embassy_time::{Duration, Instant};
use std::{vec, vec::Vec};
use wmidi::{Channel, Note, U7};

/// Collects everything written to it.
#[derive(Debug, Default)]
pub struct Recorder {
    pub bytes: Vec<u8>,
}

impl MidiOut for Recorder {
    fn write(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }
}

impl Recorder {
    /// Splits the output into 3-byte messages; only meaningful when nothing shorter was written.
    pub fn frames(&self) -> Vec<[u8; 3]> {
        self.bytes
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect()
    }

    /// Like [`Recorder::frames`], emptying the recorder.
    pub fn take_frames(&mut self) -> Vec<[u8; 3]> {
        let frames = self.frames();
        self.bytes.clear();
        frames
    }
}

/// Logs the notes it is handed, and silences them on demand.
#[derive(Debug, Default)]
pub struct NoteLog {
    pub notes: Vec<(NoteMessage, Instant)>,
    pub silence: bool,
}

impl NoteHandler for NoteLog {
    fn on_note(&mut self, note: NoteMessage, timestamp: Instant) -> bool {
        self.notes.push((note, timestamp));
        self.silence
    }
}

/// Remembers what it was asked to show.
#[derive(Debug, Default)]
pub struct DisplayLog {
    pub statuses: Vec<Status>,
    pub notices: Vec<(Notice, Duration)>,
    pub blinks: Vec<Activity>,
}

impl DisplayLog {
    pub fn last_status(&self) -> Option<Status> {
        self.statuses.last().copied()
    }

    pub fn last_notice(&self) -> Option<Notice> {
        self.notices.last().map(|&(notice, _)| notice)
    }
}

impl Display for DisplayLog {
    fn show_status(&mut self, status: &Status) {
        self.statuses.push(*status);
    }

    fn show_transient_message(&mut self, notice: Notice, timeout: Duration) {
        self.notices.push((notice, timeout));
    }

    fn blink(&mut self, activity: Activity) {
        self.blinks.push(activity);
    }
}

pub const fn ms(millis: u64) -> Instant {
    Instant::from_millis(millis)
}

pub fn on(note: Note) -> NoteMessage {
    NoteMessage::on(Channel::Ch1, note, U7::from_u8_lossy(100))
}

pub fn off(note: Note) -> NoteMessage {
    NoteMessage::off(Channel::Ch1, note)
}

/// Raw bytes of a Note On on channel 1 with velocity 100.
pub fn on_bytes(note: Note) -> Vec<u8> {
    vec![0x90, note as u8, 100]
}

/// Raw bytes of a Note On with velocity 0, i.e. a release.
pub fn off_bytes(note: Note) -> Vec<u8> {
    vec![0x90, note as u8, 0]
}
