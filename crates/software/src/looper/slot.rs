//! Provides [`LoopSlot`], one independently recorded and replayed track, and [`NoteEvent`], the unit it stores.

use super::{Detection, ReplayCursor, Resume};
use crate::midi::NoteMessage;
use embassy_time::{Duration, Instant};
use tinyvec::ArrayVec;
use wmidi::{Channel, Note, U7};

/// Number of events a slot can hold. A note takes two (press and release), so this is room for 32 notes.
pub const SLOT_CAPACITY: usize = 64;

/// Converts a span to whole milliseconds, saturating rather than wrapping for (absurdly) long recordings.
pub(crate) fn millis(span: Duration) -> u32 {
    u32::try_from(span.as_millis()).unwrap_or(u32::MAX)
}

/// One recorded Note On or Note Off.
///
/// Internally, this struct uses the [`U7`] type because [`tinyvec`] requires that `Items` implement [`Default`].
/// However, [`U7`] can be a bit unwieldy, so public interfaces will deal with the related [`Note`] type instead.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NoteEvent {
    /// Milliseconds since the first event of the recording.
    pub(crate) offset: u32,
    pub(crate) note: U7,
    /// 0 for a release.
    pub(crate) velocity: U7,
    /// Milliseconds until the matching release; 0 while the note is still held (and always 0 for a release).
    pub(crate) duration: u32,
    /// Set when this press joined the chord started by an earlier press at the same offset.
    pub(crate) chord: bool,
}

impl NoteEvent {
    pub(crate) fn press(offset: u32, note: Note, velocity: U7) -> Self {
        Self {
            offset,
            note: U7::from_u8_lossy(note as u8),
            velocity,
            duration: 0,
            chord: false,
        }
    }

    pub(crate) fn release(offset: u32, note: Note) -> Self {
        Self {
            offset,
            note: U7::from_u8_lossy(note as u8),
            velocity: U7::from_u8_lossy(0),
            duration: 0,
            chord: false,
        }
    }

    /// Time elapsed between the start of the recording and this event.
    pub fn offset(&self) -> Duration {
        Duration::from_millis(self.offset.into())
    }

    /// Pitch of the event.
    pub fn note(&self) -> Note {
        Note::from(self.note)
    }

    /// Strike velocity; 0 for a release.
    pub fn velocity(&self) -> U7 {
        self.velocity
    }

    /// How long the note was held, or zero while its release has not been recorded yet.
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration.into())
    }

    /// Returns `true` if the note was struck together with the press recorded just before it.
    pub fn is_chord(&self) -> bool {
        self.chord
    }

    /// Returns `true` for a Note On.
    pub fn is_press(&self) -> bool {
        u8::from(self.velocity) != 0
    }

    /// Returns `true` for a Note On whose release has not been recorded yet.
    pub fn is_held(&self) -> bool {
        self.is_press() && self.duration == 0
    }

    /// Offset of the matching release.
    pub(crate) fn release_offset(&self) -> u32 {
        self.offset.saturating_add(self.duration)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for NoteEvent {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "NoteEvent {{ {}ms {} {} ({}), velocity: {}, duration: {}ms{} }}",
            self.offset,
            if self.is_press() { "P" } else { "R" },
            self.note().to_str(),
            u8::from(self.note),
            u8::from(self.velocity),
            self.duration,
            if self.chord { ", chord" } else { "" }
        );
    }
}

/// What a slot is currently doing.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SlotStatus {
    /// Not recording and not sounding. A slot holding a loop keeps its place in the loop while idle (i.e., it is muted),
    /// so that it comes back in time with everything else.
    #[default]
    Idle,
    /// Recording incoming notes and looking for a repeated phrase.
    Recording,
    /// Sounding its loop.
    Playing,
}

/// The result of offering a note to a slot.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecordOutcome {
    /// A press was stored at `index`.
    Pressed {
        /// Position of the press, which may precede the end of the buffer if it joined a chord.
        index: usize,
    },
    /// A release was stored and matched with its press.
    Released,
    /// The note was deliberately not stored: a release cannot start a recording, and a release without a matching
    /// press would only corrupt unrelated events.
    Ignored,
    /// The slot has no room left.
    Full,
}

/// One of the looper's independent tracks.
///
/// The slot owns an append-only buffer of [`NoteEvent`]s in non-decreasing offset order, the metadata describing the
/// loop found within it, and the cursor used to replay that loop.
#[derive(Clone, Debug, PartialEq)]
pub struct LoopSlot {
    events: ArrayVec<[NoteEvent; SLOT_CAPACITY]>,
    /// Fixed by the first note of a recording.
    channel: Channel,
    status: SlotStatus,
    /// When the first event of the current recording arrived.
    started: Option<Instant>,
    /// Number of events forming one cycle of the committed loop; 0 while there is none.
    loop_length: usize,
    /// A loop which has been detected but not yet committed.
    candidate: Option<Detection>,
    /// Milliseconds from the start of one cycle to the start of the next.
    pub(crate) period: u32,
    repeat_delay: u32,
    pub(crate) replay: Option<ReplayCursor>,
}

impl Default for LoopSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopSlot {
    /// Construct an empty, idle `LoopSlot`.
    pub fn new() -> Self {
        Self {
            events: ArrayVec::new(),
            channel: Channel::Ch1,
            status: SlotStatus::Idle,
            started: None,
            loop_length: 0,
            candidate: None,
            period: 0,
            repeat_delay: 0,
            replay: None,
        }
    }

    /// What the slot is doing.
    pub fn status(&self) -> SlotStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: SlotStatus) {
        self.status = status;
    }

    /// Channel the slot records under and replays on.
    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Every event recorded so far (or, once a loop is committed, one cycle of it).
    pub fn events(&self) -> &[NoteEvent] {
        &self.events
    }

    /// Position the next recorded event would be written to.
    pub fn record_cursor(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` once no more events fit.
    pub fn is_full(&self) -> bool {
        self.events.len() == SLOT_CAPACITY
    }

    /// Number of events in one cycle of the committed loop; 0 when there is none.
    pub fn loop_length(&self) -> usize {
        self.loop_length
    }

    /// Returns `true` if a loop has been committed, i.e., the slot is eligible to play.
    pub fn has_loop(&self) -> bool {
        self.loop_length > 0
    }

    /// The events of one cycle of the committed loop.
    pub fn loop_events(&self) -> &[NoteEvent] {
        &self.events[..self.loop_length]
    }

    /// A loop detected during recording which is waiting for the performer's acknowledgement.
    pub fn candidate(&self) -> Option<Detection> {
        self.candidate
    }

    pub(crate) fn set_candidate(&mut self, detection: Detection) {
        self.candidate = Some(detection);
    }

    /// Time from the start of one cycle to the start of the next.
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period.into())
    }

    /// Gap between the last event of a cycle and the first event of the next.
    pub fn repeat_delay(&self) -> Duration {
        Duration::from_millis(self.repeat_delay.into())
    }

    /// Index of the next event to be replayed, if the slot is looping.
    pub fn replay_cursor(&self) -> Option<usize> {
        self.replay.as_ref().map(ReplayCursor::index)
    }

    /// Discard everything: events, loop, candidate and replay position.
    pub fn clear(&mut self) {
        self.events.clear();
        self.started = None;
        self.loop_length = 0;
        self.candidate = None;
        self.period = 0;
        self.repeat_delay = 0;
        self.replay = None;
    }

    /// Discard any previous recording or loop and start recording anew.
    pub fn start_recording(&mut self) {
        self.clear();
        self.status = SlotStatus::Recording;
    }

    /// Record a note received at `timestamp`.
    ///
    /// Presses landing within `chord_window` of the press just before them (and of a pitch not already part of that
    /// chord) join its chord: they take its offset and are kept sorted by pitch, so that a chord compares as a set no
    /// matter in which order its keys went down. Releases are matched with the most recent unreleased press of the same
    /// pitch, which receives its duration.
    pub fn add_note(
        &mut self,
        message: NoteMessage,
        timestamp: Instant,
        chord_window: Duration,
    ) -> RecordOutcome {
        if self.is_full() {
            return RecordOutcome::Full;
        }

        let started = match self.started {
            Some(started) if !self.events.is_empty() => started,
            _ => {
                if message.is_off() {
                    trace!("Ignoring a release before anything was recorded");
                    return RecordOutcome::Ignored;
                }
                self.started = Some(timestamp);
                self.channel = message.channel;
                timestamp
            }
        };

        if message.channel != self.channel {
            debug!(
                "Recording channel {} note under the slot's channel {}",
                message.channel.number(),
                self.channel.number()
            );
        }

        let offset = millis(timestamp.saturating_duration_since(started));
        if message.is_off() {
            self.record_release(message.note, offset)
        } else {
            self.record_press(message.note, message.velocity, offset, millis(chord_window))
        }
    }

    fn record_press(&mut self, note: Note, velocity: U7, offset: u32, window: u32) -> RecordOutcome {
        let mut event = NoteEvent::press(offset, note, velocity);

        let head = self.chord_head();
        let joins_chord = head.is_some_and(|head| {
            let run = &self.events[head..];
            window > 0
                && offset.saturating_sub(run[0].offset) <= window
                && !run.iter().any(|e| e.note == event.note)
        });

        match head {
            Some(head) if joins_chord => {
                event.offset = self.events[head].offset;
                // keep the run sorted by pitch; equal pitches are excluded above, so the order is total
                let index = head
                    + self.events[head..]
                        .iter()
                        .take_while(|e| e.note < event.note)
                        .count();
                self.events.insert(index, event);
                for (i, e) in self.events[head..].iter_mut().enumerate() {
                    e.chord = i > 0;
                }
                RecordOutcome::Pressed { index }
            }
            _ => {
                self.events.push(event);
                RecordOutcome::Pressed {
                    index: self.events.len() - 1,
                }
            }
        }
    }

    fn record_release(&mut self, note: Note, offset: u32) -> RecordOutcome {
        let pitch = U7::from_u8_lossy(note as u8);
        match self
            .events
            .iter_mut()
            .rev()
            .find(|e| e.note == pitch && e.is_held())
        {
            Some(press) => {
                // a zero duration would read as "still held"
                press.duration = offset.saturating_sub(press.offset).max(1);
            }
            None => {
                debug!("Discarding release of {} without a matching press", note as u8);
                return RecordOutcome::Ignored;
            }
        }

        self.events.push(NoteEvent::release(offset, note));
        RecordOutcome::Released
    }

    /// Start of the run of presses ending the buffer which a new press could join.
    fn chord_head(&self) -> Option<usize> {
        let last = self.events.len().checked_sub(1)?;
        if !self.events[last].is_press() {
            return None;
        }
        let mut head = last;
        while self.events[head].chord {
            head -= 1;
        }
        Some(head)
    }

    /// Turn the recording into a loop, keeping only one cycle's worth of events.
    ///
    /// Presses still held at the end of the cycle are released at the cycle boundary, and no note is allowed to ring for
    /// longer than a whole cycle, so that replaying the loop can never leave a note stuck.
    pub(crate) fn commit(&mut self, detection: Detection, resume: Resume) {
        let period = millis(detection.period);
        let Some(started) = self.started else {
            warn!("Cannot commit a loop without a recording");
            return;
        };
        let length = detection.loop_length.min(self.events.len());

        self.events.truncate(length);
        for event in self.events.iter_mut().filter(|e| e.is_press()) {
            if event.duration == 0 {
                event.duration = period.saturating_sub(event.offset).max(1);
            }
            event.duration = event.duration.min(period);
        }

        self.loop_length = length;
        self.period = period;
        self.repeat_delay = millis(detection.repeat_delay);
        self.candidate = None;
        self.replay = Some(match resume {
            // the performer is already past the phrase; each cycle began when its first event repeated
            Resume::Continue(now) => ReplayCursor::new(
                started + detection.period * detection.resume_cycle,
                detection.resume_index.min(length),
                now,
            ),
            Resume::Restart(now) => ReplayCursor::new(now, 0, now),
        });
    }
}
