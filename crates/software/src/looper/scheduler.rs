//! Replays committed loops.
//!
//! Each looping slot carries a [`ReplayCursor`]: the index of its next press and the instant the current cycle started.
//! Every tick emits whatever became due since the previous one, presses and releases interleaved in time order. A release
//! which falls past the end of its cycle is emitted during the next one, so the scheduler looks for releases both in the
//! current cycle and in the overhang of the previous one.
//!
//! Cycles are laid end to end from the instant the first one started, so a loop never drifts from the performer's
//! tempo no matter how late the ticks come.

use super::LoopSlot;
use crate::midi::{MidiOut, note_off, note_on};
use embassy_time::{Duration, Instant};
use wmidi::Note;

/// Where a slot is within its loop.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReplayCursor {
    index: usize,
    cycle_start: Instant,
    /// Releases up to this many milliseconds into the current cycle have been emitted.
    flushed_until: i64,
}

/// How a freshly committed loop lines up with the performance.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Resume {
    /// The loop takes over where the performer is, at the given instant. Everything recorded so far has already sounded.
    Continue(Instant),
    /// The loop starts over from its first event at the given instant.
    Restart(Instant),
}

impl ReplayCursor {
    pub(crate) fn new(cycle_start: Instant, index: usize, now: Instant) -> Self {
        Self {
            index,
            cycle_start,
            flushed_until: signed_millis(now, cycle_start),
        }
    }

    /// Index of the next event to replay.
    pub fn index(&self) -> usize {
        self.index
    }

    /// When the current cycle started.
    pub fn cycle_start(&self) -> Instant {
        self.cycle_start
    }
}

/// Milliseconds from `origin` to `now`, negative when `now` comes first.
fn signed_millis(now: Instant, origin: Instant) -> i64 {
    if now >= origin {
        i64::try_from((now - origin).as_millis()).unwrap_or(i64::MAX)
    } else {
        -i64::try_from((origin - now).as_millis()).unwrap_or(i64::MAX)
    }
}

/// Emit everything `slot`'s loop has due up to `now`.
///
/// When `audible` is false the loop advances exactly as it would otherwise, but nothing is written; this is what keeps a
/// muted slot in time with the rest.
pub fn service<O: MidiOut + ?Sized>(slot: &mut LoopSlot, now: Instant, audible: bool, out: &mut O) {
    let Some(mut cursor) = slot.replay else {
        return;
    };
    let events = slot.loop_events();
    let period = i64::from(slot.period);
    if period == 0 || events.is_empty() {
        return;
    }
    let channel = slot.channel();

    let mut elapsed = signed_millis(now, cursor.cycle_start);
    if elapsed >= 2 * period {
        // fell behind by whole cycles; drop them rather than replaying them in a burst
        let skipped = elapsed / period - 1;
        cursor.cycle_start += Duration::from_millis((skipped * period) as u64);
        elapsed -= skipped * period;
        cursor.flushed_until = (cursor.flushed_until - skipped * period).max(elapsed - period);
        debug!("Skipped {} cycles", skipped);
    }

    loop {
        if cursor.index == events.len() {
            cursor.index = 0;
            cursor.cycle_start += Duration::from_millis(period as u64);
            cursor.flushed_until -= period;
            elapsed -= period;
        }

        let press = &events[cursor.index];
        let press_due = i64::from(press.offset) <= elapsed;
        let release_due = next_release(slot, cursor.flushed_until, elapsed);

        match release_due {
            // releases win ties, or a repeated note would be cut off by its own previous release
            Some(at) if !press_due || at <= i64::from(press.offset) => {
                if audible {
                    for note in releases_at(slot, at) {
                        note_off(out, channel, note);
                    }
                }
                cursor.flushed_until = at;
            }
            _ if press_due => {
                if audible && press.is_press() {
                    note_on(out, channel, press.note(), press.velocity());
                }
                cursor.index += 1;
            }
            _ => break,
        }
    }

    slot.replay = Some(cursor);
}

/// When each press of the loop is released, both within the current cycle and carried over from the previous one.
fn release_times(slot: &LoopSlot) -> impl Iterator<Item = (i64, Note)> + '_ {
    let period = i64::from(slot.period);
    slot.loop_events()
        .iter()
        .filter(|e| e.is_press())
        .flat_map(move |e| {
            let at = i64::from(e.release_offset());
            [(at, e.note()), (at - period, e.note())]
        })
}

fn next_release(slot: &LoopSlot, after: i64, until: i64) -> Option<i64> {
    release_times(slot)
        .map(|(at, _)| at)
        .filter(|&at| after < at && at <= until)
        .min()
}

fn releases_at(slot: &LoopSlot, at: i64) -> impl Iterator<Item = Note> + '_ {
    release_times(slot)
        .filter(move |&(t, _)| t == at)
        .map(|(_, note)| note)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::looper::{Detection, detect};
    use crate::testutil::{Recorder, ms, off, on};
    use std::{vec, vec::Vec};
    use wmidi::Note;

    const ON: u8 = 0x90;
    const OFF: u8 = 0x80;

    /// Loop of A (held 200ms) and B (held 200ms) with a 400ms period, recorded from 0ms.
    fn pair_loop(resume: Resume) -> LoopSlot {
        let mut slot = LoopSlot::new();
        for (at, note) in [
            (0, on(Note::A4)),
            (100, on(Note::B4)),
            (200, off(Note::A4)),
            (300, off(Note::B4)),
            (400, on(Note::A4)),
            (500, on(Note::B4)),
        ] {
            slot.add_note(note, ms(at), Duration::from_millis(10));
        }
        let detection = detect(slot.events()).expect("Should detect a loop");
        slot.commit(detection, resume);
        slot
    }

    fn run(slot: &mut LoopSlot, from: u64, to: u64, audible: bool) -> Vec<(u64, [u8; 3])> {
        let mut frames = vec![];
        for t in from..=to {
            let mut out = Recorder::default();
            service(slot, ms(t), audible, &mut out);
            frames.extend(out.frames().into_iter().map(|f| (t, f)));
        }
        frames
    }

    const A: u8 = Note::A4 as u8;
    const B: u8 = Note::B4 as u8;

    #[test]
    fn restart_plays_from_the_top() {
        let mut slot = pair_loop(Resume::Restart(ms(1000)));

        let expected = vec![
            (1000, [ON, A, 100]),
            (1100, [ON, B, 100]),
            (1200, [OFF, A, 0]),
            (1300, [OFF, B, 0]),
            (1400, [ON, A, 100]),
            (1500, [ON, B, 100]),
        ];
        assert_eq!(expected, run(&mut slot, 1000, 1500, true), "Expected left but got right");
    }

    #[test]
    fn continue_picks_up_after_the_performer() {
        // the performer played A at 400 and B at 500; the loop must carry on from there
        let mut slot = pair_loop(Resume::Continue(ms(500)));
        assert_eq!(Some(2), slot.replay_cursor(), "Expected left but got right");

        let expected = vec![
            (600, [OFF, A, 0]),
            (700, [OFF, B, 0]),
            (800, [ON, A, 100]),
            (900, [ON, B, 100]),
        ];
        assert_eq!(expected, run(&mut slot, 501, 900, true), "Expected left but got right");
    }

    #[test]
    fn silent_service_keeps_phase() {
        let mut slot = pair_loop(Resume::Restart(ms(0)));

        assert!(run(&mut slot, 0, 850, false).is_empty(), "Nothing should sound");
        assert_eq!(Some(1), slot.replay_cursor(), "Expected left but got right");

        let expected = vec![
            (900, [ON, B, 100]),
            (1000, [OFF, A, 0]),
            (1100, [OFF, B, 0]),
            (1200, [ON, A, 100]),
        ];
        assert_eq!(expected, run(&mut slot, 851, 1200, true), "Expected left but got right");
    }

    #[test]
    fn release_past_the_cycle_end_carries_over() {
        // A is still held when the phrase repeats; its release is clamped to the period and sounds in the next cycle
        let mut slot = LoopSlot::new();
        for (at, note) in [
            (0, on(Note::A4)),
            (100, on(Note::B4)),
            (150, off(Note::B4)),
            (400, on(Note::A4)),
            (500, on(Note::B4)),
        ] {
            slot.add_note(note, ms(at), Duration::from_millis(10));
        }
        let detection = detect(slot.events());
        assert_eq!(
            Some(Detection {
                loop_length: 3,
                resume_index: 2,
                resume_cycle: 1,
                period: Duration::from_millis(400),
                repeat_delay: Duration::from_millis(250),
            }),
            detection,
            "Expected left but got right"
        );
        slot.commit(detection.expect("Detected above"), Resume::Restart(ms(0)));

        assert_eq!(
            Duration::from_millis(400),
            slot.loop_events()[0].duration(),
            "Held note closes at the cycle boundary"
        );

        let expected = vec![
            (0, [ON, A, 100]),
            (100, [ON, B, 100]),
            (150, [OFF, B, 0]),
            (400, [OFF, A, 0]),
            (400, [ON, A, 100]),
        ];
        assert_eq!(expected, run(&mut slot, 0, 400, true), "Expected left but got right");
    }

    #[test]
    fn late_ticks_catch_up_in_order() {
        let mut slot = pair_loop(Resume::Restart(ms(0)));
        let mut out = Recorder::default();

        service(&mut slot, ms(0), true, &mut out);
        service(&mut slot, ms(350), true, &mut out);

        let expected = vec![[ON, A, 100], [ON, B, 100], [OFF, A, 0], [OFF, B, 0]];
        assert_eq!(expected, out.frames(), "Expected left but got right");
    }

    #[test]
    fn idle_slot_is_left_alone() {
        let mut slot = LoopSlot::new();
        let mut out = Recorder::default();
        service(&mut slot, ms(100), true, &mut out);
        assert!(out.bytes.is_empty(), "Nothing should be written");
    }
}
