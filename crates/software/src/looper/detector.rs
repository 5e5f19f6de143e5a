//! Recognizes when the performer starts repeating the phrase they began the recording with.
//!
//! Presses are compared by pitch, in groups: a lone press forms a group of one, and the members of a chord form a single
//! group (already sorted by pitch when they were recorded). Releases and timing play no part in the comparison; the
//! performer is expected to keep time, not to repeat it to the millisecond.

use super::NoteEvent;
use embassy_time::Duration;

/// Fewer events than this are never searched.
pub const MIN_EVENTS: usize = 4;
/// Presses the repeated phrase must contain before its repetition starts.
const MIN_PHRASE: usize = 2;
/// Groups of the repetition which must match before it is trusted.
const MIN_MATCHED_GROUPS: usize = 2;

/// A repeated phrase found in a recording.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Detection {
    /// Number of events in one cycle, i.e., the index at which the phrase starts repeating.
    pub loop_length: usize,
    /// Index of the loop event which follows the counterpart of the most recently pressed group, where replay resumes
    /// when the loop takes over seamlessly from the performer.
    pub resume_index: usize,
    /// Cycle the performer is in when the loop takes over, counting the recorded phrase itself as cycle 0.
    pub resume_cycle: u32,
    /// Time from the start of one cycle to the start of the next.
    pub period: Duration,
    /// Gap between the last event of a cycle and the first event of the next.
    pub repeat_delay: Duration,
}

/// Search `events` for the point at which they start repeating from the beginning.
///
/// Every group start is a candidate, starting with the most recent one; the first candidate whose following groups all
/// match the corresponding groups from the start of the recording wins. The most recent group may still be a chord in the
/// making, so it only needs to be a subset of its counterpart.
///
/// The search only ever reads `events`, so running it again on the same input yields the same answer.
pub fn detect(events: &[NoteEvent]) -> Option<Detection> {
    if events.len() < MIN_EVENTS {
        return None;
    }

    let mut presses_before = events.iter().filter(|e| e.is_press()).count();
    for split in (1..events.len()).rev() {
        let event = &events[split];
        if !event.is_press() {
            continue;
        }
        presses_before -= 1;
        if event.chord {
            continue;
        }
        // presses only get fewer from here on
        if presses_before < MIN_PHRASE {
            break;
        }
        if event.offset == 0 {
            continue;
        }
        let Some((resume_index, resume_cycle)) = repeats_from_start(events, split) else {
            continue;
        };

        let previous = events[split - 1].offset;
        return Some(Detection {
            loop_length: split,
            resume_index,
            resume_cycle,
            period: Duration::from_millis(event.offset.into()),
            repeat_delay: Duration::from_millis(event.offset.saturating_sub(previous).into()),
        });
    }

    None
}

/// Bounds of the first group at or after `from`.
fn next_group(events: &[NoteEvent], from: usize) -> Option<(usize, usize)> {
    let start = from + events.get(from..)?.iter().position(NoteEvent::is_press)?;
    let end = start + 1 + events[start + 1..].iter().take_while(|e| e.chord).count();
    Some((start, end))
}

/// Walks the groups recorded from `split` on alongside the groups of the phrase before it, going round the phrase as
/// often as needed.
///
/// On a match, returns where the loop resumes: the index just past the phrase group matching the last group pressed
/// (past as many of its members as were pressed, for a chord in the making), and the cycle that index belongs to.
/// Releases play no part, so a performer holding notes longer or shorter the second time round still lines up.
fn repeats_from_start(events: &[NoteEvent], split: usize) -> Option<(usize, u32)> {
    let phrase = &events[..split];
    let mut original = 0;
    let mut cycle = 1;
    let mut repeat = split;
    let mut matched = 0;
    let mut resume = 0;

    while let Some((repeat_start, repeat_end)) = next_group(events, repeat) {
        let (original_start, original_end) = match next_group(phrase, original) {
            Some(group) => group,
            None => {
                cycle += 1;
                next_group(phrase, 0)?
            }
        };
        let expected = &events[original_start..original_end];
        let actual = &events[repeat_start..repeat_end];

        if same_pitches(expected, actual) {
            matched += 1;
            resume = original_end;
        } else if repeat_end == events.len() && contains_pitches(expected, actual) {
            resume = original_start + actual.len();
        } else {
            return None;
        }

        original = original_end;
        repeat = repeat_end;
    }

    if matched < MIN_MATCHED_GROUPS {
        return None;
    }
    if resume == split {
        Some((0, cycle + 1))
    } else {
        Some((resume, cycle))
    }
}

fn same_pitches(expected: &[NoteEvent], actual: &[NoteEvent]) -> bool {
    expected.len() == actual.len() && expected.iter().zip(actual).all(|(a, b)| a.note == b.note)
}

fn contains_pitches(expected: &[NoteEvent], actual: &[NoteEvent]) -> bool {
    actual
        .iter()
        .all(|a| expected.iter().any(|e| e.note == a.note))
}
