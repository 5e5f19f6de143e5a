//! The looper itself: records the performer into one of several slots, notices when they start repeating themselves,
//! and keeps the repetition going on its own.
//!
//! The [`Looper`] sits between the [`Decoder`](crate::midi::Decoder) and the MIDI output. Incoming notes always pass
//! through; the selected slot records them while it is recording. Loops sound from [`Looper::tick`], which the firmware
//! calls every millisecond or so, and the performer steers the whole thing from [`Looper::on_control`].

mod detector;
pub use detector::*;

mod scheduler;
pub use scheduler::*;

mod slot;
pub use slot::*;

use crate::configuration::{ChordWindow, CycleConfig, LooperConfig, LooperMode};
use crate::controls::{ControlEvent, ControlRegistry, ControlSource, KNOB_MAX, Trigger};
use crate::display::{Activity, Display, Notice, Status};
use crate::midi::{MidiOut, NoteHandler, NoteMessage, all_notes_off};
use embassy_time::Instant;
use tinyvec::ArrayVec;

/// Number of slots the pedal is built with.
pub const DEFAULT_SLOT_COUNT: usize = 4;

/// Whether loops are audible at all.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GlobalStatus {
    /// Every loop keeps time silently.
    #[default]
    Idle,
    /// Slots which are playing are heard.
    Playing,
}

/// Things the performer can ask of the looper through the controls.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LooperAction {
    /// Do nothing.
    #[default]
    None,
    /// Switch between Auto and Manual commit.
    ToggleMode,
    /// Start or stop every loop at once.
    ToggleGlobal,
    /// Move the selected slot on: idle slots start recording, recording slots commit (or give up), playing slots mute.
    AdvanceSlot,
    /// Play the selected slot's loop again, after muting it or while a detected loop awaits acknowledgement.
    ReplayPrevious,
    /// Cycle through the chord window settings.
    CycleChordWindow,
    /// Write the selected slot's events to the log.
    DumpSlot,
    /// Pick the selected slot from a knob position.
    SelectSlot,
}

/// Bindings the pedal ships with.
///
/// | Control  | Short press          | Long press (see [`LooperConfig::long_press`]) |
/// |----------|----------------------|-----------------------------------------------|
/// | Button 0 | Toggle mode          | Start/stop all loops                          |
/// | Button 1 | Advance slot status  | Cycle chord window                            |
/// | Button 2 | Replay/unmute        | Dump slot to the log                          |
///
/// Knob 0 selects the slot.
pub fn default_controls(config: &LooperConfig) -> ControlRegistry<LooperAction> {
    let long = Trigger::long_release(config.long_press);
    let bindings = [
        (ControlSource::Button(0), Trigger::release(), LooperAction::ToggleMode),
        (ControlSource::Button(0), long, LooperAction::ToggleGlobal),
        (ControlSource::Button(1), Trigger::release(), LooperAction::AdvanceSlot),
        (ControlSource::Button(1), long, LooperAction::CycleChordWindow),
        (ControlSource::Button(2), Trigger::release(), LooperAction::ReplayPrevious),
        (ControlSource::Button(2), long, LooperAction::DumpSlot),
        (ControlSource::Knob(0), Trigger::Knob, LooperAction::SelectSlot),
    ];

    let mut controls = ControlRegistry::new();
    for (source, trigger, action) in bindings {
        if let Err(e) = controls.register(source, trigger, action) {
            error!("Could not bind {}: {}", action, e);
        }
    }
    controls
}

/// Global state of the looper, shared by all slots.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LooperContext {
    /// Auto or Manual commit.
    pub mode: LooperMode,
    /// Whether looping slots are heard.
    pub global_status: GlobalStatus,
    /// 0-based index of the slot the controls act upon, and the only slot which records.
    pub selected_slot: usize,
    /// Window applied to presses being recorded.
    pub chord_window: ChordWindow,
    /// When the transient message on display expires.
    pub message_until: Option<Instant>,
}

/// A MIDI looper with `SLOTS` independent slots, reporting to a [`Display`].
pub struct Looper<D: Display, const SLOTS: usize = DEFAULT_SLOT_COUNT> {
    context: LooperContext,
    slots: [LoopSlot; SLOTS],
    config: LooperConfig,
    controls: ControlRegistry<LooperAction>,
    display: D,
}

impl<D: Display, const SLOTS: usize> Looper<D, SLOTS> {
    /// Construct a `Looper` with the [default controls](`default_controls`), and show its status.
    pub fn new(config: LooperConfig, display: D) -> Self {
        Self::with_controls(config, display, default_controls(&config))
    }

    /// Construct a `Looper` with custom control bindings, and show its status.
    pub fn with_controls(
        config: LooperConfig,
        display: D,
        controls: ControlRegistry<LooperAction>,
    ) -> Self {
        let mut looper = Self {
            context: LooperContext {
                mode: config.mode,
                global_status: GlobalStatus::Idle,
                selected_slot: 0,
                chord_window: config.chord_window,
                message_until: None,
            },
            slots: core::array::from_fn(|_| LoopSlot::new()),
            config,
            controls,
            display,
        };
        looper.show_status();
        looper
    }

    /// Global state.
    pub fn context(&self) -> &LooperContext {
        &self.context
    }

    /// All slots.
    pub fn slots(&self) -> &[LoopSlot; SLOTS] {
        &self.slots
    }

    /// The slot the controls act upon.
    pub fn selected(&self) -> &LoopSlot {
        &self.slots[self.context.selected_slot]
    }

    fn selected_mut(&mut self) -> &mut LoopSlot {
        &mut self.slots[self.context.selected_slot]
    }

    /// The display the looper reports to.
    pub fn display(&self) -> &D {
        &self.display
    }

    /// Mutable access to the display, e.g. to drive its animations.
    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    /// What the display shows when no message is pending.
    pub fn status(&self) -> Status {
        let slot = self.selected();
        Status {
            mode: self.context.mode,
            global: self.context.global_status,
            selected_slot: self.context.selected_slot,
            slot_status: slot.status(),
            loop_length: slot.loop_length(),
            loop_ready: slot.candidate().is_some(),
            chord_window: self.context.chord_window,
        }
    }

    fn show_status(&mut self) {
        let status = self.status();
        self.display.show_status(&status);
    }

    fn notify(&mut self, notice: Notice, now: Instant) {
        info!("{}", notice);
        self.display
            .show_transient_message(notice, self.config.message_timeout);
        self.context.message_until = Some(now + self.config.message_timeout);
    }

    /// Advance every loop to `now`, emitting whatever became due, and expire the message on display.
    pub fn tick<O: MidiOut + ?Sized>(&mut self, now: Instant, out: &mut O) {
        let global = self.context.global_status == GlobalStatus::Playing;
        for slot in self.slots.iter_mut() {
            let audible = global && slot.status() == SlotStatus::Playing;
            service(slot, now, audible, out);
        }

        if self.context.message_until.is_some_and(|until| now >= until) {
            self.context.message_until = None;
            self.show_status();
        }
    }

    /// Perform whatever `event` is bound to.
    pub fn on_control<O: MidiOut + ?Sized>(&mut self, event: ControlEvent, now: Instant, out: &mut O) {
        self.display.blink(Activity::Control);

        let actions: ArrayVec<[LooperAction; 16]> = self.controls.dispatch(&event).copied().collect();
        for action in actions {
            debug!("{} triggered {}", event, action);
            self.perform(action, &event, now, out);
        }
    }

    /// Perform `action` as if triggered by `event`.
    pub fn perform<O: MidiOut + ?Sized>(
        &mut self,
        action: LooperAction,
        event: &ControlEvent,
        now: Instant,
        out: &mut O,
    ) {
        match action {
            LooperAction::None => {}
            LooperAction::ToggleMode => self.toggle_mode(),
            LooperAction::ToggleGlobal => self.toggle_global(out),
            LooperAction::AdvanceSlot => self.advance_slot(now, out),
            LooperAction::ReplayPrevious => self.replay_previous(now),
            LooperAction::CycleChordWindow => self.cycle_chord_window(),
            LooperAction::DumpSlot => self.dump_slot(now),
            LooperAction::SelectSlot => {
                if let ControlEvent::Knob { value, .. } = *event {
                    self.select_slot(value);
                }
            }
        }
    }

    /// Switch between Auto and Manual commit.
    pub fn toggle_mode(&mut self) {
        self.context.mode = self.context.mode.cycle();
        info!("Mode is now {}", self.context.mode);
        self.show_status();
    }

    /// Start or stop every loop. Stopping silences whatever the loops left ringing.
    pub fn toggle_global<O: MidiOut + ?Sized>(&mut self, out: &mut O) {
        self.context.global_status = match self.context.global_status {
            GlobalStatus::Idle => GlobalStatus::Playing,
            GlobalStatus::Playing => {
                for slot in self.slots.iter().filter(|s| s.status() == SlotStatus::Playing) {
                    all_notes_off(out, slot.channel());
                }
                GlobalStatus::Idle
            }
        };
        info!("Looper is now {}", self.context.global_status);
        self.show_status();
    }

    /// Move the selected slot on to its next status.
    ///
    /// * An idle slot discards whatever it held and starts recording.
    /// * A recording slot commits the loop awaiting acknowledgement, or goes back to idle (discarding the recording) when
    ///   there is none.
    /// * A playing slot is muted. It keeps its place in the loop and can be brought back with
    ///   [`Looper::replay_previous`].
    pub fn advance_slot<O: MidiOut + ?Sized>(&mut self, now: Instant, out: &mut O) {
        let index = self.context.selected_slot;
        let slot = &mut self.slots[index];
        match slot.status() {
            SlotStatus::Idle => {
                slot.start_recording();
                info!("Slot {} recording", index);
            }
            SlotStatus::Recording => match slot.candidate() {
                Some(detection) => self.acknowledge(detection, now),
                None => {
                    slot.clear();
                    slot.set_status(SlotStatus::Idle);
                    self.notify(Notice::NoSample, now);
                }
            },
            SlotStatus::Playing => {
                slot.set_status(SlotStatus::Idle);
                all_notes_off(out, slot.channel());
                info!("Slot {} muted", index);
            }
        }
        self.show_status();
    }

    /// Bring the selected slot's loop back: commit a loop awaiting acknowledgement, or unmute a muted one.
    pub fn replay_previous(&mut self, now: Instant) {
        let slot = self.selected_mut();
        if let (SlotStatus::Recording, Some(detection)) = (slot.status(), slot.candidate()) {
            self.acknowledge(detection, now);
        } else if slot.has_loop() {
            slot.set_status(SlotStatus::Playing);
            self.context.global_status = GlobalStatus::Playing;
        } else {
            self.notify(Notice::NoSample, now);
            return;
        }
        self.show_status();
    }

    /// Cycle through the chord window settings. Applies to notes recorded from now on.
    pub fn cycle_chord_window(&mut self) {
        self.context.chord_window = self.context.chord_window.cycle();
        info!("Chord window is now {}", self.context.chord_window);
        self.show_status();
    }

    /// Write the selected slot's events to the log.
    pub fn dump_slot(&mut self, now: Instant) {
        let slot = self.selected();
        info!(
            "Slot {}: {} events, loop of {} ({}ms, {}ms before repeating)",
            self.context.selected_slot,
            slot.record_cursor(),
            slot.loop_length(),
            slot.period().as_millis(),
            slot.repeat_delay().as_millis()
        );
        for (i, event) in slot.events().iter().enumerate() {
            info!("{}: {}", i, event);
        }
        let count = slot.record_cursor();
        self.notify(Notice::Dumped(count), now);
    }

    /// Select the slot matching a knob position. Turning the knob up selects lower slots.
    pub fn select_slot(&mut self, value: u16) {
        let value = usize::from(value.min(KNOB_MAX));
        let band = value * SLOTS / (usize::from(KNOB_MAX) + 1);
        let index = SLOTS - 1 - band;
        if index != self.context.selected_slot {
            self.context.selected_slot = index;
            info!("Slot {} selected", index);
            self.show_status();
        }
    }

    fn acknowledge(&mut self, detection: Detection, now: Instant) {
        let slot = self.selected_mut();
        slot.commit(detection, Resume::Restart(now));
        slot.set_status(SlotStatus::Playing);
        self.context.global_status = GlobalStatus::Playing;
        info!("Slot {} acknowledged {}", self.context.selected_slot, detection);
    }

    fn loop_detected(&mut self, detection: Detection, now: Instant) {
        let index = self.context.selected_slot;
        match self.context.mode {
            LooperMode::Auto => {
                let slot = &mut self.slots[index];
                slot.commit(detection, Resume::Continue(now));
                slot.set_status(SlotStatus::Playing);
                self.context.global_status = GlobalStatus::Playing;
                info!("Slot {} looping {}", index, detection);
                self.show_status();
                self.notify(Notice::Looping(detection.loop_length), now);
            }
            LooperMode::Manual => {
                self.slots[index].set_candidate(detection);
                debug!("Slot {} has a loop ready {}", index, detection);
                self.show_status();
                self.notify(Notice::LoopReady(detection.loop_length), now);
            }
        }
    }
}

impl<D: Display, const SLOTS: usize> NoteHandler for Looper<D, SLOTS> {
    /// Record the note if the selected slot is recording. The note is always passed through.
    fn on_note(&mut self, note: NoteMessage, timestamp: Instant) -> bool {
        self.display.blink(Activity::Note);

        let window = self.context.chord_window.duration();
        let slot = self.selected_mut();
        if slot.status() != SlotStatus::Recording {
            return false;
        }

        if let RecordOutcome::Pressed { .. } = slot.add_note(note, timestamp, window) {
            if let Some(detection) = detect(slot.events()) {
                self.loop_detected(detection, timestamp);
                return false;
            }
        }

        let slot = self.selected_mut();
        if slot.status() == SlotStatus::Recording && slot.is_full() && slot.candidate().is_none() {
            slot.clear();
            slot.set_status(SlotStatus::Idle);
            warn!("Slot {} filled up without repeating", self.context.selected_slot);
            self.show_status();
            self.notify(Notice::TooLong, timestamp);
        }
        false
    }
}
