//! Physical controls (buttons and knobs), and the registry binding their events to looper actions.
//!
//! A button binding fires either on press, or on release once the button has been held for at least some minimum time.
//! Long and short presses of one button can therefore be told apart: when a button is released, only the satisfied
//! bindings with the longest minimum hold fire.

use embassy_time::Duration;
use tinyvec::ArrayVec;

/// Number of buttons on the pedal.
pub const BUTTON_COUNT: u8 = 3;
/// Number of knobs on the pedal.
pub const KNOB_COUNT: u8 = 2;
/// Highest value a knob reports.
pub const KNOB_MAX: u16 = 1023;

/// Identifies one control.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlSource {
    /// A button, by 0-based index.
    Button(u8),
    /// A knob, by 0-based index.
    Knob(u8),
}

/// Which way a button moved.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ButtonEdge {
    /// Pushed down.
    #[default]
    Pressed,
    /// Let go.
    Released,
}

/// Which way a knob moved.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KnobDirection {
    /// The first reading, or no change.
    #[default]
    Unknown,
    /// Towards higher values.
    Clockwise,
    /// Towards lower values.
    CounterClockwise,
}

impl KnobDirection {
    /// Compare two readings.
    pub fn between(previous: u16, current: u16) -> Self {
        match current.cmp(&previous) {
            core::cmp::Ordering::Greater => Self::Clockwise,
            core::cmp::Ordering::Less => Self::CounterClockwise,
            core::cmp::Ordering::Equal => Self::Unknown,
        }
    }
}

/// Something that happened to a control.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlEvent {
    /// A button changed state.
    Button {
        /// 0-based index of the button.
        id: u8,
        /// How it changed.
        edge: ButtonEdge,
        /// On release, for how long it had been held. Zero on press.
        held: Duration,
    },
    /// A knob was turned.
    Knob {
        /// 0-based index of the knob.
        id: u8,
        /// New position, from 0 to [`KNOB_MAX`].
        value: u16,
        /// Which way it turned.
        direction: KnobDirection,
    },
}

impl ControlEvent {
    /// A button was pushed down.
    pub const fn press(id: u8) -> Self {
        Self::Button {
            id,
            edge: ButtonEdge::Pressed,
            held: Duration::from_ticks(0),
        }
    }

    /// A button was let go after being held for `held`.
    pub const fn release(id: u8, held: Duration) -> Self {
        Self::Button {
            id,
            edge: ButtonEdge::Released,
            held,
        }
    }

    /// The control the event originates from.
    pub fn source(&self) -> ControlSource {
        match *self {
            Self::Button { id, .. } => ControlSource::Button(id),
            Self::Knob { id, .. } => ControlSource::Knob(id),
        }
    }
}

/// The kind of event a binding reacts to.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Trigger {
    /// A button edge; on release, only once the button was held for at least `min_hold`.
    Button {
        /// Edge to react to.
        edge: ButtonEdge,
        /// Must be zero for presses.
        min_hold: Duration,
    },
    /// Any movement of a knob.
    Knob,
}

impl Default for Trigger {
    fn default() -> Self {
        Self::press()
    }
}

impl Trigger {
    /// React as soon as the button goes down.
    pub const fn press() -> Self {
        Self::Button {
            edge: ButtonEdge::Pressed,
            min_hold: Duration::from_ticks(0),
        }
    }

    /// React to any release.
    pub const fn release() -> Self {
        Self::long_release(Duration::from_ticks(0))
    }

    /// React to a release after the button was held for at least `min_hold`.
    pub const fn long_release(min_hold: Duration) -> Self {
        Self::Button {
            edge: ButtonEdge::Released,
            min_hold,
        }
    }
}

/// Why a binding was refused.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegistrationError {
    /// No such button or knob.
    UnknownSource,
    /// A button trigger on a knob, or the other way round.
    WrongTrigger,
    /// A press cannot know how long the button will be held.
    HoldOnPress,
    /// There is no room for another binding.
    RegistryFull,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Binding<A> {
    source: ControlSource,
    trigger: Trigger,
    action: A,
}

// only there to fill the unused part of the registry's storage
impl<A: Default> Default for Binding<A> {
    fn default() -> Self {
        Self {
            source: ControlSource::Button(0),
            trigger: Trigger::default(),
            action: A::default(),
        }
    }
}

impl<A> Binding<A> {
    fn fires(&self, event: &ControlEvent, longest_hold: Option<Duration>) -> bool {
        if self.source != event.source() {
            return false;
        }
        match (self.trigger, *event) {
            (Trigger::Knob, ControlEvent::Knob { .. }) => true,
            (
                Trigger::Button {
                    edge: ButtonEdge::Pressed,
                    ..
                },
                ControlEvent::Button {
                    edge: ButtonEdge::Pressed,
                    ..
                },
            ) => true,
            (
                Trigger::Button {
                    edge: ButtonEdge::Released,
                    min_hold,
                },
                ControlEvent::Button {
                    edge: ButtonEdge::Released,
                    ..
                },
            ) => longest_hold == Some(min_hold),
            _ => false,
        }
    }
}

/// Ordered bindings from control events to actions of type `A`.
#[derive(Clone, Debug, PartialEq)]
pub struct ControlRegistry<A: Default, const N: usize = 16> {
    bindings: ArrayVec<[Binding<A>; N]>,
}

impl<A: Default, const N: usize> Default for ControlRegistry<A, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Default, const N: usize> ControlRegistry<A, N> {
    /// Construct a `ControlRegistry` without any binding.
    pub fn new() -> Self {
        Self {
            bindings: ArrayVec::new(),
        }
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Returns `true` if nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Bind `action` to `trigger` on `source`. Bindings fire in the order they were registered.
    pub fn register(
        &mut self,
        source: ControlSource,
        trigger: Trigger,
        action: A,
    ) -> Result<(), RegistrationError> {
        match (source, trigger) {
            (ControlSource::Button(id), _) if id >= BUTTON_COUNT => {
                return Err(RegistrationError::UnknownSource);
            }
            (ControlSource::Knob(id), _) if id >= KNOB_COUNT => {
                return Err(RegistrationError::UnknownSource);
            }
            (ControlSource::Button(_), Trigger::Knob)
            | (ControlSource::Knob(_), Trigger::Button { .. }) => {
                return Err(RegistrationError::WrongTrigger);
            }
            (
                _,
                Trigger::Button {
                    edge: ButtonEdge::Pressed,
                    min_hold,
                },
            ) if min_hold.as_ticks() > 0 => return Err(RegistrationError::HoldOnPress),
            _ => {}
        }

        self.bindings
            .try_push(Binding {
                source,
                trigger,
                action,
            })
            .map_or(Ok(()), |_| Err(RegistrationError::RegistryFull))
    }

    /// Actions bound to `event`, in registration order.
    pub fn dispatch<'a>(&'a self, event: &ControlEvent) -> impl Iterator<Item = &'a A> + 'a {
        let event = *event;
        let longest_hold = match event {
            ControlEvent::Button {
                edge: ButtonEdge::Released,
                held,
                ..
            } => self
                .bindings
                .iter()
                .filter(|b| b.source == event.source())
                .filter_map(|b| match b.trigger {
                    Trigger::Button {
                        edge: ButtonEdge::Released,
                        min_hold,
                    } if min_hold <= held => Some(min_hold),
                    _ => None,
                })
                .max(),
            _ => None,
        };

        self.bindings
            .iter()
            .filter(move |b| b.fires(&event, longest_hold))
            .map(|b| &b.action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{vec, vec::Vec};

    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    enum Action {
        #[default]
        Short,
        Long,
        Longer,
        Down,
        Turn,
    }

    fn fired<const N: usize>(registry: &ControlRegistry<Action, N>, event: ControlEvent) -> Vec<Action> {
        registry.dispatch(&event).copied().collect()
    }

    fn registry() -> ControlRegistry<Action> {
        let mut registry = ControlRegistry::new();
        let button = ControlSource::Button(0);
        registry
            .register(button, Trigger::release(), Action::Short)
            .expect("Valid binding");
        registry
            .register(button, Trigger::long_release(Duration::from_millis(1000)), Action::Long)
            .expect("Valid binding");
        registry
            .register(button, Trigger::long_release(Duration::from_millis(3000)), Action::Longer)
            .expect("Valid binding");
        registry
            .register(button, Trigger::press(), Action::Down)
            .expect("Valid binding");
        registry
            .register(ControlSource::Knob(1), Trigger::Knob, Action::Turn)
            .expect("Valid binding");
        registry
    }

    #[test]
    fn short_release() {
        let event = ControlEvent::release(0, Duration::from_millis(200));
        assert_eq!(vec![Action::Short], fired(&registry(), event), "Expected left but got right");
    }

    #[test]
    fn long_release_shadows_short() {
        let event = ControlEvent::release(0, Duration::from_millis(1500));
        assert_eq!(vec![Action::Long], fired(&registry(), event), "Expected left but got right");

        let event = ControlEvent::release(0, Duration::from_millis(3000));
        assert_eq!(vec![Action::Longer], fired(&registry(), event), "Expected left but got right");
    }

    #[test]
    fn press() {
        assert_eq!(
            vec![Action::Down],
            fired(&registry(), ControlEvent::press(0)),
            "Expected left but got right"
        );
    }

    #[test]
    fn other_sources_are_not_triggered() {
        assert!(fired(&registry(), ControlEvent::press(1)).is_empty(), "Nothing should fire");

        let knob = ControlEvent::Knob {
            id: 0,
            value: 10,
            direction: KnobDirection::Clockwise,
        };
        assert!(fired(&registry(), knob).is_empty(), "Nothing should fire");
    }

    #[test]
    fn knob() {
        let knob = ControlEvent::Knob {
            id: 1,
            value: 10,
            direction: KnobDirection::Unknown,
        };
        assert_eq!(vec![Action::Turn], fired(&registry(), knob), "Expected left but got right");
    }

    #[test]
    fn registration_order_is_kept() {
        let mut registry: ControlRegistry<Action, 4> = ControlRegistry::new();
        registry
            .register(ControlSource::Button(2), Trigger::press(), Action::Long)
            .expect("Valid binding");
        registry
            .register(ControlSource::Button(2), Trigger::press(), Action::Short)
            .expect("Valid binding");

        assert_eq!(
            vec![Action::Long, Action::Short],
            fired(&registry, ControlEvent::press(2)),
            "Expected left but got right"
        );
    }

    #[test]
    fn invalid_bindings() {
        let mut registry: ControlRegistry<Action, 1> = ControlRegistry::new();

        assert_eq!(
            Err(RegistrationError::UnknownSource),
            registry.register(ControlSource::Button(BUTTON_COUNT), Trigger::press(), Action::Short),
            "Expected left but got right"
        );
        assert_eq!(
            Err(RegistrationError::UnknownSource),
            registry.register(ControlSource::Knob(KNOB_COUNT), Trigger::Knob, Action::Turn),
            "Expected left but got right"
        );
        assert_eq!(
            Err(RegistrationError::WrongTrigger),
            registry.register(ControlSource::Knob(0), Trigger::press(), Action::Turn),
            "Expected left but got right"
        );
        assert_eq!(
            Err(RegistrationError::HoldOnPress),
            registry.register(
                ControlSource::Button(0),
                Trigger::Button {
                    edge: ButtonEdge::Pressed,
                    min_hold: Duration::from_millis(10),
                },
                Action::Short
            ),
            "Expected left but got right"
        );
        assert!(registry.is_empty(), "Nothing should be registered");

        registry
            .register(ControlSource::Button(0), Trigger::press(), Action::Short)
            .expect("Valid binding");
        assert_eq!(
            Err(RegistrationError::RegistryFull),
            registry.register(ControlSource::Button(1), Trigger::press(), Action::Short),
            "Expected left but got right"
        );
    }

    #[test]
    fn knob_direction() {
        assert_eq!(KnobDirection::Clockwise, KnobDirection::between(10, 20));
        assert_eq!(KnobDirection::CounterClockwise, KnobDirection::between(20, 10));
        assert_eq!(KnobDirection::Unknown, KnobDirection::between(20, 20));
    }
}
