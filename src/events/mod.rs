//! Detection sets in, semantic events out.
//!
//! `EventDetector` is the only stateful stage of the pipeline. It compares each
//! detection set against the one before it and gates the resulting candidates
//! through a per-type `CooldownGate`.
//!
//! Rule order within one call is fixed:
//! person count delta, removed classes, added classes, crowding.

mod cooldown;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::{Clock, MonotonicClock};
use crate::detect::Detection;
use crate::{Event, EventType};

pub use cooldown::CooldownGate;

/// Person count at which `MultiplePeople` becomes a candidate.
pub const CROWD_THRESHOLD: usize = 3;

pub struct EventDetector {
    clock: Arc<dyn Clock>,
    gate: CooldownGate,
    previous: Vec<Detection>,
}

impl EventDetector {
    pub fn new(cooldown: Duration) -> Self {
        Self::with_clock(cooldown, Arc::new(MonotonicClock))
    }

    pub fn with_clock(cooldown: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            gate: CooldownGate::new(cooldown),
            previous: Vec::new(),
        }
    }

    /// Detection set stored by the last call.
    pub fn previous(&self) -> &[Detection] {
        &self.previous
    }

    pub fn gate(&self) -> &CooldownGate {
        &self.gate
    }

    /// Run the rules at the injected clock's current time.
    pub fn detect_now(&mut self, current: &[Detection]) -> Vec<Event> {
        let now = self.clock.now();
        self.detect(current, now)
    }

    /// Compare `current` with the previous set and emit the events whose
    /// cooldown has elapsed. `current` replaces the stored set afterwards,
    /// whether or not anything fired.
    pub fn detect(&mut self, current: &[Detection], now: Instant) -> Vec<Event> {
        let mut events = Vec::new();

        let current_people = count_people(current);
        let previous_people = count_people(&self.previous);

        let person_candidate = if current_people > previous_people {
            Some(Event::new(
                EventType::PersonEntered,
                format!(
                    "A person entered the monitored area. Total people: {}",
                    current_people
                ),
                now,
            ))
        } else if current_people < previous_people {
            Some(Event::new(
                EventType::PersonExited,
                format!(
                    "A person left the monitored area. Total people: {}",
                    current_people
                ),
                now,
            ))
        } else {
            None
        };
        if let Some(event) = person_candidate {
            emit(&mut self.gate, event, &mut events);
        }

        let current_classes = object_classes(current);
        let previous_classes = object_classes(&self.previous);

        let removed: Vec<&str> = previous_classes
            .difference(&current_classes)
            .copied()
            .collect();
        if !removed.is_empty() {
            let description = format!("Objects were removed: {}", removed.join(", "));
            let event = Event::new(EventType::ObjectPicked, description, now);
            emit(&mut self.gate, event, &mut events);
        }

        let added: Vec<&str> = current_classes
            .difference(&previous_classes)
            .copied()
            .collect();
        if !added.is_empty() {
            let description = format!("New objects detected: {}", added.join(", "));
            let event = Event::new(EventType::ObjectPlaced, description, now);
            emit(&mut self.gate, event, &mut events);
        }

        if current_people >= CROWD_THRESHOLD {
            let description = format!(
                "Multiple people detected in the area ({} people)",
                current_people
            );
            let event = Event::new(EventType::MultiplePeople, description, now);
            emit(&mut self.gate, event, &mut events);
        }

        self.previous = current.to_vec();
        events
    }
}

/// Push `event` if its type's cooldown has elapsed.
fn emit(gate: &mut CooldownGate, event: Event, out: &mut Vec<Event>) {
    if gate.try_fire(event.event_type, event.detected_at) {
        log::debug!("event {} passed cooldown", event.event_type);
        out.push(event);
    } else {
        log::debug!("event {} suppressed by cooldown", event.event_type);
    }
}

fn count_people(detections: &[Detection]) -> usize {
    detections.iter().filter(|d| d.is_person()).count()
}

fn object_classes(detections: &[Detection]) -> BTreeSet<&str> {
    detections
        .iter()
        .filter(|d| !d.is_person())
        .map(|d| d.class_name.as_str())
        .collect()
}
