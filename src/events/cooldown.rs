use std::time::{Duration, Instant};

use crate::EventType;

/// Per-event-type rate limiter.
///
/// One slot per `EventType`; a type that has never fired is always open.
#[derive(Clone, Debug)]
pub struct CooldownGate {
    cooldown: Duration,
    last_fired: [Option<Instant>; EventType::COUNT],
}

impl CooldownGate {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_fired: [None; EventType::COUNT],
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// True if `event_type` may fire at `now`. Does not record anything.
    pub fn is_open(&self, event_type: EventType, now: Instant) -> bool {
        match self.last_fired[event_type.index()] {
            None => true,
            Some(last) => now.saturating_duration_since(last) > self.cooldown,
        }
    }

    /// Record a firing if the gate is open. Returns whether it fired.
    pub fn try_fire(&mut self, event_type: EventType, now: Instant) -> bool {
        if !self.is_open(event_type, now) {
            return false;
        }
        self.last_fired[event_type.index()] = Some(now);
        true
    }

    pub fn last_fired(&self, event_type: EventType) -> Option<Instant> {
        self.last_fired[event_type.index()]
    }
}
