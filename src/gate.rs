//! Per-speaker turn admission control.
//!
//! At most one utterance per speaker may be in flight through the turn
//! pipeline at a time. Admission is a compare-exchange on a per-speaker
//! flag; the guard returned on success clears the flag when dropped, so
//! every exit path of a turn releases the speaker.

use crate::pipeline::messages::SpeakerId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Registry of per-speaker in-flight flags for one voice session.
#[derive(Default)]
pub struct ProcessingGate {
    slots: Mutex<HashMap<SpeakerId, Arc<AtomicBool>>>,
}

impl ProcessingGate {
    /// Create an empty gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the admission slot for a speaker.
    pub fn slot(&self, speaker: SpeakerId) -> SpeakerSlot {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let flag = Arc::clone(slots.entry(speaker).or_default());
        SpeakerSlot { flag }
    }
}

/// Admission handle for one speaker. Cheap to clone.
#[derive(Clone)]
pub struct SpeakerSlot {
    flag: Arc<AtomicBool>,
}

impl SpeakerSlot {
    /// Whether a turn for this speaker is currently in flight.
    pub fn is_in_flight(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Try to claim the slot. Returns a release-on-drop guard on success,
    /// `None` when a turn is already in flight.
    pub fn try_admit(&self) -> Option<InFlightGuard> {
        self.flag
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| InFlightGuard {
                flag: Arc::clone(&self.flag),
            })
    }
}

/// Clears the speaker's in-flight flag on drop.
pub struct InFlightGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn slot_admits_one_turn_at_a_time() {
        let gate = ProcessingGate::new();
        let slot = gate.slot(1);

        let guard = slot.try_admit();
        assert!(guard.is_some());
        assert!(slot.is_in_flight());

        // Second admission for the same speaker is refused.
        assert!(slot.try_admit().is_none());

        drop(guard);
        assert!(!slot.is_in_flight());
        assert!(slot.try_admit().is_some());
    }

    #[test]
    fn slots_are_independent_per_speaker() {
        let gate = ProcessingGate::new();
        let a = gate.slot(1);
        let b = gate.slot(2);

        let _guard_a = a.try_admit().unwrap();
        assert!(a.is_in_flight());
        assert!(!b.is_in_flight());
        assert!(b.try_admit().is_some());
    }

    #[test]
    fn slot_is_shared_across_lookups() {
        let gate = ProcessingGate::new();
        let first = gate.slot(9);
        let second = gate.slot(9);

        let _guard = first.try_admit().unwrap();
        assert!(second.is_in_flight());
        assert!(second.try_admit().is_none());
    }

    #[test]
    fn guard_releases_even_when_dropped_by_unwind() {
        let gate = ProcessingGate::new();
        let slot = gate.slot(3);

        let slot_clone = slot.clone();
        let result = std::panic::catch_unwind(move || {
            let _guard = slot_clone.try_admit().unwrap();
            panic!("turn blew up");
        });
        assert!(result.is_err());
        assert!(!slot.is_in_flight());
    }
}
