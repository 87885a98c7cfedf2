//! Closest-slot selection.

use chrono::NaiveTime;

use crate::ontopo::AvailableSlot;

/// Pick the slot nearest the requested time.
///
/// Distance is absolute minutes; ties go to the earlier slot time, never to
/// list order, so the choice is deterministic for any input ordering.
pub fn select_slot(requested: NaiveTime, slots: &[AvailableSlot]) -> Option<&AvailableSlot> {
    slots
        .iter()
        .min_by_key(|slot| ((slot.time - requested).num_minutes().abs(), slot.time))
}
