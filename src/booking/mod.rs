//! Reservation pipeline: resolution, slot selection, outcomes.

pub mod orchestrator;
pub mod outcome;
pub mod resolver;
pub mod slots;

pub use orchestrator::BookingPipeline;
pub use outcome::{call_script, display_date, display_time, FailureKind, ReservationOutcome};
pub use resolver::resolve_venue;
pub use slots::select_slot;
