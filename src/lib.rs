//! Bookaboo: natural-language restaurant reservations for Israel.
//!
//! One sentence in ("book 2 tonight 8pm at Prozdor"), one terminal outcome
//! out: a checkout link, a waiting-list entry, a phone script, or a failure
//! naming the stage that broke. The crate drives the Ontopo booking
//! platform's anonymous three-call protocol and never completes a booking
//! itself; the checkout step always stays with the diner.

pub mod booking;
pub mod calendar;
pub mod cli;
pub mod config;
pub mod error;
pub mod intent;
pub mod notify;
pub mod ontopo;
pub mod profile;
pub mod server;

pub use booking::{BookingPipeline, FailureKind, ReservationOutcome};
pub use config::Config;
pub use error::{BookingError, OntopoError, ParseError};
pub use intent::{RequestParser, ReservationIntent};
pub use ontopo::{OntopoClient, ReservationApi};
pub use profile::UserProfile;
