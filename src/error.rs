//! Error taxonomies for the reservation pipeline.
//!
//! Three layers mirror the pipeline: [`ParseError`] for problems in the
//! user's request text, [`OntopoError`] for transport and contract failures
//! against the booking platform, and [`BookingError`] as the stage-tagged
//! wrapper the orchestrator maps into a terminal outcome.

use chrono::NaiveDate;
use thiserror::Error;

/// Problems understanding the user's request text.
///
/// Deterministic: the same text fails the same way every time, so these are
/// never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// No party size in the text and no fallback configured.
    #[error("could not determine party size from the request")]
    MissingPartySize,

    /// A party size was found but falls outside the accepted range.
    #[error("party size {size} is out of range (1..={max})")]
    PartySizeOutOfRange { size: i64, max: u32 },

    /// No time expression and no fallback configured.
    #[error("could not determine a reservation time from the request")]
    MissingTime,

    /// A time expression was found but is not a real clock time.
    #[error("invalid time expression \"{text}\"")]
    InvalidTime { text: String },

    /// A date expression was found but is not a real calendar date.
    #[error("invalid date expression \"{text}\"")]
    InvalidDate { text: String },

    /// An explicit date earlier than the reference date.
    #[error("requested date {date} is in the past")]
    DateInPast { date: NaiveDate },

    /// Nothing left in the text to use as a venue name.
    #[error("could not determine which venue to book")]
    MissingVenue,
}

/// Failures talking to the Ontopo platform.
#[derive(Debug, Error)]
pub enum OntopoError {
    /// Network failure or timeout before a response arrived. Transient.
    #[error("ontopo unreachable: {reason}")]
    Unavailable { reason: String },

    /// Upstream answered with a non-success status.
    #[error("ontopo returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// Upstream answered 2xx but the body violates the expected contract.
    #[error("malformed ontopo response: {reason}")]
    Malformed { reason: String },
}

impl OntopoError {
    /// Whether the failure is transport-level rather than a contract
    /// violation. The pipeline reports the two differently.
    pub fn is_transient(&self) -> bool {
        matches!(self, OntopoError::Unavailable { .. })
    }
}

/// Stage-level failure inside the reservation pipeline.
///
/// The orchestrator never propagates these to callers; it folds them into
/// the `Failed` outcome variant.
#[derive(Debug, Error)]
pub enum BookingError {
    /// The request text could not be understood.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The venue search returned no candidates.
    #[error("no venue matched \"{query}\"")]
    VenueNotFound { query: String },

    /// The platform failed underneath a pipeline stage.
    #[error(transparent)]
    Upstream(#[from] OntopoError),
}
