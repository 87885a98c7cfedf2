//! Terminal reservation outcomes.
//!
//! Exactly one variant per run. The tag carries the machine-readable status
//! and every success variant carries enough context to render itself, so
//! front ends never reach back into the pipeline.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{BookingError, OntopoError};
use crate::ontopo::{AvailableSlot, VenueRecord};
use crate::profile::UserProfile;

/// Human-readable date used in scripts and terminal output.
pub fn display_date(date: NaiveDate) -> String {
    date.format("%A, %B %-d").to_string()
}

pub fn display_time(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

/// What one reservation run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReservationOutcome {
    /// A bookable slot exists; the checkout link completes the reservation.
    Confirmed {
        venue: VenueRecord,
        date: NaiveDate,
        party_size: u32,
        slot: AvailableSlot,
        checkout_url: String,
        calendar_url: String,
    },
    /// The venue is full but runs a standby list for this request.
    WaitingList {
        venue: VenueRecord,
        date: NaiveDate,
        time: NaiveTime,
        party_size: u32,
        reason: String,
        checkout_url: String,
    },
    /// No online slots, but the venue takes reservations by phone.
    PhoneRequired {
        venue: VenueRecord,
        date: NaiveDate,
        time: NaiveTime,
        party_size: u32,
        phone_number: String,
        call_script: String,
    },
    Failed {
        kind: FailureKind,
        message: String,
    },
}

impl ReservationOutcome {
    /// Whether the run ended without a usable next step for the diner.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// The platform URL carried by the outcome, when there is one.
    pub fn checkout_url(&self) -> Option<&str> {
        match self {
            Self::Confirmed { checkout_url, .. } | Self::WaitingList { checkout_url, .. } => {
                Some(checkout_url.as_str()).filter(|url| !url.is_empty())
            }
            Self::PhoneRequired { .. } | Self::Failed { .. } => None,
        }
    }
}

/// Which class of problem ended a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Parse,
    VenueNotFound,
    VenueAmbiguous,
    UpstreamUnavailable,
    UpstreamError,
    NoAvailability,
}

impl From<&BookingError> for FailureKind {
    fn from(err: &BookingError) -> Self {
        match err {
            BookingError::Parse(_) => FailureKind::Parse,
            BookingError::VenueNotFound { .. } => FailureKind::VenueNotFound,
            BookingError::Upstream(OntopoError::Unavailable { .. }) => {
                FailureKind::UpstreamUnavailable
            }
            BookingError::Upstream(_) => FailureKind::UpstreamError,
        }
    }
}

/// Render the script the diner reads out when the venue only books by phone.
pub fn call_script(
    profile: &UserProfile,
    party_size: u32,
    date: NaiveDate,
    time: NaiveTime,
) -> String {
    format!(
        "Hi, this is {}, I'd like to make a reservation for {} people on {} at {}. \
         My phone number is {}.",
        profile.full_name(),
        party_size,
        display_date(date),
        display_time(time),
        profile.phone,
    )
}
