//! Domain models for the Ontopo booking platform.
//!
//! The upstream wire schema is versioned and unstable; these are the strict
//! shapes the rest of the crate works with. Conversion from wire JSON
//! happens in the client, never deeper in the pipeline.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// A venue as resolved from the platform's search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueRecord {
    /// Opaque upstream identifier.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub area: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// A bookable time offered by a venue.
///
/// Valid only for the (venue, date, party size) query that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableSlot {
    pub time: NaiveTime,
    /// Upstream slot/offer id, carried into the checkout URL when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// The tuple an availability check runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityQuery {
    pub venue_id: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub party_size: u32,
}

impl AvailabilityQuery {
    /// Date as the platform expects it: `YYYYMMDD`.
    pub fn wire_date(&self) -> String {
        self.date.format("%Y%m%d").to_string()
    }

    /// Time as the platform expects it: `HHMM`, 24-hour, zero-padded.
    pub fn wire_time(&self) -> String {
        self.time.format("%H%M").to_string()
    }
}

/// Normalized result of an availability check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Availability {
    /// Whatever is bookable, possibly nothing. `phone` is the venue contact
    /// number when the response carried one.
    Slots {
        slots: Vec<AvailableSlot>,
        phone: Option<String>,
    },
    /// The venue is full but keeps a standby list.
    WaitingList,
}

/// Deep link into the platform's checkout flow.
///
/// Pure string construction: no network, and never the session token; the
/// URL is meant to be handed to the user.
pub fn checkout_url(
    base_url: &str,
    distributor_id: &str,
    query: &AvailabilityQuery,
    slot: Option<&AvailableSlot>,
) -> String {
    let time = slot.map_or_else(|| query.wire_time(), |s| s.time.format("%H%M").to_string());
    let mut params = vec![
        ("venue_id", query.venue_id.clone()),
        ("date", query.wire_date()),
        ("time", time),
        ("party_size", query.party_size.to_string()),
        ("distributor", distributor_id.to_string()),
    ];
    if let Some(id) = slot.and_then(|s| s.id.as_deref()) {
        if !id.is_empty() {
            params.push(("slot_id", id.to_string()));
        }
    }

    let query_string = params
        .iter()
        .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&");
    format!("{base_url}/reservation/checkout?{query_string}")
}
