//! Ontopo platform integration: session, venue search, availability.

pub mod api;
pub mod client;
pub mod types;

pub use api::ReservationApi;
pub use client::OntopoClient;
pub use types::{checkout_url, Availability, AvailabilityQuery, AvailableSlot, VenueRecord};
