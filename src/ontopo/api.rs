//! The seam between the booking pipeline and the live platform client.

use async_trait::async_trait;

use crate::error::OntopoError;
use crate::ontopo::types::{Availability, AvailabilityQuery, VenueRecord};

/// Operations the reservation pipeline needs from the booking platform.
///
/// The live implementation is [`OntopoClient`](crate::ontopo::OntopoClient);
/// tests substitute in-memory stand-ins.
#[async_trait]
pub trait ReservationApi: Send + Sync {
    /// Search venues by free-text query. Results keep upstream relevance
    /// order; the first entry is the best match.
    async fn search_venues(&self, query: &str) -> Result<Vec<VenueRecord>, OntopoError>;

    /// Check availability for one (venue, date, time, party size) tuple.
    async fn check_availability(
        &self,
        query: &AvailabilityQuery,
    ) -> Result<Availability, OntopoError>;
}
