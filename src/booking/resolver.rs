//! Venue resolution: free-text query to one concrete venue.

use crate::error::BookingError;
use crate::ontopo::{ReservationApi, VenueRecord};

/// Resolve a venue query with a single search call.
///
/// Upstream returns results in relevance order; the first record wins and a
/// multi-match is only logged. The user is never prompted to disambiguate.
pub async fn resolve_venue(
    api: &dyn ReservationApi,
    query: &str,
) -> Result<VenueRecord, BookingError> {
    let venues = api.search_venues(query).await?;
    let matches = venues.len();

    let Some(venue) = venues.into_iter().next() else {
        return Err(BookingError::VenueNotFound {
            query: query.to_string(),
        });
    };
    if matches > 1 {
        tracing::debug!(query, matches, chosen = %venue.name, "taking the best venue match");
    }
    tracing::info!(venue_id = %venue.id, venue = %venue.name, "venue resolved");
    Ok(venue)
}
