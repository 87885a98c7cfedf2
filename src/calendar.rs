//! Calendar integration: Google Calendar deep links and a local event store.
//!
//! The deep link is pure string construction. The store is an append-only
//! JSON file at `<config dir>/bookaboo/events.json`; a missing or corrupt
//! store reads as empty so a bad file never blocks a booking.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::profile::app_config_dir;

const EVENTS_FILE: &str = "events.json";
const RESERVATION_HOURS: i64 = 2;

/// Build a Google Calendar "create event" URL with every field pre-filled.
///
/// Times are rendered naive, without a zone suffix: the reservation is at
/// the venue's local wall-clock time and Google applies the viewer's zone.
pub fn google_calendar_url(
    venue_name: &str,
    address: &str,
    date: NaiveDate,
    time: NaiveTime,
    party_size: u32,
) -> String {
    let start = date.and_time(time);
    let end = start + Duration::hours(RESERVATION_HOURS);
    let dates = format!("{}/{}", start.format("%Y%m%dT%H%M%S"), end.format("%Y%m%dT%H%M%S"));

    let params = [
        ("action", "TEMPLATE".to_string()),
        ("text", format!("Dinner at {venue_name}")),
        ("dates", dates),
        ("details", format!("Party of {party_size}, booked via Bookaboo")),
        ("location", address.to_string()),
    ];
    let query = params
        .iter()
        .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&");

    format!("https://calendar.google.com/calendar/render?{query}")
}

/// One saved reservation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: Uuid,
    pub title: String,
    pub venue: String,
    pub address: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub party_size: u32,
    pub checkout_url: String,
    pub created_at: DateTime<Utc>,
}

impl CalendarEvent {
    pub fn dinner(
        venue_name: &str,
        address: &str,
        date: NaiveDate,
        time: NaiveTime,
        party_size: u32,
        checkout_url: &str,
    ) -> Self {
        let start = date.and_time(time);
        Self {
            id: Uuid::new_v4(),
            title: format!("Dinner at {venue_name}"),
            venue: venue_name.to_string(),
            address: address.to_string(),
            start,
            end: start + Duration::hours(RESERVATION_HOURS),
            party_size,
            checkout_url: checkout_url.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Append-only JSON store for saved reservations.
#[derive(Debug, Clone)]
pub struct EventStore {
    path: PathBuf,
}

impl EventStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// The store at the per-user default location.
    pub fn default_location() -> std::io::Result<Self> {
        let dir = app_config_dir().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no user configuration directory available",
            )
        })?;
        Ok(Self::new(dir.join(EVENTS_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All saved events, oldest first. Missing or unreadable stores read as
    /// empty.
    pub async fn load(&self) -> Vec<CalendarEvent> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(events) => events,
                Err(err) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %err,
                        "event store is corrupt, reading as empty"
                    );
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        }
    }

    pub async fn append(&self, event: CalendarEvent) -> std::io::Result<()> {
        let mut events = self.load().await;
        events.push(event);

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let contents = serde_json::to_string_pretty(&events)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
        tokio::fs::write(&self.path, contents).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&self.path, perms).await?;
        }

        Ok(())
    }
}
