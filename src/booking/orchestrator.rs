//! The reservation pipeline: raw text in, exactly one outcome out.
//!
//! Stages run strictly forward, Parsing through Finalizing. Any stage error
//! short-circuits into `ReservationOutcome::Failed` naming that stage; the
//! pipeline itself never returns `Err` and never partially books. At most
//! three upstream calls happen per run (login, search, availability) and the
//! state-changing checkout step is always left to the diner, so dropping the
//! run future at any await point is safe.

use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::booking::outcome::{call_script, display_date, display_time, FailureKind, ReservationOutcome};
use crate::booking::resolver::resolve_venue;
use crate::booking::slots::select_slot;
use crate::calendar::{google_calendar_url, CalendarEvent, EventStore};
use crate::config::OntopoConfig;
use crate::error::BookingError;
use crate::intent::{ParserOptions, RequestParser, ReservationIntent};
use crate::ontopo::{checkout_url, Availability, AvailabilityQuery, ReservationApi, VenueRecord};
use crate::profile::UserProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Parsing,
    Resolving,
    CheckingAvailability,
    Selecting,
    Finalizing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Parsing => "parsing the request",
            Stage::Resolving => "resolving the venue",
            Stage::CheckingAvailability => "checking availability",
            Stage::Selecting => "selecting a slot",
            Stage::Finalizing => "finalizing",
        };
        f.write_str(name)
    }
}

/// Drives one reservation request end to end.
pub struct BookingPipeline {
    api: Arc<dyn ReservationApi>,
    parser: RequestParser,
    profile: UserProfile,
    checkout_base: String,
    distributor_id: String,
    events: Option<EventStore>,
}

impl BookingPipeline {
    /// A pipeline using the profile's saved preferences as parser fallbacks.
    pub fn new(api: Arc<dyn ReservationApi>, config: &OntopoConfig, profile: UserProfile) -> Self {
        let parser = RequestParser::new(ParserOptions::from_profile(&profile));
        Self {
            api,
            parser,
            profile,
            checkout_base: config.base_url.clone(),
            distributor_id: config.distributor_id.clone(),
            events: None,
        }
    }

    /// Save confirmed reservations to a local event store. Saving is
    /// best-effort: a store failure is logged and never fails the run.
    pub fn with_event_store(mut self, events: EventStore) -> Self {
        self.events = Some(events);
        self
    }

    /// Run one request to a terminal outcome. Never errors: every failure
    /// becomes `ReservationOutcome::Failed` naming the stage that broke.
    pub async fn run(&self, text: &str, reference_now: NaiveDateTime) -> ReservationOutcome {
        match self.drive(text, reference_now).await {
            Ok(outcome) => outcome,
            Err((stage, err)) => {
                tracing::warn!(stage = %stage, error = %err, "reservation run failed");
                ReservationOutcome::Failed {
                    kind: FailureKind::from(&err),
                    message: format!("{stage} failed: {err}"),
                }
            }
        }
    }

    async fn drive(
        &self,
        text: &str,
        reference_now: NaiveDateTime,
    ) -> Result<ReservationOutcome, (Stage, BookingError)> {
        tracing::debug!(stage = %Stage::Parsing, text, "starting reservation run");
        let intent = self
            .parser
            .parse(text, reference_now)
            .map_err(|e| (Stage::Parsing, BookingError::from(e)))?;
        tracing::info!(
            venue_query = %intent.venue_query,
            party_size = intent.party_size,
            date = %intent.date,
            time = %intent.time,
            "parsed reservation intent"
        );

        tracing::debug!(stage = %Stage::Resolving, query = %intent.venue_query, "resolving venue");
        let venue = resolve_venue(self.api.as_ref(), &intent.venue_query)
            .await
            .map_err(|e| (Stage::Resolving, e))?;

        let query = AvailabilityQuery {
            venue_id: venue.id.clone(),
            date: intent.date,
            time: intent.time,
            party_size: intent.party_size,
        };
        tracing::debug!(
            stage = %Stage::CheckingAvailability,
            venue_id = %query.venue_id,
            date = %query.wire_date(),
            time = %query.wire_time(),
            "checking availability"
        );
        let availability = self
            .api
            .check_availability(&query)
            .await
            .map_err(|e| (Stage::CheckingAvailability, BookingError::from(e)))?;

        Ok(self.settle(intent, venue, query, availability).await)
    }

    /// Selecting and Finalizing: pure resolution, always yields an outcome.
    async fn settle(
        &self,
        intent: ReservationIntent,
        venue: VenueRecord,
        query: AvailabilityQuery,
        availability: Availability,
    ) -> ReservationOutcome {
        let (slots, availability_phone) = match availability {
            Availability::WaitingList => {
                tracing::info!(venue = %venue.name, "venue is full, waiting list open");
                let checkout =
                    checkout_url(&self.checkout_base, &self.distributor_id, &query, None);
                return ReservationOutcome::WaitingList {
                    reason: format!(
                        "{} is fully booked for this request; the waiting list is open",
                        venue.name
                    ),
                    venue,
                    date: intent.date,
                    time: intent.time,
                    party_size: intent.party_size,
                    checkout_url: checkout,
                };
            }
            Availability::Slots { slots, phone } => (slots, phone),
        };

        tracing::debug!(stage = %Stage::Selecting, offered = slots.len(), "selecting a slot");
        let Some(slot) = select_slot(intent.time, &slots) else {
            return self.no_slots(intent, venue, availability_phone);
        };

        tracing::debug!(stage = %Stage::Finalizing, slot = %slot.time, "building checkout link");
        let checkout = checkout_url(&self.checkout_base, &self.distributor_id, &query, Some(slot));
        let calendar = google_calendar_url(
            &venue.name,
            &venue.address,
            intent.date,
            slot.time,
            intent.party_size,
        );
        self.record_event(&venue, intent.date, slot.time, intent.party_size, &checkout)
            .await;

        tracing::info!(venue = %venue.name, slot = %slot.time, "reservation ready");
        ReservationOutcome::Confirmed {
            slot: slot.clone(),
            venue,
            date: intent.date,
            party_size: intent.party_size,
            checkout_url: checkout,
            calendar_url: calendar,
        }
    }

    /// No bookable slot: phone fallback when a number is known, otherwise a
    /// terminal no-availability failure.
    fn no_slots(
        &self,
        intent: ReservationIntent,
        venue: VenueRecord,
        availability_phone: Option<String>,
    ) -> ReservationOutcome {
        // The venue record's number is the curated one; the availability
        // payload's is a fallback.
        match venue.phone.clone().or(availability_phone) {
            Some(number) => {
                tracing::info!(venue = %venue.name, "no online slots, venue books by phone");
                let script =
                    call_script(&self.profile, intent.party_size, intent.date, intent.time);
                ReservationOutcome::PhoneRequired {
                    phone_number: number,
                    call_script: script,
                    venue,
                    date: intent.date,
                    time: intent.time,
                    party_size: intent.party_size,
                }
            }
            None => {
                tracing::info!(venue = %venue.name, "no availability and no phone fallback");
                ReservationOutcome::Failed {
                    kind: FailureKind::NoAvailability,
                    message: format!(
                        "No availability at {} on {} at {} for {}.",
                        venue.name,
                        display_date(intent.date),
                        display_time(intent.time),
                        intent.party_size
                    ),
                }
            }
        }
    }

    async fn record_event(
        &self,
        venue: &VenueRecord,
        date: NaiveDate,
        time: NaiveTime,
        party_size: u32,
        checkout_url: &str,
    ) {
        let Some(store) = &self.events else { return };
        let event = CalendarEvent::dinner(
            &venue.name,
            &venue.address,
            date,
            time,
            party_size,
            checkout_url,
        );
        if let Err(err) = store.append(event).await {
            tracing::warn!(error = %err, "could not save the reservation locally");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use crate::error::OntopoError;
    use crate::ontopo::AvailableSlot;

    use super::*;

    enum Script {
        Slots(Vec<AvailableSlot>, Option<String>),
        Waiting,
        TimedOut,
    }

    struct ScriptedApi {
        venues: Vec<VenueRecord>,
        availability: Script,
        search_calls: AtomicUsize,
        availability_calls: AtomicUsize,
    }

    impl ScriptedApi {
        fn new(venues: Vec<VenueRecord>, availability: Script) -> Self {
            Self {
                venues,
                availability,
                search_calls: AtomicUsize::new(0),
                availability_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ReservationApi for ScriptedApi {
        async fn search_venues(&self, _query: &str) -> Result<Vec<VenueRecord>, OntopoError> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.venues.clone())
        }

        async fn check_availability(
            &self,
            _query: &AvailabilityQuery,
        ) -> Result<Availability, OntopoError> {
            self.availability_calls.fetch_add(1, Ordering::SeqCst);
            match &self.availability {
                Script::Slots(slots, phone) => Ok(Availability::Slots {
                    slots: slots.clone(),
                    phone: phone.clone(),
                }),
                Script::Waiting => Ok(Availability::WaitingList),
                Script::TimedOut => Err(OntopoError::Unavailable {
                    reason: "timed out after 8s".to_string(),
                }),
            }
        }
    }

    fn config() -> OntopoConfig {
        OntopoConfig {
            base_url: "https://ontopo.co.il".to_string(),
            distributor_id: "15171493".to_string(),
            distributor_version: "7738".to_string(),
            timeout: std::time::Duration::from_secs(8),
            search_limit: 10,
        }
    }

    fn prozdor(phone: Option<&str>) -> VenueRecord {
        VenueRecord {
            id: "v-prozdor".to_string(),
            name: "Prozdor".to_string(),
            address: "157 Yigal Alon St, Tel Aviv".to_string(),
            area: "Tel Aviv".to_string(),
            phone: phone.map(str::to_string),
        }
    }

    fn slot(h: u32, m: u32) -> AvailableSlot {
        AvailableSlot {
            time: NaiveTime::from_hms_opt(h, m, 0).unwrap(),
            id: Some(format!("s-{h:02}{m:02}")),
            label: None,
        }
    }

    fn thursday_afternoon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 6)
            .unwrap()
            .and_hms_opt(14, 0, 0)
            .unwrap()
    }

    fn pipeline(api: Arc<ScriptedApi>) -> BookingPipeline {
        BookingPipeline::new(api, &config(), UserProfile::default())
    }

    #[tokio::test]
    async fn tonight_request_confirms_the_exact_slot() {
        let api = Arc::new(ScriptedApi::new(
            vec![prozdor(None)],
            Script::Slots(vec![slot(20, 0)], None),
        ));
        let outcome = pipeline(api.clone())
            .run("book 2 tonight 8pm at Prozdor", thursday_afternoon())
            .await;

        let ReservationOutcome::Confirmed {
            venue,
            date,
            party_size,
            slot,
            checkout_url,
            calendar_url,
        } = outcome
        else {
            panic!("expected a confirmed outcome");
        };
        assert_eq!(venue.id, "v-prozdor");
        assert_eq!(date, NaiveDate::from_ymd_opt(2025, 3, 6).unwrap());
        assert_eq!(party_size, 2);
        assert_eq!(slot.time, NaiveTime::from_hms_opt(20, 0, 0).unwrap());
        assert!(checkout_url.contains("venue_id=v-prozdor"));
        assert!(checkout_url.contains("20250306"));
        assert!(calendar_url.contains("calendar.google.com"));

        assert_eq!(api.search_calls.load(Ordering::SeqCst), 1);
        assert_eq!(api.availability_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn nearby_slot_overrides_the_requested_time() {
        let api = Arc::new(ScriptedApi::new(
            vec![prozdor(None)],
            Script::Slots(vec![slot(18, 0), slot(20, 30)], None),
        ));
        let outcome = pipeline(api)
            .run("book 2 tonight 8pm at Prozdor", thursday_afternoon())
            .await;

        let ReservationOutcome::Confirmed { slot, checkout_url, .. } = outcome else {
            panic!("expected a confirmed outcome");
        };
        assert_eq!(slot.time, NaiveTime::from_hms_opt(20, 30, 0).unwrap());
        assert!(checkout_url.contains("time=2030"));
        assert!(checkout_url.contains("slot_id=s-2030"));
    }

    #[tokio::test]
    async fn waiting_list_signal_yields_the_waiting_list_outcome() {
        let api = Arc::new(ScriptedApi::new(vec![prozdor(None)], Script::Waiting));
        let outcome = pipeline(api)
            .run("book 2 tonight 8pm at Prozdor", thursday_afternoon())
            .await;

        let ReservationOutcome::WaitingList { reason, checkout_url, .. } = outcome else {
            panic!("expected a waiting-list outcome");
        };
        assert!(reason.contains("Prozdor"));
        assert!(checkout_url.contains("venue_id=v-prozdor"));
    }

    #[tokio::test]
    async fn no_slots_with_a_venue_phone_asks_for_a_call() {
        let api = Arc::new(ScriptedApi::new(
            vec![prozdor(Some("+972-3-555-1111"))],
            Script::Slots(Vec::new(), Some("+972-3-555-2222".to_string())),
        ));
        let outcome = pipeline(api)
            .run("book 2 tonight 8pm at Prozdor", thursday_afternoon())
            .await;

        let ReservationOutcome::PhoneRequired {
            phone_number,
            call_script,
            ..
        } = outcome
        else {
            panic!("expected a phone-required outcome");
        };
        // The curated venue number beats the availability payload's.
        assert_eq!(phone_number, "+972-3-555-1111");
        assert!(call_script.contains("Thursday, March 6"));
        assert!(call_script.contains("20:00"));
        assert!(call_script.contains("2 people"));
        assert!(call_script.contains("Devin Pillemer"));
    }

    #[tokio::test]
    async fn availability_phone_is_used_when_the_venue_has_none() {
        let api = Arc::new(ScriptedApi::new(
            vec![prozdor(None)],
            Script::Slots(Vec::new(), Some("+972-3-555-2222".to_string())),
        ));
        let outcome = pipeline(api)
            .run("book 2 tonight 8pm at Prozdor", thursday_afternoon())
            .await;

        let ReservationOutcome::PhoneRequired { phone_number, .. } = outcome else {
            panic!("expected a phone-required outcome");
        };
        assert_eq!(phone_number, "+972-3-555-2222");
    }

    #[tokio::test]
    async fn no_slots_and_no_phone_is_a_no_availability_failure() {
        let api = Arc::new(ScriptedApi::new(
            vec![prozdor(None)],
            Script::Slots(Vec::new(), None),
        ));
        let outcome = pipeline(api)
            .run("book 2 tonight 8pm at Prozdor", thursday_afternoon())
            .await;

        let ReservationOutcome::Failed { kind, message } = outcome else {
            panic!("expected a failed outcome");
        };
        assert_eq!(kind, FailureKind::NoAvailability);
        assert_eq!(
            message,
            "No availability at Prozdor on Thursday, March 6 at 20:00 for 2."
        );
    }

    #[tokio::test]
    async fn upstream_timeout_fails_without_a_retry() {
        let api = Arc::new(ScriptedApi::new(vec![prozdor(None)], Script::TimedOut));
        let outcome = pipeline(api.clone())
            .run("book 2 tonight 8pm at Prozdor", thursday_afternoon())
            .await;

        let ReservationOutcome::Failed { kind, message } = outcome else {
            panic!("expected a failed outcome");
        };
        assert_eq!(kind, FailureKind::UpstreamUnavailable);
        assert!(message.contains("checking availability"));
        assert_eq!(api.availability_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unparsable_text_fails_before_any_upstream_call() {
        let api = Arc::new(ScriptedApi::new(
            vec![prozdor(None)],
            Script::Slots(vec![slot(20, 0)], None),
        ));
        // A profile supplies party size and time fallbacks, so only a
        // missing venue can break parsing.
        let outcome = pipeline(api.clone())
            .run("book a table tonight", thursday_afternoon())
            .await;

        let ReservationOutcome::Failed { kind, message } = outcome else {
            panic!("expected a failed outcome");
        };
        assert_eq!(kind, FailureKind::Parse);
        assert!(message.contains("parsing the request"));
        assert_eq!(api.search_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_venue_fails_before_availability() {
        let api = Arc::new(ScriptedApi::new(
            Vec::new(),
            Script::Slots(vec![slot(20, 0)], None),
        ));
        let outcome = pipeline(api.clone())
            .run("book 2 tonight 8pm at Prozdor", thursday_afternoon())
            .await;

        let ReservationOutcome::Failed { kind, message } = outcome else {
            panic!("expected a failed outcome");
        };
        assert_eq!(kind, FailureKind::VenueNotFound);
        assert!(message.contains("resolving the venue"));
        assert_eq!(api.availability_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn confirmed_runs_are_saved_to_the_event_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = EventStore::new(dir.path().join("events.json"));
        let api = Arc::new(ScriptedApi::new(
            vec![prozdor(None)],
            Script::Slots(vec![slot(20, 0)], None),
        ));

        let outcome = pipeline(api)
            .with_event_store(store.clone())
            .run("book 2 tonight 8pm at Prozdor", thursday_afternoon())
            .await;
        assert!(matches!(outcome, ReservationOutcome::Confirmed { .. }));

        let events = store.load().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].venue, "Prozdor");
        assert_eq!(events[0].party_size, 2);
    }
}
