//! Live Ontopo API client.
//!
//! Drives the platform's three-call protocol: anonymous login, venue
//! search, availability query. The wire JSON has shipped in several
//! historical shapes; every alternative observed in production is accepted
//! here and normalized into the strict domain models, so nothing upstream
//! of this file ever sees an optional-everything payload.

use async_trait::async_trait;
use chrono::NaiveTime;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::config::OntopoConfig;
use crate::error::OntopoError;
use crate::ontopo::api::ReservationApi;
use crate::ontopo::types::{Availability, AvailabilityQuery, AvailableSlot, VenueRecord};

const MAX_ERROR_BODY: usize = 500;

/// Client for one orchestration run.
///
/// The anonymous session token lives here and nowhere else: it is acquired
/// lazily on the first authenticated call, never written to disk, and dies
/// with the client.
pub struct OntopoClient {
    client: Client,
    config: OntopoConfig,
    token: RwLock<Option<SecretString>>,
}

impl OntopoClient {
    pub fn new(config: OntopoConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent())
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            config,
            token: RwLock::new(None),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/{}", self.config.base_url, path.trim_start_matches('/'))
    }

    /// Send a prepared request and decode the JSON body.
    async fn dispatch<R: for<'de> Deserialize<'de>>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<R, OntopoError> {
        let response = request.send().await.map_err(|e| {
            let reason = if e.is_timeout() {
                format!("timed out after {:?}", self.config.timeout)
            } else {
                e.to_string()
            };
            OntopoError::Unavailable { reason }
        })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(status = %status, "ontopo response");

        if !status.is_success() {
            return Err(OntopoError::Status {
                status: status.as_u16(),
                body: truncate(body),
            });
        }

        serde_json::from_str(&body).map_err(|e| OntopoError::Malformed {
            reason: format!("invalid JSON: {e}"),
        })
    }

    /// Obtain an anonymous session token.
    ///
    /// Login is stateless and idempotent upstream, so a transient failure is
    /// retried exactly once. No other call in the pipeline is ever retried.
    async fn ensure_session(&self) -> Result<SecretString, OntopoError> {
        if let Some(token) = self.token.read().await.as_ref().cloned() {
            return Ok(token);
        }

        let token = match self.login().await {
            Ok(token) => token,
            Err(err) if err.is_transient() => {
                tracing::warn!(error = %err, "anonymous login failed, retrying once");
                self.login().await?
            }
            Err(err) => return Err(err),
        };

        *self.token.write().await = Some(token.clone());
        Ok(token)
    }

    async fn login(&self) -> Result<SecretString, OntopoError> {
        let body = LoginRequest {
            distributor: &self.config.distributor_id,
            version: &self.config.distributor_version,
        };
        let response: LoginResponse = self
            .dispatch(self.client.post(self.api_url("loginAnonymously")).json(&body))
            .await?;

        let token = response.into_token().ok_or_else(|| OntopoError::Malformed {
            reason: "login response carried no session token".to_string(),
        })?;
        tracing::debug!("anonymous session established");
        Ok(SecretString::from(token))
    }

    fn bearer(token: &SecretString) -> String {
        format!("Bearer {}", token.expose_secret())
    }
}

#[async_trait]
impl ReservationApi for OntopoClient {
    async fn search_venues(&self, query: &str) -> Result<Vec<VenueRecord>, OntopoError> {
        let token = self.ensure_session().await?;
        let params = [
            ("query", query.to_string()),
            ("distributor", self.config.distributor_id.clone()),
            ("limit", self.config.search_limit.to_string()),
        ];
        let request = self
            .client
            .get(self.api_url("venue_search"))
            .query(&params)
            .header("Authorization", Self::bearer(&token));

        let value: Value = self.dispatch(request).await?;
        let venues = normalize_venues(value, query)?;
        tracing::debug!(count = venues.len(), query, "venue search");
        Ok(venues)
    }

    async fn check_availability(
        &self,
        query: &AvailabilityQuery,
    ) -> Result<Availability, OntopoError> {
        let token = self.ensure_session().await?;
        let body = AvailabilityRequest {
            venue_id: &query.venue_id,
            date: query.wire_date(),
            time: query.wire_time(),
            party_size: query.party_size,
            distributor: &self.config.distributor_id,
        };
        let request = self
            .client
            .post(self.api_url("availability_search"))
            .json(&body)
            .header("Authorization", Self::bearer(&token));

        let value: Value = self.dispatch(request).await?;
        normalize_availability(value)
    }
}

fn truncate(body: String) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body;
    }
    let mut cut = MAX_ERROR_BODY;
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &body[..cut])
}

// ---------------------------------------------------------------------------
// Wire normalization
// ---------------------------------------------------------------------------

fn normalize_venues(value: Value, query: &str) -> Result<Vec<VenueRecord>, OntopoError> {
    let raw = match value {
        Value::Array(entries) => entries,
        Value::Object(mut map) => {
            // First non-empty list under a recognized key wins; a present but
            // empty list is a valid zero-result answer.
            let mut chosen = None;
            let mut saw_empty = false;
            for key in ["venues", "results", "data"] {
                match map.get(key) {
                    Some(Value::Array(entries)) if !entries.is_empty() => {
                        chosen = Some(key);
                        break;
                    }
                    Some(Value::Array(_)) => saw_empty = true,
                    _ => {}
                }
            }
            match chosen {
                Some(key) => match map.remove(key) {
                    Some(Value::Array(entries)) => entries,
                    _ => Vec::new(),
                },
                None if saw_empty => Vec::new(),
                None => {
                    return Err(OntopoError::Malformed {
                        reason: "venue search response has no venue list".to_string(),
                    });
                }
            }
        }
        _ => {
            return Err(OntopoError::Malformed {
                reason: "venue search response is neither object nor array".to_string(),
            });
        }
    };

    let total = raw.len();
    let mut venues = Vec::with_capacity(total);
    for entry in raw {
        match serde_json::from_value::<WireVenue>(entry) {
            Ok(wire) => match wire.into_record(query) {
                Some(venue) => venues.push(venue),
                None => tracing::warn!("skipping venue entry without a usable id"),
            },
            Err(err) => tracing::warn!(error = %err, "skipping unreadable venue entry"),
        }
    }

    if venues.is_empty() && total > 0 {
        return Err(OntopoError::Malformed {
            reason: format!("none of {total} venue entries were usable"),
        });
    }
    Ok(venues)
}

fn normalize_availability(value: Value) -> Result<Availability, OntopoError> {
    let Value::Object(map) = value else {
        return Err(OntopoError::Malformed {
            reason: "availability response is not an object".to_string(),
        });
    };
    let nested = map.get("data").and_then(Value::as_object);

    let mut raw: &[Value] = &[];
    for candidate in [
        map.get("slots"),
        map.get("availableSlots"),
        map.get("available_slots"),
        map.get("times"),
        nested.and_then(|d| d.get("slots")),
    ]
    .into_iter()
    .flatten()
    {
        if let Value::Array(entries) = candidate {
            if !entries.is_empty() {
                raw = entries;
                break;
            }
        }
    }

    let mut parsed = 0usize;
    let mut slots = Vec::new();
    for entry in raw {
        let Some(obj) = entry.as_object() else {
            tracing::warn!("skipping non-object slot entry");
            continue;
        };
        let time = ["time", "hour", "start_time"]
            .iter()
            .find_map(|key| obj.get(*key).and_then(parse_slot_time));
        let Some(time) = time else {
            tracing::warn!("skipping slot entry without a usable time");
            continue;
        };
        parsed += 1;

        if !obj.get("available").and_then(Value::as_bool).unwrap_or(true) {
            continue;
        }
        let id = ["id", "slot_id", "offerId"]
            .iter()
            .find_map(|key| obj.get(*key).and_then(value_to_string));
        let label = ["label", "display"]
            .iter()
            .find_map(|key| obj.get(*key).and_then(Value::as_str))
            .map(str::to_string);
        slots.push(AvailableSlot { time, id, label });
    }

    if parsed == 0 && !raw.is_empty() {
        return Err(OntopoError::Malformed {
            reason: format!("none of {} slot entries were usable", raw.len()),
        });
    }

    let waiting = truthy(map.get("waitingList"))
        || truthy(map.get("waiting_list"))
        || truthy(nested.and_then(|d| d.get("waitingList")));
    if slots.is_empty() && waiting {
        return Ok(Availability::WaitingList);
    }

    let phone = ["phoneNumber", "phone_number", "phone"].iter().find_map(|key| {
        map.get(*key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .filter(|p| !p.is_empty())
    });
    Ok(Availability::Slots { slots, phone })
}

/// Slot times arrive as "HHMM", "HH:MM", "HH:MM:SS", or bare numbers.
fn parse_slot_time(value: &Value) -> Option<NaiveTime> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    let hhmm = match digits.len() {
        3 => format!("0{digits}"),
        4 => digits,
        6 => digits[..4].to_string(),
        _ => return None,
    };
    NaiveTime::parse_from_str(&hhmm, "%H%M").ok()
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Ontopo wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    distributor: &'a str,
    version: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: Option<String>,
    access_token: Option<String>,
    #[serde(rename = "sessionToken")]
    session_token: Option<String>,
    data: Option<LoginEnvelope>,
}

#[derive(Debug, Deserialize)]
struct LoginEnvelope {
    token: Option<String>,
}

impl LoginResponse {
    fn into_token(self) -> Option<String> {
        self.token
            .or(self.access_token)
            .or(self.session_token)
            .or(self.data.and_then(|d| d.token))
            .filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Serialize)]
struct AvailabilityRequest<'a> {
    venue_id: &'a str,
    date: String,
    time: String,
    party_size: u32,
    distributor: &'a str,
}

#[derive(Debug, Deserialize)]
struct WireVenue {
    id: Option<String>,
    venue_id: Option<String>,
    #[serde(rename = "venueId")]
    venue_id_camel: Option<String>,
    #[serde(rename = "_id")]
    raw_id: Option<Value>,
    name: Option<String>,
    title: Option<String>,
    address: Option<String>,
    #[serde(rename = "fullAddress")]
    full_address: Option<String>,
    location: Option<WireLocation>,
    area: Option<String>,
    neighborhood: Option<String>,
    phone: Option<String>,
    #[serde(rename = "phoneNumber")]
    phone_number: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireLocation {
    address: Option<String>,
}

impl WireVenue {
    fn into_record(self, query: &str) -> Option<VenueRecord> {
        let id = self
            .id
            .or(self.venue_id)
            .or(self.venue_id_camel)
            .or_else(|| self.raw_id.as_ref().and_then(value_to_string))
            .filter(|id| !id.is_empty())?;
        let name = self
            .name
            .or(self.title)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| query.to_string());
        let address = self
            .address
            .or(self.location.and_then(|l| l.address))
            .or(self.full_address)
            .unwrap_or_default();
        let area = self.area.or(self.neighborhood).unwrap_or_default();
        let phone = self.phone.or(self.phone_number).filter(|p| !p.is_empty());

        Some(VenueRecord {
            id,
            name,
            address,
            area,
            phone,
        })
    }
}
