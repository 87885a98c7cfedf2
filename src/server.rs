//! REST gateway over the reservation pipeline.
//!
//! Thin marshaling only: handlers validate the request body, call into the
//! pipeline or the platform client, and serialize the result. A reservation
//! that ends in `Failed` is still HTTP 200 with the tagged outcome; non-2xx
//! statuses are reserved for bad requests, auth, and upstream transport.
//!
//! API-key auth is opt-in: requests must carry `X-API-Key` only when a key
//! is configured.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{NaiveDate, NaiveTime};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::booking::{BookingPipeline, ReservationOutcome};
use crate::calendar::{CalendarEvent, EventStore};
use crate::config::{Config, OntopoConfig};
use crate::error::OntopoError;
use crate::ontopo::{Availability, AvailabilityQuery, ReservationApi, VenueRecord};
use crate::profile::UserProfile;

/// Builds one platform client per incoming request.
pub type ApiFactory = Arc<dyn Fn() -> Arc<dyn ReservationApi> + Send + Sync>;

/// Shared state for the gateway.
///
/// Holds a client factory rather than a client: every request gets its own
/// [`ReservationApi`] instance, so the anonymous session credential lives
/// exactly as long as one orchestration run and is never shared across
/// requests.
#[derive(Clone)]
pub struct AppState {
    api_factory: ApiFactory,
    ontopo: OntopoConfig,
    profile: UserProfile,
    events: EventStore,
}

impl AppState {
    pub fn new(
        api_factory: ApiFactory,
        config: &Config,
        profile: UserProfile,
        events: EventStore,
    ) -> Self {
        Self {
            api_factory,
            ontopo: config.ontopo.clone(),
            profile,
            events,
        }
    }

    fn api(&self) -> Arc<dyn ReservationApi> {
        (self.api_factory)()
    }

    fn pipeline(&self) -> BookingPipeline {
        BookingPipeline::new(self.api(), &self.ontopo, self.profile.clone())
            .with_event_store(self.events.clone())
    }
}

/// The reservation REST server.
pub struct BookingServer;

impl BookingServer {
    /// Build the router. `api_key = None` leaves every route open.
    pub fn router(state: AppState, api_key: Option<SecretString>) -> Router {
        Router::new()
            // Keyed routes: auth applies only to what is routed so far.
            .route("/reserve", post(reserve))
            .route("/search", post(search))
            .route("/availability", post(availability))
            .route("/reservations", get(list_reservations))
            .route_layer(axum::middleware::from_fn_with_state(
                api_key,
                api_key_middleware,
            ))
            // Health stays unauthenticated for probes.
            .route("/health", get(health))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind and serve until the process is stopped.
    pub async fn start(config: &Config, state: AppState) -> anyhow::Result<()> {
        let router = Self::router(state, config.server.api_key.clone());
        let addr = format!("{}:{}", config.server.host, config.server.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!(%addr, "bookaboo REST gateway listening");
        axum::serve(listener, router).await?;
        Ok(())
    }
}

/// Rejects requests without the configured `X-API-Key`. A missing
/// configuration means auth is disabled.
async fn api_key_middleware(
    State(expected): State<Option<SecretString>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if let Some(expected) = &expected {
        let provided = request
            .headers()
            .get("x-api-key")
            .and_then(|value| value.to_str().ok());
        if provided != Some(expected.expose_secret()) {
            return Err(StatusCode::UNAUTHORIZED);
        }
    }
    Ok(next.run(request).await)
}

// -- Handlers --

async fn health() -> Json<Value> {
    Json(json!({"status": "ok", "service": "bookaboo"}))
}

#[derive(Debug, Deserialize)]
struct ReserveRequest {
    text: String,
}

async fn reserve(
    State(state): State<AppState>,
    Json(body): Json<ReserveRequest>,
) -> Result<Json<ReservationOutcome>, (StatusCode, Json<Value>)> {
    if body.text.trim().is_empty() {
        return Err(bad_request("request text cannot be empty"));
    }
    let now = chrono::Local::now().naive_local();
    let outcome = state.pipeline().run(&body.text, now).await;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: String,
}

async fn search(
    State(state): State<AppState>,
    Json(body): Json<SearchRequest>,
) -> Result<Json<Vec<VenueRecord>>, (StatusCode, Json<Value>)> {
    let query = body.query.trim();
    if query.is_empty() {
        return Err(bad_request("search query cannot be empty"));
    }
    let venues = state
        .api()
        .search_venues(query)
        .await
        .map_err(upstream_error)?;
    Ok(Json(venues))
}

#[derive(Debug, Deserialize)]
struct AvailabilityRequest {
    venue_id: String,
    /// `YYYYMMDD`, as the booking platform spells dates.
    date: String,
    /// `HHMM` or `HH:MM`, 24-hour.
    time: String,
    #[serde(default = "default_party_size")]
    party_size: u32,
}

fn default_party_size() -> u32 {
    2
}

async fn availability(
    State(state): State<AppState>,
    Json(body): Json<AvailabilityRequest>,
) -> Result<Json<Availability>, (StatusCode, Json<Value>)> {
    let date = NaiveDate::parse_from_str(&body.date, "%Y%m%d")
        .map_err(|_| bad_request("date must be YYYYMMDD"))?;
    let mut hhmm = body.time.replace(':', "");
    if hhmm.len() == 3 {
        hhmm.insert(0, '0');
    }
    let time = NaiveTime::parse_from_str(&hhmm, "%H%M")
        .map_err(|_| bad_request("time must be HHMM, 24-hour"))?;
    if body.party_size == 0 {
        return Err(bad_request("party_size must be at least 1"));
    }

    let query = AvailabilityQuery {
        venue_id: body.venue_id,
        date,
        time,
        party_size: body.party_size,
    };
    let availability = state
        .api()
        .check_availability(&query)
        .await
        .map_err(upstream_error)?;
    Ok(Json(availability))
}

async fn list_reservations(State(state): State<AppState>) -> Json<Vec<CalendarEvent>> {
    Json(state.events.load().await)
}

fn bad_request(message: &str) -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({"error": message})))
}

fn upstream_error(err: OntopoError) -> (StatusCode, Json<Value>) {
    tracing::error!(error = %err, "upstream call failed");
    (
        StatusCode::BAD_GATEWAY,
        Json(json!({"error": err.to_string()})),
    )
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::NaiveTime;
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::ontopo::AvailableSlot;

    use super::*;

    struct StubApi;

    #[async_trait]
    impl ReservationApi for StubApi {
        async fn search_venues(&self, query: &str) -> Result<Vec<VenueRecord>, OntopoError> {
            Ok(vec![VenueRecord {
                id: "v1".to_string(),
                name: query.to_string(),
                address: "157 Yigal Alon St, Tel Aviv".to_string(),
                area: "Tel Aviv".to_string(),
                phone: None,
            }])
        }

        async fn check_availability(
            &self,
            _query: &AvailabilityQuery,
        ) -> Result<Availability, OntopoError> {
            Ok(Availability::Slots {
                slots: vec![AvailableSlot {
                    time: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
                    id: Some("s1".to_string()),
                    label: None,
                }],
                phone: None,
            })
        }
    }

    fn test_router(api_key: Option<&str>) -> (Router, tempfile::TempDir) {
        let factory: ApiFactory = Arc::new(|| Arc::new(StubApi));
        test_router_with(factory, api_key)
    }

    fn test_router_with(
        factory: ApiFactory,
        api_key: Option<&str>,
    ) -> (Router, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_lookup(|_| None).unwrap();
        let state = AppState::new(
            factory,
            &config,
            UserProfile::default(),
            EventStore::new(dir.path().join("events.json")),
        );
        let router = BookingServer::router(state, api_key.map(SecretString::from));
        (router, dir)
    }

    fn json_post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_needs_no_key() {
        let (router, _dir) = test_router(Some("sekret"));
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "bookaboo");
    }

    #[tokio::test]
    async fn keyed_routes_reject_missing_or_wrong_key() {
        let (router, _dir) = test_router(Some("sekret"));

        let req = Request::builder()
            .uri("/reservations")
            .body(Body::empty())
            .unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = Request::builder()
            .uri("/reservations")
            .header("x-api-key", "nope")
            .body(Body::empty())
            .unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = Request::builder()
            .uri("/reservations")
            .header("x-api-key", "sekret")
            .body(Body::empty())
            .unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn no_configured_key_leaves_routes_open() {
        let (router, _dir) = test_router(None);
        let req = Request::builder()
            .uri("/reservations")
            .body(Body::empty())
            .unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn reserve_runs_the_pipeline() {
        let (router, _dir) = test_router(None);
        let req = json_post(
            "/reserve",
            json!({"text": "book 2 people tomorrow at 8pm at Prozdor"}),
        );

        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["status"], "confirmed");
        assert_eq!(body["venue"]["id"], "v1");
        assert!(body["checkout_url"].as_str().unwrap().contains("venue_id=v1"));
    }

    #[tokio::test]
    async fn each_request_gets_its_own_platform_client() {
        // The anonymous session lives inside the client, so a client per
        // request means a session per run; sharing one client would reuse
        // the first run's credential for every later request.
        let built = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let factory: ApiFactory = {
            let built = built.clone();
            Arc::new(move || {
                built.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Arc::new(StubApi)
            })
        };
        let (router, _dir) = test_router_with(factory, None);

        for _ in 0..2 {
            let req = json_post(
                "/reserve",
                json!({"text": "book 2 people tomorrow at 8pm at Prozdor"}),
            );
            let resp = router.clone().oneshot(req).await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
        }
        assert_eq!(built.load(std::sync::atomic::Ordering::SeqCst), 2);

        let req = json_post("/search", json!({"query": "Prozdor"}));
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(built.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn reserve_rejects_empty_text() {
        let (router, _dir) = test_router(None);
        let req = json_post("/reserve", json!({"text": "   "}));

        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert_eq!(body["error"], "request text cannot be empty");
    }

    #[tokio::test]
    async fn search_returns_venues() {
        let (router, _dir) = test_router(None);
        let req = json_post("/search", json!({"query": "Prozdor"}));

        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body[0]["id"], "v1");
        assert_eq!(body[0]["name"], "Prozdor");
    }

    #[tokio::test]
    async fn search_rejects_empty_query() {
        let (router, _dir) = test_router(None);
        let req = json_post("/search", json!({"query": ""}));

        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn availability_accepts_platform_date_and_time_spellings() {
        let (router, _dir) = test_router(None);
        let req = json_post(
            "/availability",
            json!({"venue_id": "v1", "date": "20250306", "time": "20:00", "party_size": 2}),
        );

        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["kind"], "slots");
        assert_eq!(body["slots"][0]["id"], "s1");
    }

    #[tokio::test]
    async fn availability_rejects_a_bad_date() {
        let (router, _dir) = test_router(None);
        let req = json_post(
            "/availability",
            json!({"venue_id": "v1", "date": "2025-03-06", "time": "2000"}),
        );

        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert_eq!(body["error"], "date must be YYYYMMDD");
    }
}
