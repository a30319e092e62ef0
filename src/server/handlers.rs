use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::geo::{self, Coordinates};
use crate::geolocate::{GeoAcquirer, NoGps, Phase};
use crate::places::{self, Place, ProviderQueryEngine};
use crate::proxy::{CacheEntry, ErrorLogEntry, RequestStats};

use super::state::AppState;

/// Default search radius when the client does not send one, meters.
const DEFAULT_RADIUS_M: u32 = 5_000;

// ─── Error response ──────────────────────────────────────────────

#[derive(Serialize)]
struct ApiErrorBody {
    error: String,
    code: u16,
}

pub(super) struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: self.1,
            code: self.0.as_u16(),
        };
        (self.0, Json(body)).into_response()
    }
}

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    ApiError(status, msg.into())
}

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok());
    if state.admin.allows(authorization) {
        Ok(())
    } else {
        Err(api_error(StatusCode::FORBIDDEN, "Admin access required"))
    }
}

// ─── GET /api/search ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct SearchQuery {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub radius: Option<u32>,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub origin: Coordinates,
    pub initial_radius_m: u32,
    pub count: usize,
    pub safe_mode: bool,
    pub places: Vec<Place>,
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, ApiError> {
    let start = Instant::now();

    let (Some(lat), Some(lon)) = (params.lat, params.lon) else {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Provide 'lat' and 'lon' parameters",
        ));
    };
    geo::validate(lat, lon).map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;
    let origin = Coordinates { lat, lon };
    let radius = params.radius.unwrap_or(DEFAULT_RADIUS_M);

    let engine = ProviderQueryEngine {
        proxy: state.proxy.as_ref(),
        retry: &state.retry,
    };
    let results = places::search(&engine, &state.sink, origin, radius);
    let results = places::sort_by_distance(results);

    let elapsed = start.elapsed();
    eprintln!(
        "[{}] GET /api/search ll={} radius={} -> {} places ({:.1}ms)",
        Utc::now().format("%H:%M:%S"),
        origin,
        radius,
        results.len(),
        elapsed.as_secs_f64() * 1000.0,
    );

    Ok(Json(SearchResponse {
        origin,
        initial_radius_m: radius,
        count: results.len(),
        safe_mode: state.retry.safe_mode(),
        places: results,
    }))
}

// ─── GET /api/locate ─────────────────────────────────────────────

#[derive(Serialize)]
pub struct LocateResponse {
    pub phase: Phase,
    pub source: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub can_retry: bool,
}

pub async fn locate(State(state): State<Arc<AppState>>) -> Result<Json<LocateResponse>, ApiError> {
    let start = Instant::now();

    // Headless server: the chain degrades to the IP stage immediately.
    let mut acquirer = GeoAcquirer::new(NoGps);
    let detection = acquirer.acquire(&state.proxy).clone();

    let elapsed = start.elapsed();
    eprintln!(
        "[{}] GET /api/locate -> {:?} via {} ({:.1}ms)",
        Utc::now().format("%H:%M:%S"),
        detection.phase,
        detection.source,
        elapsed.as_secs_f64() * 1000.0,
    );

    Ok(Json(LocateResponse {
        phase: detection.phase,
        source: detection.source.to_string(),
        lat: detection.coords.map(|c| c.lat),
        lon: detection.coords.map(|c| c.lon),
        city: detection.city,
        country: detection.country,
        error: detection.error,
        can_retry: detection.can_retry,
    }))
}

// ─── GET /api/proxy/health (world-readable) ──────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub cache_ttl_ms: i64,
    pub cache_entries: usize,
    pub error_count: usize,
    pub stats: RequestStats,
}

pub async fn proxy_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    // Counts and protocol facts only; contents stay behind the admin gate.
    Json(HealthResponse {
        cache_ttl_ms: state.proxy.cache_ttl_ms(),
        cache_entries: state.proxy.cache_len(),
        error_count: state.proxy.error_count(),
        stats: state.proxy.stats(),
    })
}

// ─── GET /api/proxy/cache (admin) ────────────────────────────────

#[derive(Serialize)]
pub struct CacheEntryView {
    pub key: String,
    pub stored_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_ms: Option<i64>,
}

#[derive(Serialize)]
pub struct CacheResponse {
    pub count: usize,
    pub ttl_ms: i64,
    pub entries: Vec<CacheEntryView>,
}

pub async fn proxy_cache(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<CacheResponse>, ApiError> {
    require_admin(&state, &headers)?;

    let entries: Vec<CacheEntryView> = state
        .proxy
        .cache_snapshot()
        .into_iter()
        .map(|(key, entry): (String, CacheEntry)| {
            let remaining_ms = state.proxy.time_remaining_ms(&key);
            CacheEntryView {
                key,
                stored_at: entry.stored_at,
                remaining_ms,
            }
        })
        .collect();

    Ok(Json(CacheResponse {
        count: entries.len(),
        ttl_ms: state.proxy.cache_ttl_ms(),
        entries,
    }))
}

// ─── POST /api/proxy/cache/clear (admin) ─────────────────────────

#[derive(Deserialize)]
pub struct ClearCacheBody {
    pub prefix: Option<String>,
}

#[derive(Serialize)]
pub struct ClearCacheResponse {
    pub removed: usize,
}

pub async fn proxy_cache_clear(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ClearCacheBody>,
) -> Result<Json<ClearCacheResponse>, ApiError> {
    require_admin(&state, &headers)?;

    let removed = state.proxy.clear_cache(body.prefix.as_deref());
    eprintln!(
        "[{}] POST /api/proxy/cache/clear prefix={:?} -> {} removed",
        Utc::now().format("%H:%M:%S"),
        body.prefix,
        removed,
    );
    Ok(Json(ClearCacheResponse { removed }))
}

// ─── GET /api/proxy/errors (admin) ───────────────────────────────

#[derive(Serialize)]
pub struct ErrorLogResponse {
    pub count: usize,
    pub entries: Vec<ErrorLogEntry>,
}

pub async fn proxy_errors(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ErrorLogResponse>, ApiError> {
    require_admin(&state, &headers)?;

    let entries = state.proxy.error_log();
    Ok(Json(ErrorLogResponse {
        count: entries.len(),
        entries,
    }))
}

// ─── POST /api/admin/credential (admin) ──────────────────────────

#[derive(Deserialize)]
pub struct CredentialBody {
    /// New place-index key; null or absent clears the stored one.
    pub key: Option<String>,
}

#[derive(Serialize)]
pub struct CredentialResponse {
    pub configured: bool,
}

pub async fn set_credential(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CredentialBody>,
) -> Result<Json<CredentialResponse>, ApiError> {
    require_admin(&state, &headers)?;

    {
        let mut config = state.config.lock().unwrap();
        config.set_place_index_key(body.key.clone());
    }
    state.proxy.set_credential(body.key);

    eprintln!(
        "[{}] POST /api/admin/credential -> configured={}",
        Utc::now().format("%H:%M:%S"),
        state.proxy.credential_set(),
    );
    Ok(Json(CredentialResponse {
        configured: state.proxy.credential_set(),
    }))
}
