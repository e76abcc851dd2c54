use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use utoipa::OpenApi;

use super::{
    dto::{LatestReadingDto, TemperatureRecordDto},
    errors::ApiError,
    AppState,
};

pub const DEFAULT_HISTORY_LIMIT: i64 = 10;
pub const MAX_HISTORY_LIMIT: i64 = 1000;

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<String>,
}

/// Kept as raw strings so missing and malformed bounds both map to `400`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Latest temperature received from the broker. Served from memory only.
#[utoipa::path(
    get,
    path = "/clients/1/data.json",
    responses(
        (status = 200, description = "Latest temperature", body = LatestReadingDto),
    ),
    tag = "temperature"
)]
pub async fn get_latest(State(state): State<AppState>) -> Json<LatestReadingDto> {
    Json(state.cache.get().await.into())
}

/// Most recent stored readings, newest first.
#[utoipa::path(
    get,
    path = "/clients/1/data/history",
    params(
        ("limit" = Option<i64>, Query, description = "Number of readings (default 10, max 1000)"),
    ),
    responses(
        (status = 200, description = "Recent readings", body = Vec<TemperatureRecordDto>),
        (status = 400, description = "Invalid limit"),
        (status = 500, description = "Database not initialized or query failed"),
    ),
    tag = "temperature"
)]
pub async fn get_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<TemperatureRecordDto>>, ApiError> {
    let limit = parse_limit(params.limit.as_deref())?;
    let rows = state.store.recent(limit).await?;

    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// Stored readings with `startDate <= timestamp <= endDate`, oldest first.
/// The result is not paginated.
#[utoipa::path(
    get,
    path = "/clients/1/data/history/range",
    params(
        ("startDate" = String, Query, description = "Start of range (ISO 8601, inclusive)"),
        ("endDate"   = String, Query, description = "End of range (ISO 8601, inclusive)"),
    ),
    responses(
        (status = 200, description = "Readings in range", body = Vec<TemperatureRecordDto>),
        (status = 400, description = "Missing or malformed bounds"),
        (status = 500, description = "Database not initialized or query failed"),
    ),
    tag = "temperature"
)]
pub async fn get_history_range(
    State(state): State<AppState>,
    Query(params): Query<RangeParams>,
) -> Result<Json<Vec<TemperatureRecordDto>>, ApiError> {
    let (Some(start), Some(end)) = (params.start_date, params.end_date) else {
        return Err(ApiError::InvalidArgument(
            "Please provide both start and end dates".into(),
        ));
    };
    let start = parse_bound("startDate", &start)?;
    let end = parse_bound("endDate", &end)?;

    let rows = state.store.range(start, end).await?;

    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Process liveness plus the broker and database connection state.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is running"),
    ),
    tag = "system"
)]
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let mqtt = *state.bridge_state.borrow();
    let database = if state.store.is_connected() {
        "connected"
    } else {
        "disconnected"
    };
    Json(serde_json::json!({
        "status": "ok",
        "mqtt": mqtt.as_str(),
        "database": database,
    }))
}

// ---------------------------------------------------------------------------
// Parameter parsing
// ---------------------------------------------------------------------------

fn parse_limit(raw: Option<&str>) -> Result<i64, ApiError> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_HISTORY_LIMIT);
    };
    let limit: i64 = raw
        .trim()
        .parse()
        .map_err(|_| ApiError::InvalidArgument(format!("limit must be an integer, got {raw:?}")))?;
    Ok(limit.clamp(1, MAX_HISTORY_LIMIT))
}

fn parse_bound(name: &str, raw: &str) -> Result<DateTime<Utc>, ApiError> {
    parse_timestamp(raw)
        // An unescaped `+` offset arrives as a space after query decoding.
        .or_else(|| parse_timestamp(&raw.replace(' ', "+")))
        .ok_or_else(|| ApiError::InvalidArgument(format!("{name} is not a valid date: {raw:?}")))
}

/// Accepts RFC 3339, a naive date-time (taken as UTC) or a bare date (UTC
/// midnight).
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

// ---------------------------------------------------------------------------
// OpenAPI spec
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(get_latest, get_history, get_history_range, health),
    components(schemas(LatestReadingDto, TemperatureRecordDto)),
    tags(
        (name = "temperature", description = "Temperature reading endpoints"),
        (name = "system",      description = "System endpoints"),
    ),
    info(
        title = "Weather Station API",
        version = "0.1.0",
        description = "Latest and historical temperature readings received over MQTT"
    )
)]
pub struct ApiDoc;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
