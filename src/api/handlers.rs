use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use utoipa::OpenApi;

use super::{
    dto::{
        ExtremeQuery, HistoryQuery, HistoryResponse, LocationCount, RecentQuery, SensorDto,
        SensorQuery, SessionDto,
    },
    errors::AppError,
    AppState,
};
use crate::{
    sensors::{
        aggregate::{self, Extremum, FleetSummary},
        chart::{self, ChartKind, ChartPoint, ChartSeries},
        window::{TimeRange, TimeWindow},
        AlertLevel, Category, NumericField, SensorRecord, WaterLevel,
    },
    session::{LoginPayload, UserProfile},
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Current snapshot with one record per sensor.
async fn fleet(state: &AppState) -> Vec<SensorRecord> {
    aggregate::deduplicate(&state.sessions.current_sensors().await)
}

fn to_dto(state: &AppState, now: DateTime<Utc>, record: SensorRecord) -> SensorDto {
    SensorDto {
        active: aggregate::is_active(&record, now, state.config.freshness_window),
        record,
    }
}

fn with_freshness(state: &AppState, now: DateTime<Utc>, records: Vec<SensorRecord>) -> Vec<SensorDto> {
    records.into_iter().map(|r| to_dto(state, now, r)).collect()
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Start a session from an upstream login response.
#[utoipa::path(
    post,
    path = "/session",
    request_body = LoginPayload,
    responses(
        (status = 201, description = "Session started", body = SessionDto),
        (status = 400, description = "Payload carries no token"),
        (status = 401, description = "Upstream rejected the login"),
    ),
    tag = "session"
)]
pub async fn create_session(
    State(state): State<AppState>,
    Json(payload): Json<LoginPayload>,
) -> Result<(StatusCode, Json<SessionDto>), AppError> {
    let session = state.sessions.login(payload).await?;
    Ok((StatusCode::CREATED, Json(SessionDto::from(&session))))
}

/// End the session and clear the persisted fallback.
#[utoipa::path(
    delete,
    path = "/session",
    responses((status = 204, description = "Session cleared")),
    tag = "session"
)]
pub async fn delete_session(State(state): State<AppState>) -> StatusCode {
    state.sessions.logout().await;
    StatusCode::NO_CONTENT
}

/// The logged-in user, falling back to the persisted copy and then a placeholder.
#[utoipa::path(
    get,
    path = "/session/user",
    responses((status = 200, description = "Current user", body = UserProfile)),
    tag = "session"
)]
pub async fn get_current_user(State(state): State<AppState>) -> Json<UserProfile> {
    Json(state.sessions.current_user().await)
}

// ---------------------------------------------------------------------------
// Sensors
// ---------------------------------------------------------------------------

/// Deduplicated sensors, optionally narrowed by category, location, alert
/// level and water level.
#[utoipa::path(
    get,
    path = "/sensors",
    params(
        ("category"    = Option<String>, Query, description = "enclosure | incubator | unknown | all"),
        ("location"    = Option<String>, Query, description = "Exact location label, or all"),
        ("alert_level" = Option<String>, Query, description = "none | info | warning | critical | all"),
        ("water_level" = Option<String>, Query, description = "ok | low | all"),
    ),
    responses(
        (status = 200, description = "Matching sensors", body = Vec<SensorDto>),
        (status = 400, description = "Unknown filter value"),
    ),
    tag = "sensors"
)]
pub async fn list_sensors(
    State(state): State<AppState>,
    Query(query): Query<SensorQuery>,
) -> Result<Json<Vec<SensorDto>>, AppError> {
    let selectors = query.selectors()?;
    let now = Utc::now();
    let records = aggregate::filter_all(&fleet(&state).await, &selectors);
    Ok(Json(with_freshness(&state, now, records)))
}

/// Most recently updated sensors, newest first.
#[utoipa::path(
    get,
    path = "/sensors/recent",
    params(("limit" = Option<usize>, Query, description = "How many to return (defaults to RECENT_LIMIT)")),
    responses((status = 200, description = "Recent sensors", body = Vec<SensorDto>)),
    tag = "sensors"
)]
pub async fn recent_sensors(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> Json<Vec<SensorDto>> {
    let limit = query.limit.unwrap_or(state.config.recent_limit);
    let now = Utc::now();
    let records = aggregate::most_recent(&fleet(&state).await, limit);
    Json(with_freshness(&state, now, records))
}

/// Sensor with the highest (or lowest) value of a numeric field. `null` when
/// there are no sensors.
#[utoipa::path(
    get,
    path = "/sensors/extreme",
    params(
        ("field" = Option<String>, Query, description = "temperature | humidity | pressure | ammonia | activation_count"),
        ("order" = Option<String>, Query, description = "max | min"),
    ),
    responses(
        (status = 200, description = "Extremal sensor or null", body = SensorDto),
        (status = 400, description = "Unknown field or order"),
    ),
    tag = "sensors"
)]
pub async fn extreme_sensor(
    State(state): State<AppState>,
    Query(query): Query<ExtremeQuery>,
) -> Result<Json<Option<SensorDto>>, AppError> {
    let field = match query.field.as_deref() {
        None => NumericField::Temperature,
        Some(f) => f
            .parse::<NumericField>()
            .map_err(|e| AppError::bad_param("field", e))?,
    };
    let extremum = match query.order.as_deref() {
        None | Some("max") => Extremum::Max,
        Some("min") => Extremum::Min,
        Some(other) => {
            return Err(AppError::BadRequest(format!(
                "invalid 'order': expected max or min, got {other:?}"
            )))
        }
    };

    let now = Utc::now();
    let records = fleet(&state).await;
    let best = aggregate::extreme_by(&records, field, extremum).cloned();
    Ok(Json(best.map(|r| to_dto(&state, now, r))))
}

/// A single sensor's latest record.
#[utoipa::path(
    get,
    path = "/sensors/{id}",
    params(("id" = String, Path, description = "Sensor id")),
    responses(
        (status = 200, description = "Sensor", body = SensorDto),
        (status = 404, description = "No such sensor in the current snapshot"),
    ),
    tag = "sensors"
)]
pub async fn get_sensor(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SensorDto>, AppError> {
    let now = Utc::now();
    let record = fleet(&state)
        .await
        .into_iter()
        .find(|r| r.id == id)
        .ok_or_else(|| AppError::NotFound(format!("sensor {id:?} not found")))?;

    Ok(Json(to_dto(&state, now, record)))
}

/// Every report from one sensor inside a time window, plus a temperature
/// chart. Use `range` for a preset or `from`/`to` for a custom window.
#[utoipa::path(
    get,
    path = "/sensors/{id}/history",
    params(
        ("id"    = String, Path, description = "Sensor id"),
        ("range" = Option<String>, Query, description = "1h | 24h | 7d | 30d (default 24h)"),
        ("from"  = Option<String>, Query, description = "Custom window start (RFC3339)"),
        ("to"    = Option<String>, Query, description = "Custom window end (RFC3339, default now)"),
    ),
    responses(
        (status = 200, description = "History inside the window", body = HistoryResponse),
        (status = 400, description = "Invalid window"),
        (status = 404, description = "No such sensor in the current snapshot"),
    ),
    tag = "sensors"
)]
pub async fn sensor_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, AppError> {
    let now = Utc::now();
    let window = match (query.from, query.to, query.range.as_deref()) {
        (Some(_), _, Some(_)) => {
            return Err(AppError::BadRequest(
                "use either 'range' or 'from'/'to', not both".to_owned(),
            ))
        }
        (Some(from), to, None) => TimeWindow::custom(from, to.unwrap_or(now))?,
        (None, Some(_), _) => {
            return Err(AppError::BadRequest("'to' requires 'from'".to_owned()))
        }
        (None, None, range) => {
            let range = range
                .map(str::parse::<TimeRange>)
                .transpose()
                .map_err(|e| AppError::bad_param("range", e))?
                .unwrap_or(TimeRange::LastDay);
            TimeWindow::last(range, now)
        }
    };

    let snapshot = state.sessions.current_sensors().await;
    if !snapshot.iter().any(|r| r.id == id) {
        return Err(AppError::NotFound(format!("sensor {id:?} not found")));
    }

    Ok(Json(HistoryResponse {
        readings: aggregate::history(&snapshot, &id, &window),
        chart: chart::temperature_history(&snapshot, &id, &window),
        sensor_id: id,
        from: window.from,
        to: window.to,
    }))
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

/// Headline counts for the monitoring overview.
#[utoipa::path(
    get,
    path = "/dashboard/summary",
    responses((status = 200, description = "Fleet summary", body = FleetSummary)),
    tag = "dashboard"
)]
pub async fn dashboard_summary(State(state): State<AppState>) -> Json<FleetSummary> {
    let now = Utc::now();
    let records = fleet(&state).await;
    Json(aggregate::summarize(&records, now, state.config.freshness_window))
}

/// Distinct locations with sensor counts, in first-seen order.
#[utoipa::path(
    get,
    path = "/dashboard/locations",
    responses((status = 200, description = "Locations", body = Vec<LocationCount>)),
    tag = "dashboard"
)]
pub async fn dashboard_locations(State(state): State<AppState>) -> Json<Vec<LocationCount>> {
    let counts = aggregate::locations(&fleet(&state).await)
        .into_iter()
        .map(|(location, count)| LocationCount { location, count })
        .collect();
    Json(counts)
}

/// Chart-ready series for one of the dashboard charts.
#[utoipa::path(
    get,
    path = "/dashboard/charts/{kind}",
    params(("kind" = ChartKind, Path, description = "Chart to build")),
    responses(
        (status = 200, description = "Chart series", body = ChartSeries),
        (status = 400, description = "Unknown chart kind"),
    ),
    tag = "dashboard"
)]
pub async fn dashboard_chart(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<Json<ChartSeries>, AppError> {
    let kind = kind
        .parse::<ChartKind>()
        .map_err(|e| AppError::bad_param("kind", e))?;
    let records = fleet(&state).await;
    Ok(Json(chart::bucket_for_chart(&records, kind, state.config.recent_limit)))
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Returns `200 OK` with `{"status":"ok"}` when the server is running.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
    ),
    tag = "system"
)]
pub async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// OpenAPI document
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(
        create_session,
        delete_session,
        get_current_user,
        list_sensors,
        recent_sensors,
        extreme_sensor,
        get_sensor,
        sensor_history,
        dashboard_summary,
        dashboard_locations,
        dashboard_chart,
        health,
    ),
    components(schemas(
        LoginPayload,
        UserProfile,
        SessionDto,
        SensorDto,
        SensorRecord,
        Category,
        WaterLevel,
        AlertLevel,
        NumericField,
        Extremum,
        FleetSummary,
        LocationCount,
        HistoryResponse,
        ChartKind,
        ChartSeries,
        ChartPoint,
        TimeRange,
    )),
    tags(
        (name = "session",   description = "Session snapshot ingestion"),
        (name = "sensors",   description = "Sensor views"),
        (name = "dashboard", description = "Dashboard aggregates and charts"),
        (name = "system",    description = "System endpoints"),
    ),
    info(
        title = "Sensor Dashboard API",
        version = "0.1.0",
        description = "Derived views over a monitoring deployment's sensor snapshot"
    )
)]
pub struct ApiDoc;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
