// Payroll Insight - Web Server
// REST API over the stored payroll records with Axum

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use payroll_insight::aggregation::parse_dimensions;
use payroll_insight::export::{detail_rows, DetailRow, RecordRow};
use payroll_insight::{
    detect_outliers, employee_totals, load_filter_options, load_override_map, load_records,
    overview, pivot_by_category, resolve_areas, save_override_map, setup_database, simulate,
    summarize, CategoryPivotRow, Config, EmployeeTotal, Error, EventRecord, GroupSummary,
    OverrideKind, OverrideMap, Overview, RecordFilter, ScenarioParams, SimulationResult,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    outlier_threshold_hours: f64,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    fn failed(data: T, message: String) -> Self {
        Self {
            success: false,
            data,
            error: Some(message),
        }
    }
}

/// 200 with the data, or an empty data set plus the error message
fn respond<T: Serialize + Default>(result: Result<T, Error>, what: &str) -> Response {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::ok(data))).into_response(),
        Err(e) => {
            error!("Error getting {}: {}", what, e);
            let status = match e {
                Error::InvalidFilter { .. }
                | Error::InvalidScenario { .. }
                | Error::UnknownOverrideMap { .. } => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(ApiResponse::failed(T::default(), e.to_string()))).into_response()
        }
    }
}

/// Run `f` against the locked connection
fn with_conn<T>(
    state: &AppState,
    f: impl FnOnce(&Connection) -> Result<T, Error>,
) -> Result<T, Error> {
    let conn = state.db.lock().map_err(|_| Error::Config {
        message: "database connection lock poisoned".to_string(),
    })?;
    f(&conn)
}

// ============================================================================
// Query types
// ============================================================================

/// Query string shared by the GET endpoints.
/// `entity` / `period` are comma separated lists; an omitted list means every known value.
#[derive(Debug, Default, Deserialize)]
struct ApiQuery {
    entity: Option<String>,
    period: Option<String>,
    by: Option<String>,
    threshold: Option<f64>,
    limit: Option<usize>,
}

fn split_list(value: &Option<String>) -> Option<Vec<String>> {
    value.as_ref().map(|v| {
        v.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

#[derive(Debug, Deserialize)]
struct SimulationRequest {
    #[serde(default)]
    entities: Option<Vec<String>>,
    #[serde(default)]
    periods: Option<Vec<String>>,
    params: ScenarioParams,
}

#[derive(Default, Serialize)]
struct FiltersResponse {
    entities: Vec<String>,
    periods: Vec<String>,
}

#[derive(Default, Serialize)]
struct RecordsResponse {
    records: Vec<RecordRow>,
    top: Vec<DetailRow>,
}

#[derive(Default, Serialize)]
struct SummaryResponse {
    overview: Overview,
    groups: Vec<GroupSummary>,
}

/// Load records for the requested filter and assign areas
fn resolved_records(
    conn: &Connection,
    entities: Option<Vec<String>>,
    periods: Option<Vec<String>>,
) -> Result<Vec<EventRecord>, Error> {
    let (all_entities, all_periods) = load_filter_options(conn)?;
    let filter = RecordFilter::new(
        entities.unwrap_or(all_entities),
        periods.unwrap_or(all_periods),
    );
    let records = load_records(conn, &filter)?;

    let roles = load_override_map(conn, OverrideKind::Roles)?;
    let exceptions = load_override_map(conn, OverrideKind::Exceptions)?;
    Ok(resolve_areas(&records, &roles, &exceptions))
}

fn query_records(conn: &Connection, filter: &ApiQuery) -> Result<Vec<EventRecord>, Error> {
    resolved_records(conn, split_list(&filter.entity), split_list(&filter.period))
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/filters - Known entities and periods
async fn get_filters(State(state): State<AppState>) -> Response {
    let result = with_conn(&state, |conn| {
        let (entities, periods) = load_filter_options(conn)?;
        Ok(FiltersResponse { entities, periods })
    });
    respond(result, "filters")
}

/// GET /api/records - Record base with areas, plus the largest records
async fn get_records(State(state): State<AppState>, Query(query): Query<ApiQuery>) -> Response {
    let result = with_conn(&state, |conn| {
        let records = query_records(conn, &query)?;
        Ok(RecordsResponse {
            top: detail_rows(&records, query.limit.unwrap_or(50)),
            records: records.iter().map(RecordRow::from).collect(),
        })
    });
    respond(result, "records")
}

/// GET /api/summary?by=area,role - Overview metrics and grouped totals
async fn get_summary(State(state): State<AppState>, Query(query): Query<ApiQuery>) -> Response {
    let result = with_conn(&state, |conn| {
        let dimensions = parse_dimensions(query.by.as_deref().unwrap_or("area"))?;
        let records = query_records(conn, &query)?;
        Ok(SummaryResponse {
            overview: overview(&records),
            groups: summarize(&records, &dimensions),
        })
    });
    respond(result, "summary")
}

/// GET /api/outliers?threshold=40 - Employees above the hours threshold
async fn get_outliers(State(state): State<AppState>, Query(query): Query<ApiQuery>) -> Response {
    let threshold = query.threshold.unwrap_or(state.outlier_threshold_hours);
    let result: Result<Vec<EmployeeTotal>, Error> = with_conn(&state, |conn| {
        let records = query_records(conn, &query)?;
        Ok(detect_outliers(&employee_totals(&records), threshold))
    });
    respond(result, "outliers")
}

/// GET /api/pivot - Hours and amounts per event category
async fn get_pivot(State(state): State<AppState>, Query(query): Query<ApiQuery>) -> Response {
    let result: Result<Vec<CategoryPivotRow>, Error> = with_conn(&state, |conn| {
        let records = query_records(conn, &query)?;
        Ok(pivot_by_category(&records))
    });
    respond(result, "pivot")
}

/// POST /api/simulation - Cash vs time-off scenario
async fn post_simulation(
    State(state): State<AppState>,
    Json(request): Json<SimulationRequest>,
) -> Response {
    let result: Result<Option<SimulationResult>, Error> = with_conn(&state, |conn| {
        let records = resolved_records(conn, request.entities, request.periods)?;
        simulate(&employee_totals(&records), &request.params).map(Some)
    });
    respond(result, "simulation")
}

/// GET /api/overrides/:kind - roles | exceptions
async fn get_overrides(State(state): State<AppState>, Path(kind): Path<String>) -> Response {
    let result = kind
        .parse::<OverrideKind>()
        .and_then(|kind| with_conn(&state, |conn| load_override_map(conn, kind)));
    respond(result, "override map")
}

/// PUT /api/overrides/:kind - Replace a map
async fn put_overrides(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Json(map): Json<OverrideMap>,
) -> Response {
    let result = kind.parse::<OverrideKind>().and_then(|kind| {
        with_conn(&state, |conn| {
            save_override_map(conn, kind, &map)?;
            load_override_map(conn, kind)
        })
    });
    respond(result, "override map")
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "payroll_insight=info,payroll_server=info".into()),
        )
        .with_target(false)
        .init();

    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let config = Config::load(config_path.as_deref()).context("Failed to load configuration")?;

    let conn = Connection::open(&config.database_path).with_context(|| {
        format!("Failed to open database {}", config.database_path.display())
    })?;
    setup_database(&conn)?;
    info!("Database opened: {}", config.database_path.display());

    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        outlier_threshold_hours: config.outlier_threshold_hours,
    };

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/filters", get(get_filters))
        .route("/records", get(get_records))
        .route("/summary", get(get_summary))
        .route("/outliers", get(get_outliers))
        .route("/pivot", get(get_pivot))
        .route("/simulation", post(post_simulation))
        .route("/overrides/:kind", get(get_overrides).put(put_overrides))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.server_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server_addr))?;

    info!("Server running on http://{}", config.server_addr);
    info!("API: http://{}/api/summary", config.server_addr);

    axum::serve(listener, app)
        .await
        .context("Server stopped unexpectedly")?;
    Ok(())
}
