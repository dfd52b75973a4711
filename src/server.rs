//! HTTP server.
//!
//! Exposes patient search and the credential cache as a JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/api/v1/search/patients` | Fuzzy patient search |
//! | `GET`  | `/api/v1/search/patients/suggestions` | Autocomplete names |
//! | `GET`  | `/api/v1/search/patients/{patient_name}/documents` | Exact-name document lookup |
//! | `GET`  | `/api/v1/tokens/speech` | Cached bearer token |
//! | `GET`  | `/api/v1/tokens/storage` | Cached container SAS token |
//! | `GET`  | `/api/v1/tokens/speech/info` | Bearer cache status |
//! | `GET`  | `/api/v1/tokens/storage/info` | SAS cache status |
//! | `POST` | `/api/v1/tokens/speech/invalidate` | Drop the cached bearer token |
//! | `POST` | `/api/v1/tokens/storage/invalidate` | Drop the cached SAS token |
//! | `GET`  | `/api/v1/tokens/storage/blob/{*blob_name}` | Signed URL for one blob |
//!
//! Every search endpoint requires `user_id`; results never cross tenants.
//! Errors use the envelope described in [`crate::error`]. Token endpoints
//! answer `404 NOT_FOUND` when their `[credentials.*]` section is absent.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use patient_search_core::models::{PageInfo, SearchHit};
use patient_search_core::store::PatientIndex;
use patient_search_core::{
    ExactNameRequest, PatientSearchRequest, SearchEngine, SuggestionRequest, TenantId,
    ValidationError,
};

use crate::config::Config;
use crate::credentials::{
    BearerToken, BlobUrl, CacheStatus, CredentialCache, CredentialKind, SignedUrlToken,
    SystemClock,
};
use crate::db;
use crate::error::ApiError;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

/// Search engine over a type-erased index.
pub type DynEngine = SearchEngine<Arc<dyn PatientIndex>>;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DynEngine>,
    pub credentials: Arc<CredentialCache>,
}

impl AppState {
    pub fn new(engine: DynEngine, credentials: CredentialCache) -> Self {
        Self {
            engine: Arc::new(engine),
            credentials: Arc::new(credentials),
        }
    }
}

/// Build the router with all routes and layers. Used by [`run_server`] and
/// by tests that drive the router in-process.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/v1/search/patients", get(handle_search))
        .route(
            "/api/v1/search/patients/suggestions",
            get(handle_suggestions),
        )
        .route(
            "/api/v1/search/patients/{patient_name}/documents",
            get(handle_documents),
        )
        .route("/api/v1/tokens/speech", get(handle_speech_token))
        .route("/api/v1/tokens/storage", get(handle_storage_token))
        .route("/api/v1/tokens/speech/info", get(handle_speech_info))
        .route("/api/v1/tokens/storage/info", get(handle_storage_info))
        .route(
            "/api/v1/tokens/speech/invalidate",
            post(handle_speech_invalidate),
        )
        .route(
            "/api/v1/tokens/storage/invalidate",
            post(handle_storage_invalidate),
        )
        .route(
            "/api/v1/tokens/storage/blob/{*blob_name}",
            get(handle_blob_url),
        )
        .fallback(handle_not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind`. Runs until the process ends.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;

    let index: Arc<dyn PatientIndex> = Arc::new(SqliteStore::new(pool));
    let engine = SearchEngine::new(index, config.search.limits());
    let credentials = CredentialCache::from_config(&config.credentials, Arc::new(SystemClock))?;

    for kind in [CredentialKind::Bearer, CredentialKind::SignedUrl] {
        info!(
            kind = %kind,
            configured = credentials.is_configured(kind),
            "credential kind"
        );
    }

    let app = build_router(AppState::new(engine, credentials));

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "server listening");
    println!("psearch server listening on http://{}", config.server.bind);

    axum::serve(listener, app).await?;
    Ok(())
}

fn query<T>(params: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    params
        .map(|Query(p)| p)
        .map_err(|rejection| ApiError::invalid_parameter(rejection.body_text()))
}

/// Parse an optional numeric query parameter. Numbers arrive as strings so
/// that a malformed value is only reported once the tenant has been checked.
fn parse_param<T: FromStr>(field: &'static str, raw: Option<&str>) -> Result<Option<T>, ApiError> {
    raw.map(|v| {
        v.trim().parse::<T>().map_err(|_| {
            ApiError::from(ValidationError::InvalidParameter {
                field,
                message: format!("expected a number, got '{}'", v),
            })
        })
    })
    .transpose()
}

async fn handle_not_found() -> ApiError {
    ApiError::not_found("no route for this path")
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /api/v1/search/patients ============

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    search_term: String,
    user_id: Option<String>,
    limit: Option<String>,
    skip: Option<String>,
    min_similarity: Option<String>,
}

#[derive(Serialize)]
struct SearchResponse {
    search_term: String,
    normalized_term: String,
    total_found: usize,
    results: Vec<SearchHit>,
    limit: usize,
    skip: usize,
    #[serde(flatten)]
    pagination: PageInfo,
    min_similarity_threshold: f64,
    search_strategies_used: Vec<&'static str>,
    search_timestamp: String,
}

async fn handle_search(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let params = query(params)?;
    TenantId::parse(params.user_id.as_deref())?;
    let limit = parse_param("limit", params.limit.as_deref())?;
    let skip = parse_param("skip", params.skip.as_deref())?.unwrap_or(0);
    let min_similarity = parse_param("min_similarity", params.min_similarity.as_deref())?
        .unwrap_or(state.engine.limits().default_min_similarity);

    let page = state
        .engine
        .search_patients(&PatientSearchRequest {
            term: &params.search_term,
            user_id: params.user_id.as_deref(),
            limit,
            skip,
            min_similarity: Some(min_similarity),
        })
        .await?;

    info!(
        term = %params.search_term,
        tenant = params.user_id.as_deref().unwrap_or_default(),
        total = page.total_found,
        returned = page.results.len(),
        "patient search"
    );

    let strategies: BTreeSet<_> = page.results.iter().map(|h| h.match_type).collect();

    Ok(Json(SearchResponse {
        search_term: params.search_term,
        pagination: page.pagination(),
        normalized_term: page.normalized_term,
        total_found: page.total_found,
        results: page.results,
        limit: page.limit,
        skip: page.skip,
        min_similarity_threshold: min_similarity,
        search_strategies_used: strategies.into_iter().map(|m| m.as_str()).collect(),
        search_timestamp: Utc::now().to_rfc3339(),
    }))
}

// ============ GET /api/v1/search/patients/suggestions ============

#[derive(Debug, Deserialize)]
struct SuggestionParams {
    #[serde(default)]
    partial_term: String,
    user_id: Option<String>,
    limit: Option<String>,
}

#[derive(Serialize)]
struct SuggestionResponse {
    partial_term: String,
    normalized_term: String,
    suggestions: Vec<String>,
    total_suggestions: usize,
    returned_count: usize,
    limit: usize,
}

async fn handle_suggestions(
    State(state): State<AppState>,
    params: Result<Query<SuggestionParams>, QueryRejection>,
) -> Result<Json<SuggestionResponse>, ApiError> {
    let params = query(params)?;
    TenantId::parse(params.user_id.as_deref())?;
    let limit = parse_param("limit", params.limit.as_deref())?;

    let found = state
        .engine
        .suggest_patient_names(&SuggestionRequest {
            partial_term: &params.partial_term,
            user_id: params.user_id.as_deref(),
            limit,
        })
        .await?;

    let count = found.suggestions.len();
    Ok(Json(SuggestionResponse {
        partial_term: params.partial_term,
        normalized_term: found.normalized_term,
        suggestions: found.suggestions,
        total_suggestions: count,
        returned_count: count,
        limit: found.limit,
    }))
}

// ============ GET /api/v1/search/patients/{patient_name}/documents ============

#[derive(Debug, Deserialize)]
struct DocumentParams {
    user_id: Option<String>,
    limit: Option<String>,
    skip: Option<String>,
}

#[derive(Serialize)]
struct DocumentsResponse {
    patient_name: String,
    normalized_term: String,
    total_found: usize,
    results: Vec<SearchHit>,
    limit: usize,
    skip: usize,
    #[serde(flatten)]
    pagination: PageInfo,
    search_timestamp: String,
}

async fn handle_documents(
    State(state): State<AppState>,
    Path(patient_name): Path<String>,
    params: Result<Query<DocumentParams>, QueryRejection>,
) -> Result<Json<DocumentsResponse>, ApiError> {
    let params = query(params)?;
    TenantId::parse(params.user_id.as_deref())?;
    let limit = parse_param("limit", params.limit.as_deref())?;
    let skip = parse_param("skip", params.skip.as_deref())?.unwrap_or(0);

    let page = state
        .engine
        .find_documents_by_exact_name(&ExactNameRequest {
            patient_name: &patient_name,
            user_id: params.user_id.as_deref(),
            limit,
            skip,
        })
        .await?;

    Ok(Json(DocumentsResponse {
        patient_name,
        pagination: page.pagination(),
        normalized_term: page.normalized_term,
        total_found: page.total_found,
        results: page.results,
        limit: page.limit,
        skip: page.skip,
        search_timestamp: Utc::now().to_rfc3339(),
    }))
}

// ============ /api/v1/tokens ============

#[derive(Serialize)]
struct InvalidateResponse {
    message: String,
    had_cached_token: bool,
}

async fn handle_speech_token(State(state): State<AppState>) -> Result<Json<BearerToken>, ApiError> {
    Ok(Json(state.credentials.bearer().await?.value))
}

async fn handle_storage_token(
    State(state): State<AppState>,
) -> Result<Json<SignedUrlToken>, ApiError> {
    Ok(Json(state.credentials.signed_url().await?.value))
}

async fn handle_speech_info(State(state): State<AppState>) -> Result<Json<CacheStatus>, ApiError> {
    Ok(Json(state.credentials.describe(CredentialKind::Bearer).await?))
}

async fn handle_storage_info(State(state): State<AppState>) -> Result<Json<CacheStatus>, ApiError> {
    Ok(Json(
        state.credentials.describe(CredentialKind::SignedUrl).await?,
    ))
}

async fn handle_speech_invalidate(
    State(state): State<AppState>,
) -> Result<Json<InvalidateResponse>, ApiError> {
    let had = state.credentials.invalidate(CredentialKind::Bearer).await?;
    Ok(Json(InvalidateResponse {
        message: "Speech token cache invalidated".to_string(),
        had_cached_token: had,
    }))
}

async fn handle_storage_invalidate(
    State(state): State<AppState>,
) -> Result<Json<InvalidateResponse>, ApiError> {
    let had = state.credentials.invalidate(CredentialKind::SignedUrl).await?;
    Ok(Json(InvalidateResponse {
        message: "Storage token cache invalidated".to_string(),
        had_cached_token: had,
    }))
}

async fn handle_blob_url(
    State(state): State<AppState>,
    Path(blob_name): Path<String>,
) -> Result<Json<BlobUrl>, ApiError> {
    Ok(Json(state.credentials.sign_blob_url(&blob_name).await?))
}
