//! HTTP API server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/chat` | Retrieve and stream an answer over server-sent events |
//! | `GET`  | `/api/search` | Ranked passages as JSON |
//! | `GET`  | `/api/indexing/stats` | Record counts by locale and content type |
//! | `POST` | `/api/indexing/trigger` | Points the operator at the offline indexer |
//! | `GET`  | `/` | Service banner |
//! | `GET`  | `/health` | Health check with backend configuration flags |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty", "field": "query" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404),
//! `upstream_unavailable` (503), `internal` (500). Messages for 404 and
//! 5xx are localized and never carry backend error text.
//!
//! # Chat stream
//!
//! Each SSE frame is `data: <json>\n\n` where the JSON is one of
//! `{"type":"sources",...}`, `{"type":"content",...}`, `{"type":"done"}`.
//! An empty retrieval is answered with 404 before any stream starts.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};

use blog_rag_core::locale::{
    internal_error_message, no_results_message, upstream_unavailable_message, Locale,
};
use blog_rag_core::models::{IndexStats, Passage};
use blog_rag_core::retrieve::RetrievalParams;
use blog_rag_core::RagError;

use crate::config::Config;
use crate::embedding::verify_dims;
use crate::services::{self, Services};

pub const MAX_CHAT_QUERY_CHARS: usize = 1000;
pub const MAX_SEARCH_QUERY_CHARS: usize = 500;
pub const MAX_SEARCH_TOP_K: usize = 50;
pub const DEFAULT_SEARCH_TOP_K: usize = 10;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub services: Services,
}

impl AppState {
    pub fn new(config: Config, services: Services) -> Self {
        Self {
            config: Arc::new(config),
            services,
        }
    }
}

/// Starts the HTTP server on `[server].bind`.
///
/// Refuses to start unless both backends are configured and the embedding
/// backend produces vectors of the configured dimension.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    if !config.embedding.is_enabled() {
        anyhow::bail!("serve requires an embedding provider. Set [embedding] provider in config.");
    }
    if !config.generation.is_enabled() {
        anyhow::bail!("serve requires a generation provider. Set [generation] provider in config.");
    }

    let (pool, services) = services::from_config(config).await?;
    verify_dims(services.gateway.as_ref()).await?;
    tracing::info!(
        model = services.gateway.model_name(),
        dims = services.gateway.dims(),
        generator = services.orchestrator.model_name(),
        "backends ready"
    );

    let bind_addr = config.server.bind.clone();
    let app = router(AppState::new(config.clone(), services))?;

    println!("blog-rag listening on http://{}", bind_addr);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    pool.close().await;
    Ok(())
}

/// Build the router with CORS from `[server].cors_origins`.
pub fn router(state: AppState) -> anyhow::Result<Router> {
    let cors = cors_layer(&state.config.server.cors_origins)?;

    Ok(Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/api/chat", post(handle_chat))
        .route("/api/search", get(handle_search))
        .route("/api/indexing/stats", get(handle_stats))
        .route("/api/indexing/trigger", post(handle_trigger))
        .layer(cors)
        .with_state(state))
}

fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    if origins.iter().any(|o| o == "*") {
        return Ok(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any));
    }
    let origins = origins
        .iter()
        .map(|o| HeaderValue::from_str(o.trim()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true))
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
    field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
                field: self.field,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(field: impl Into<String>, message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
        field: Some(field.into()),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
        field: None,
    }
}

/// Map a pipeline error to a response. Backend detail goes to the log only.
fn classify(err: RagError, locale: Locale) -> AppError {
    match err {
        RagError::InvalidInput { field, message } => bad_request(field, message),
        e if e.is_upstream() => {
            tracing::warn!(error = %e, "upstream unavailable");
            AppError {
                status: StatusCode::SERVICE_UNAVAILABLE,
                code: "upstream_unavailable",
                message: upstream_unavailable_message(locale).to_string(),
                field: None,
            }
        }
        e => {
            tracing::error!(error = %e, "request failed");
            AppError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                code: "internal",
                message: internal_error_message(locale).to_string(),
                field: None,
            }
        }
    }
}

// ============ Validation ============

/// Map a JSON body rejection onto the error contract. Type errors name the
/// offending field; anything else (bad syntax, wrong content type) is
/// reported against `body`.
fn body_rejection(rejection: JsonRejection) -> AppError {
    let message = rejection.body_text();
    let field = match &rejection {
        JsonRejection::JsonDataError(_) => message
            .split_once("target type: ")
            .and_then(|(_, rest)| rest.split_once(':'))
            .map(|(path, _)| path.trim())
            .filter(|path| !path.is_empty() && !path.contains(' '))
            .unwrap_or("body")
            .to_string(),
        _ => "body".to_string(),
    };
    bad_request(field, message)
}

fn validate_query(query: Option<&str>, max_chars: usize) -> Result<String, AppError> {
    let query = query.unwrap_or_default();
    if query.trim().is_empty() {
        return Err(bad_request("query", "query must not be empty"));
    }
    let chars = query.chars().count();
    if chars > max_chars {
        return Err(bad_request(
            "query",
            format!("query must be at most {} characters (got {})", max_chars, chars),
        ));
    }
    Ok(query.to_string())
}

fn parse_locale(raw: Option<&str>) -> Result<Option<Locale>, AppError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => s
            .parse::<Locale>()
            .map(Some)
            .map_err(|_| bad_request("locale", "locale must be one of: ko, en")),
    }
}

fn parse_top_k(raw: Option<&str>) -> Result<usize, AppError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(DEFAULT_SEARCH_TOP_K);
    };
    match raw.parse::<usize>() {
        Ok(k) if (1..=MAX_SEARCH_TOP_K).contains(&k) => Ok(k),
        _ => Err(bad_request(
            "top_k",
            format!("top_k must be an integer between 1 and {}", MAX_SEARCH_TOP_K),
        )),
    }
}

fn parse_min_similarity(raw: Option<&str>, default: f64) -> Result<f64, AppError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(default);
    };
    match raw.parse::<f64>() {
        Ok(v) if (0.0..=1.0).contains(&v) => Ok(v),
        _ => Err(bad_request(
            "min_similarity",
            "min_similarity must be a number between 0 and 1",
        )),
    }
}

// ============ GET / and GET /health ============

async fn handle_root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "blog-rag is running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    embedding_configured: bool,
    generation_configured: bool,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        embedding_configured: state.config.embedding.is_enabled(),
        generation_configured: state.config.generation.is_enabled(),
    })
}

// ============ POST /api/chat ============

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
}

/// Handler for `POST /api/chat`.
///
/// Validation, retrieval, and the no-results check all happen before the
/// response starts, so their failures are ordinary JSON errors. Once the
/// SSE stream is open, failures arrive in-band as an apology chunk.
async fn handle_chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(req) = payload.map_err(body_rejection)?;
    let query = validate_query(req.query.as_deref(), MAX_CHAT_QUERY_CHARS)?;
    let locale = parse_locale(req.locale.as_deref())?.unwrap_or_default();

    let params = RetrievalParams {
        top_k: state.config.retrieval.top_k,
        min_similarity: state.config.retrieval.min_similarity,
        content_type: None,
    };
    let passages = state
        .services
        .retriever
        .retrieve(&query, Some(locale.as_str()), &params)
        .await
        .map_err(|e| classify(e, locale))?;

    if passages.is_empty() {
        tracing::info!(%locale, "chat: no passages above the similarity floor");
        return Err(not_found(no_results_message(locale)));
    }
    tracing::info!(%locale, passages = passages.len(), "chat: streaming answer");

    let events = state
        .services
        .orchestrator
        .stream(&query, locale, passages)
        .map(|event| {
            let frame = Event::default().json_data(&event).unwrap_or_else(|e| {
                tracing::error!(error = %e, "failed to encode stream event");
                Event::default().comment("encode error")
            });
            Ok::<_, Infallible>(frame)
        });

    Ok((
        [
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
            (header::CONNECTION, HeaderValue::from_static("keep-alive")),
            (
                HeaderName::from_static("x-accel-buffering"),
                HeaderValue::from_static("no"),
            ),
        ],
        Sse::new(events).keep_alive(KeepAlive::default()),
    )
        .into_response())
}

// ============ GET /api/search ============

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub query: Option<String>,
    pub locale: Option<String>,
    pub top_k: Option<String>,
    pub min_similarity: Option<String>,
    pub content_type: Option<String>,
}

/// Handler for `GET /api/search`. An empty result is `200 []`.
async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<Vec<Passage>>, AppError> {
    let query = validate_query(params.query.as_deref(), MAX_SEARCH_QUERY_CHARS)?;
    let locale = parse_locale(params.locale.as_deref())?;
    let retrieval = RetrievalParams {
        top_k: parse_top_k(params.top_k.as_deref())?,
        min_similarity: parse_min_similarity(
            params.min_similarity.as_deref(),
            state.config.retrieval.min_similarity,
        )?,
        content_type: params.content_type.filter(|t| !t.trim().is_empty()),
    };

    let passages = state
        .services
        .retriever
        .retrieve(&query, locale.as_ref().map(Locale::as_str), &retrieval)
        .await
        .map_err(|e| classify(e, locale.unwrap_or_default()))?;

    Ok(Json(passages))
}

// ============ /api/indexing ============

async fn handle_stats(State(state): State<AppState>) -> Result<Json<IndexStats>, AppError> {
    state
        .services
        .index
        .stats()
        .await
        .map(Json)
        .map_err(|e| classify(e, Locale::default()))
}

#[derive(Debug, Default, Deserialize)]
pub struct TriggerRequest {
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
}

#[derive(Serialize)]
struct TriggerResponse {
    status: &'static str,
    message: String,
    indexed_count: i64,
    embeddings_path: String,
}

/// Handler for `POST /api/indexing/trigger`.
///
/// Indexing is an offline job; this reports the current record count and
/// how to run it instead of starting it.
async fn handle_trigger(
    State(state): State<AppState>,
    body: Result<Option<Json<TriggerRequest>>, JsonRejection>,
) -> Result<Json<TriggerResponse>, AppError> {
    let req = body
        .map_err(body_rejection)?
        .map(|Json(r)| r)
        .unwrap_or_default();
    let locale = parse_locale(req.locale.as_deref())?.unwrap_or_default();
    let stats = state
        .services
        .index
        .stats()
        .await
        .map_err(|e| classify(e, locale))?;

    Ok(Json(TriggerResponse {
        status: "info",
        message: "Indexing runs offline. Run `blog-rag index` to rebuild the index.".to_string(),
        indexed_count: stats.total,
        embeddings_path: state.config.db.path.display().to_string(),
    }))
}
