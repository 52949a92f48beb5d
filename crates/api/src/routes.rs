use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use extract::{
    AnalysisInput, CatalogProduct, CompletionModel, ErrorKind, Extractor, PipelineResult,
};
use matching::{EditalRequirement, MatchingInput, ProductMatcher};
use pipeline::{FullPipeline, FullPipelineInput};
use serde::Serialize;
use serde_json::{Value, json};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::audit::{EditalStatus, LogWriter, Stage};
use crate::catalog::CatalogSource;
use crate::config::AppConfig;
use crate::metrics::{Metrics, TimedOperation};

pub struct AppState {
    pub model: Arc<dyn CompletionModel>,
    pub catalog: Arc<dyn CatalogSource>,
    pub log: Arc<dyn LogWriter>,
    pub metrics: Arc<Metrics>,
    pub config: Arc<AppConfig>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(get_metrics))
        .route("/api/ia/process", get(process_info).post(process_edital))
        .route(
            "/api/ia/match-products",
            get(matching_info).post(match_products),
        )
        .route(
            "/api/ia/full-process",
            get(full_process_info).post(full_process),
        )
        .route("/api/ia/edital/:id", get(edital_record))
        .route("/api/ia/edital/:id/logs", get(edital_logs))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// A request turned away before a pipeline ran.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "success": false, "error": self.message })),
        )
            .into_response()
    }
}

fn json_body(body: Result<Json<Value>, JsonRejection>) -> Result<Value, ApiError> {
    let Json(value) =
        body.map_err(|e| ApiError::bad_request(format!("Invalid request body: {}", e.body_text())))?;
    if !value.is_object() {
        return Err(ApiError::bad_request("Request body must be a JSON object"));
    }
    Ok(value)
}

fn required_string(body: &Value, key: &str) -> Result<String, ApiError> {
    body.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::bad_request(format!("{key} is required and must be a string")))
}

fn optional_string(body: &Value, key: &str) -> Result<Option<String>, ApiError> {
    match body.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ApiError::bad_request(format!(
            "{key} must be a string if provided"
        ))),
    }
}

fn product_ids(body: &Value) -> Result<Option<Vec<String>>, ApiError> {
    match body.get("productIds") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .map(Some)
            .ok_or_else(|| ApiError::bad_request("productIds must be an array of strings")),
        Some(_) => Err(ApiError::bad_request("productIds must be an array of strings")),
    }
}

fn edital_text(body: &Value) -> Result<String, ApiError> {
    let text = required_string(body, "editalText")?;
    if text.trim().is_empty() {
        return Err(ApiError::bad_request("editalText cannot be empty"));
    }
    Ok(text)
}

async fn load_products(
    state: &AppState,
    ids: Option<&[String]>,
) -> Result<Vec<CatalogProduct>, ApiError> {
    let products = state.catalog.active_products(ids).await.map_err(|e| {
        error!(error = %e, "Catalog lookup failed");
        ApiError::internal(format!("Failed to fetch products: {e}"))
    })?;
    if products.is_empty() {
        return Err(ApiError::not_found("No active products found in catalog"));
    }
    Ok(products)
}

/// Status code for a finished pipeline run.
fn pipeline_response<T: Serialize>(result: &PipelineResult<T>) -> Response {
    let status = match (result.success, result.kind) {
        (true, _) => StatusCode::OK,
        (false, Some(ErrorKind::Validation)) => StatusCode::BAD_REQUEST,
        (false, _) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(result)).into_response()
}

/// What a successful run writes to the document: a log message and, optionally, a new
/// workflow status.
struct Completion {
    message: String,
    status: Option<EditalStatus>,
    best_product_id: Option<String>,
}

impl Completion {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            best_product_id: None,
        }
    }

    fn advance(mut self, status: EditalStatus, best_product_id: Option<String>) -> Self {
        self.status = Some(status);
        self.best_product_id = best_product_id;
        self
    }
}

/// Count the run, close the document's timeline with a success or failure entry and, on
/// success, move the document along its workflow.
fn record_outcome<T>(
    state: &AppState,
    stage: Stage,
    edital_id: Option<&str>,
    timer: &TimedOperation,
    result: &PipelineResult<T>,
    complete: impl FnOnce(&T) -> Completion,
) {
    state
        .metrics
        .record_run(stage, result.success, timer.elapsed());

    let Some(edital_id) = edital_id else {
        return;
    };
    match &result.data {
        Some(data) if result.success => {
            let completion = complete(data);
            state.log.record(edital_id, stage, completion.message);
            if let Some(status) = completion.status {
                state
                    .log
                    .set_status(edital_id, status, completion.best_product_id);
            }
        }
        _ => {
            let message = format!(
                "Failed: {}",
                result.error.as_deref().unwrap_or("Unknown error")
            );
            state.log.record(edital_id, stage, message);
        }
    }
}

fn reject(state: &AppState, e: ApiError) -> Response {
    state.metrics.record_rejection();
    info!(status = %e.status, error = %e.message, "Request rejected");
    e.into_response()
}

async fn process_edital(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    state.metrics.record_request();
    match run_process(&state, body).await {
        Ok(response) => response,
        Err(e) => reject(&state, e),
    }
}

async fn run_process(
    state: &AppState,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let body = json_body(body)?;
    let edital_id = optional_string(&body, "editalId")?;
    let text = required_string(&body, "editalText")?;
    let name = required_string(&body, "editalName")?;
    let context = optional_string(&body, "context")?;

    if text.trim().is_empty() {
        return Err(ApiError::bad_request("editalText cannot be empty"));
    }
    let limit = state.config.limits.max_process_chars;
    if text.chars().count() > limit {
        return Err(ApiError::bad_request(format!(
            "editalText exceeds maximum length ({limit} characters)"
        )));
    }

    let stage = Stage::AiProcessing;
    if let Some(id) = edital_id.as_deref() {
        state
            .log
            .record(id, stage, format!("Starting {}", stage.describe()));
    }

    let input = AnalysisInput {
        edital_text: text.trim().to_string(),
        edital_name: name.trim().to_string(),
        context: context.map(|c| c.trim().to_string()),
    };
    let timer = TimedOperation::start();
    let result = Extractor::new(state.model.clone())
        .with_retry(state.config.retry.policy_for(stage))
        .process(&input)
        .await;

    record_outcome(state, stage, edital_id.as_deref(), &timer, &result, |data| {
        let status = if data.compliance {
            EditalStatus::RequirementsExtracted
        } else {
            EditalStatus::Processing
        };
        Completion::new(format!(
            "AI processing completed. Compliance: {}",
            data.compliance
        ))
        .advance(status, None)
    });
    Ok(pipeline_response(&result))
}

async fn match_products(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    state.metrics.record_request();
    match run_matching(&state, body).await {
        Ok(response) => response,
        Err(e) => reject(&state, e),
    }
}

async fn run_matching(
    state: &AppState,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let body = json_body(body)?;
    let edital_id = optional_string(&body, "editalId")?;
    let raw_requirements = body
        .get("requirements")
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::bad_request("requirements array is required"))?;
    if raw_requirements.is_empty() {
        return Err(ApiError::bad_request("At least one requirement is needed"));
    }
    let requirements = raw_requirements
        .iter()
        .map(EditalRequirement::from_value)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    let ids = product_ids(&body)?;

    let products = load_products(state, ids.as_deref()).await?;

    let stage = Stage::ProductMatching;
    if let Some(id) = edital_id.as_deref() {
        state.log.record(
            id,
            stage,
            format!(
                "Starting {} with {} catalog products",
                stage.describe(),
                products.len()
            ),
        );
    }

    let input = MatchingInput {
        requirements,
        products,
    };
    let timer = TimedOperation::start();
    let result = ProductMatcher::new(state.model.clone())
        .with_retry(state.config.retry.policy_for(stage))
        .with_score_policy(state.config.scoring.policy)
        .match_products(&input)
        .await;

    record_outcome(state, stage, edital_id.as_deref(), &timer, &result, |data| {
        match &data.best_match {
            Some(best) => Completion::new(format!(
                "Product matching completed. Best product: {} (score: {})",
                best.product_names.join(", "),
                best.compliance_score
            ))
            .advance(EditalStatus::ProductSelected, None),
            None => Completion::new(
                "Product matching completed. No product meets every mandatory requirement",
            ),
        }
    });
    Ok(pipeline_response(&result))
}

async fn full_process(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    state.metrics.record_request();
    match run_full_process(&state, body).await {
        Ok(response) => response,
        Err(e) => reject(&state, e),
    }
}

async fn run_full_process(
    state: &AppState,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let body = json_body(body)?;
    let edital_id = optional_string(&body, "editalId")?;
    let text = edital_text(&body)?;
    let name = required_string(&body, "editalName")?;
    let ids = product_ids(&body)?;

    let products = load_products(state, ids.as_deref()).await?;

    let stage = Stage::FullPipeline;
    if let Some(id) = edital_id.as_deref() {
        state.log.record(
            id,
            stage,
            format!(
                "Starting {} with {} catalog products",
                stage.describe(),
                products.len()
            ),
        );
    }

    let input = FullPipelineInput {
        edital_text: text,
        edital_name: name,
        products,
    };
    let timer = TimedOperation::start();
    let result = FullPipeline::new(state.model.clone())
        .with_retry(state.config.retry.policy_for(stage))
        .with_score_policy(state.config.scoring.policy)
        .run(&input)
        .await;

    record_outcome(state, stage, edital_id.as_deref(), &timer, &result, |data| {
        match &data.best_product_identified {
            Some(best) => Completion::new(format!(
                "Full pipeline completed. Selected product: {} (confidence: {})",
                best.product_name,
                best.confidence.as_str()
            ))
            .advance(EditalStatus::ProductSelected, Some(best.product_id.clone())),
            None => Completion::new(
                "Full pipeline completed. No product fully meets the requirements",
            )
            .advance(EditalStatus::RequirementsExtracted, None),
        }
    });
    Ok(pipeline_response(&result))
}

#[derive(Serialize)]
struct EndpointInfo {
    status: &'static str,
    message: &'static str,
    model: String,
    capabilities: &'static [&'static str],
}

async fn process_info(State(state): State<Arc<AppState>>) -> Json<EndpointInfo> {
    Json(EndpointInfo {
        status: "ok",
        message: "AI processing endpoint is ready",
        model: state.model.model_id().to_string(),
        capabilities: &["Edital summary", "Clarity assessment", "Recommendations"],
    })
}

async fn matching_info(State(state): State<Arc<AppState>>) -> Json<EndpointInfo> {
    Json(EndpointInfo {
        status: "ok",
        message: "Product matching endpoint is ready",
        model: state.model.model_id().to_string(),
        capabilities: &[
            "Requirement-by-requirement compliance",
            "Product scoring",
            "Best product or minimal product set",
        ],
    })
}

async fn full_process_info(State(state): State<Arc<AppState>>) -> Json<EndpointInfo> {
    Json(EndpointInfo {
        status: "ok",
        message: "Full AI pipeline endpoint is ready",
        model: state.model.model_id().to_string(),
        capabilities: &[
            "Requirement extraction from edital",
            "Product matching against catalog",
            "Best product identification",
            "Compliance verification",
        ],
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    model: String,
    model_reachable: bool,
}

async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let reachable = state.model.health_check().await;
    let status = if reachable {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(HealthResponse {
            status: if reachable { "ok" } else { "degraded" },
            model: state.model.model_id().to_string(),
            model_reachable: reachable,
        }),
    )
}

async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<crate::metrics::MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

/// Workflow status and timeline of one document.
async fn edital_record(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let record = state.log.status(&id);
    let logs = state.log.timeline(&id);
    if record.is_none() && logs.is_empty() {
        return Err(ApiError::not_found("Edital not found"));
    }
    Ok(Json(json!({
        "success": true,
        "data": { "edital": record, "logs": logs },
    })))
}

async fn edital_logs(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Json<Value> {
    let entries = state.log.timeline(&id);
    Json(json!({ "edital_id": id, "entries": entries }))
}
