use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metals_core::domain::{DateKey, FeatureKey};
use metals_core::job::{ExtractionFailure, Extractor};
use metals_core::storage::{is_reserved_feature, BULK_DIR_NAME};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

const JOB_ENDPOINTS: [&str; 3] = [
    "/extract_metals_data (POST method, requires JSON body)",
    "/extract_all_data (POST method, no JSON body required)",
    "/data/raw/<feature>/<date> (GET method, retrieves saved JSON)",
];

#[derive(Debug, Clone)]
pub struct AppState {
    pub extractor: Arc<Extractor>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(server_status))
        .route("/extract_metals_data", post(extract_metals_data))
        .route("/extract_all_data", post(extract_all_data))
        .route("/data/raw/:feature/:date", get(get_raw_data))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Error bodies differ by route family: job triggers answer `{"status":"error","message":..}`,
/// the data route answers `{"error":..}`.
#[derive(Debug)]
enum ApiError {
    Job(StatusCode, String),
    Data(StatusCode, String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Job(status, message) => (
                status,
                Json(json!({ "status": "error", "message": message })),
            )
                .into_response(),
            Self::Data(status, message) => (status, Json(json!({ "error": message }))).into_response(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ServerStatus {
    status: &'static str,
    timestamp: String,
    job_endpoints: [&'static str; 3],
}

async fn server_status() -> Json<ServerStatus> {
    Json(ServerStatus {
        status: "Metals extraction API is running",
        timestamp: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        job_endpoints: JOB_ENDPOINTS,
    })
}

#[derive(Debug, Serialize)]
struct ExtractResponse {
    status: &'static str,
    message: &'static str,
    feature: String,
    date: String,
    saved_to: String,
}

async fn extract_metals_data(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ExtractResponse>, ApiError> {
    let (date_raw, feature_raw) = parse_extract_request(&headers, &body)?;

    let date = DateKey::parse(&date_raw)
        .map_err(|e| ApiError::Job(StatusCode::BAD_REQUEST, format!("{e:#}")))?;
    let feature = FeatureKey::parse(&feature_raw)
        .map_err(|e| ApiError::Job(StatusCode::BAD_REQUEST, format!("{e:#}")))?;
    if is_reserved_feature(&feature) {
        return Err(ApiError::Job(
            StatusCode::BAD_REQUEST,
            format!("'{BULK_DIR_NAME}' is reserved and cannot be used as a feature"),
        ));
    }

    let extraction = state.extractor.extract(&date, &feature).await.map_err(|err| {
        report_failure(&err);
        ApiError::Job(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Data extraction job failed or returned no valid path. Check server logs.".to_string(),
        )
    })?;

    Ok(Json(ExtractResponse {
        status: "success",
        message: "Data extraction job completed successfully.",
        feature: feature_raw,
        date: date_raw,
        saved_to: extraction.path.display().to_string(),
    }))
}

#[derive(Debug, Serialize)]
struct ExtractAllResponse {
    status: &'static str,
    message: String,
    total_files: usize,
    saved_to_dir: String,
}

async fn extract_all_data(
    State(state): State<AppState>,
) -> Result<Json<ExtractAllResponse>, ApiError> {
    let saved = state.extractor.extract_all().await.map_err(|err| {
        report_failure(&err);
        ApiError::Job(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Global data extraction job failed. Check server logs.".to_string(),
        )
    })?;

    Ok(Json(ExtractAllResponse {
        status: "success",
        message: format!("Successfully extracted and saved {} files.", saved.len()),
        total_files: saved.len(),
        saved_to_dir: state.extractor.layout().bulk_dir().display().to_string(),
    }))
}

async fn get_raw_data(
    State(state): State<AppState>,
    Path((feature_raw, date_raw)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let feature = FeatureKey::parse(&feature_raw)
        .map_err(|e| ApiError::Data(StatusCode::BAD_REQUEST, format!("{e:#}")))?;
    if is_reserved_feature(&feature) {
        return Err(ApiError::Data(
            StatusCode::BAD_REQUEST,
            format!(
                "Direct access to {BULK_DIR_NAME} root is not supported via this simple route. \
                 Use /data/raw/<FEATURE>/<DATE>."
            ),
        ));
    }
    let date = DateKey::parse(&date_raw)
        .map_err(|e| ApiError::Data(StatusCode::BAD_REQUEST, format!("{e:#}")))?;

    let not_found = || {
        ApiError::Data(
            StatusCode::NOT_FOUND,
            format!("File not found for feature '{feature_raw}' on date '{date_raw}'"),
        )
    };

    let path = state
        .extractor
        .layout()
        .locate(&feature, &date)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to look up saved file");
            ApiError::Data(StatusCode::INTERNAL_SERVER_ERROR, "Error serving file".to_string())
        })?
        .ok_or_else(not_found)?;

    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            return not_found();
        }
        tracing::error!(path = %path.display(), error = %e, "failed to read saved file");
        ApiError::Data(StatusCode::INTERNAL_SERVER_ERROR, "Error serving file".to_string())
    })?;

    Ok(([(header::CONTENT_TYPE, "application/json")], bytes).into_response())
}

fn parse_extract_request(headers: &HeaderMap, body: &[u8]) -> Result<(String, String), ApiError> {
    let bad_request = |message: &str| ApiError::Job(StatusCode::BAD_REQUEST, message.to_string());

    if !is_json(headers) {
        return Err(bad_request("Missing JSON in request"));
    }

    let value = serde_json::from_slice::<Value>(body)
        .map_err(|_| bad_request("Malformed JSON in request"))?;

    let fields = value
        .as_object()
        .filter(|o| o.contains_key("date") && o.contains_key("feature"))
        .ok_or_else(|| bad_request("Missing required keys: 'date' and 'feature'"))?;

    match (
        fields.get("date").and_then(Value::as_str),
        fields.get("feature").and_then(Value::as_str),
    ) {
        (Some(date), Some(feature)) => Ok((date.to_string(), feature.to_string())),
        _ => Err(bad_request("'date' and 'feature' must be strings")),
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    let Some(content_type) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
}

fn report_failure(err: &ExtractionFailure) {
    sentry_anyhow::capture_anyhow(&anyhow::Error::new(err.clone()));
    tracing::error!(stage = err.stage.as_str(), error = %err, "extraction job failed");
}
