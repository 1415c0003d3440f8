use crate::analysis::{build_prompt, extract_links};
use crate::config::Config;
use crate::error::AppError;
use crate::gemini::GenerationBackend;
use async_trait::async_trait;
use axum::{
    extract::{Form, FromRequest, Request, State},
    http::header::CONTENT_TYPE,
    routing::{get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};
use uuid::Uuid;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: Arc<Config>,
    pub backend: Arc<dyn GenerationBackend>,
}

pub fn create_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/analyze-error", post(handle_analyze))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub full_response: String,
    pub extracted_links: Vec<String>,
}

/// Accepts the request body as JSON or form-encoded, dispatching on the
/// Content-Type header. Decode failures map to `AppError::InvalidRequest`.
pub struct JsonOrForm<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonOrForm<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if content_type.starts_with("application/json") {
            let Json(body) = Json::<T>::from_request(req, state)
                .await
                .map_err(|rejection| AppError::InvalidRequest(rejection.to_string()))?;
            return Ok(Self(body));
        }

        if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(body) = Form::<T>::from_request(req, state)
                .await
                .map_err(|rejection| AppError::InvalidRequest(rejection.to_string()))?;
            return Ok(Self(body));
        }

        Err(AppError::InvalidRequest(format!(
            "unsupported content type: {content_type}"
        )))
    }
}

async fn handle_root() -> Json<serde_json::Value> {
    Json(json!({ "message": "hello" }))
}

#[instrument(skip(state, request), fields(request_id = %Uuid::new_v4()))]
async fn handle_analyze(
    State(state): State<SharedState>,
    JsonOrForm(request): JsonOrForm<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let (error_message, code) = match (
        request.error_message.as_deref().filter(|s| !s.is_empty()),
        request.code.as_deref().filter(|s| !s.is_empty()),
    ) {
        (Some(error_message), Some(code)) => (error_message, code),
        _ => return Err(AppError::MissingField),
    };

    info!(model = %state.config.provider.model, "Analyze request received");

    let prompt = build_prompt(error_message, code);
    let text = state.backend.generate(&prompt).await?;
    let links = extract_links(&text);

    Ok(Json(AnalyzeResponse {
        full_response: text,
        extracted_links: links,
    }))
}
