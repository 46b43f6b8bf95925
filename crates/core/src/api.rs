use crate::error::PipelineError;
use crate::normalize::normalize_whitespace;
use crate::traits::Answerer;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

pub const LIVENESS_STATUS: &str = "Sports RAG API running";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Services shared by every request; built once at startup.
#[derive(Clone)]
pub struct ApiState {
    pub answerer: Arc<dyn Answerer>,
    pub request_timeout: Duration,
}

impl ApiState {
    pub fn new(answerer: Arc<dyn Answerer>) -> Self {
        Self {
            answerer,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AskResponse {
    pub answer: String,
}

/// One entry of a 422 body: where the problem is, what it is, and its kind.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ValidationDetail {
    pub loc: Vec<String>,
    pub msg: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug)]
pub enum ApiError {
    Validation(Vec<ValidationDetail>),
    Pipeline(PipelineError),
}

impl ValidationDetail {
    fn body(field: Option<&str>, msg: &str, kind: &str) -> Self {
        let mut loc = vec!["body".to_string()];
        loc.extend(field.map(str::to_string));
        Self {
            loc,
            msg: msg.to_string(),
            kind: kind.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let text = rejection.body_text();
        let kind = match &rejection {
            JsonRejection::JsonSyntaxError(_) => "json_invalid",
            JsonRejection::MissingJsonContentType(_) => "content_type",
            _ => "value_error",
        };
        ApiError::Validation(vec![ValidationDetail::body(None, &text, kind)])
    }
}

impl AskRequest {
    /// Checks a decoded JSON body field by field, so every problem names
    /// its location.
    pub fn from_json(body: Value) -> Result<Self, ApiError> {
        let Value::Object(mut fields) = body else {
            return Err(ApiError::Validation(vec![ValidationDetail::body(
                None,
                "Input should be a valid dictionary or object to extract fields from",
                "model_attributes_type",
            )]));
        };

        match fields.remove("question") {
            Some(Value::String(question)) => Ok(Self { question }),
            Some(_) => Err(ApiError::Validation(vec![ValidationDetail::body(
                Some("question"),
                "Input should be a valid string",
                "string_type",
            )])),
            None => Err(ApiError::Validation(vec![ValidationDetail::body(
                Some("question"),
                "Field required",
                "missing",
            )])),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(detail) => {
                (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "detail": detail }))).into_response()
            }
            ApiError::Pipeline(error) => {
                let (status, detail) = match &error {
                    PipelineError::Embedding(_) | PipelineError::Index(_) => (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "retrieval is unavailable",
                    ),
                    PipelineError::Generation(_) => {
                        (StatusCode::BAD_GATEWAY, "language model call failed")
                    }
                    PipelineError::Timeout(_) => {
                        (StatusCode::GATEWAY_TIMEOUT, "question was not answered in time")
                    }
                };
                (status, Json(json!({ "detail": detail }))).into_response()
            }
        }
    }
}

/// Collapses internal whitespace runs and trims the generated answer.
pub fn normalize_answer(answer: &str) -> String {
    normalize_whitespace(answer)
}

pub fn app_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(health))
        .route("/ask", post(ask))
        .route("/ui", get(ui))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub async fn serve<F>(listener: TcpListener, state: ApiState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(address = ?listener.local_addr().ok(), "api listening");
    axum::serve(listener, app_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": LIVENESS_STATUS }))
}

async fn ui() -> impl IntoResponse {
    Html(include_str!("../assets/index.html"))
}

async fn ask(
    State(state): State<ApiState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<AskResponse>, ApiError> {
    let Json(body) = payload?;
    let request = AskRequest::from_json(body)?;
    let request_id = Uuid::new_v4();
    let span = info_span!("ask", %request_id);

    async move {
        info!(question_chars = request.question.chars().count(), "question received");

        let answered = tokio::time::timeout(
            state.request_timeout,
            state.answerer.answer(&request.question),
        )
        .await
        .unwrap_or(Err(PipelineError::Timeout(state.request_timeout)));

        match answered {
            Ok(result) => Ok(Json(AskResponse {
                answer: normalize_answer(&result.answer),
            })),
            Err(failure) => {
                error!(error = %failure, "question failed");
                Err(ApiError::Pipeline(failure))
            }
        }
    }
    .instrument(span)
    .await
}
