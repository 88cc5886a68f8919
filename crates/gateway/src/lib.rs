//! HTTP gateway for the try-on bot.
//!
//! Routes:
//! - `GET /health`
//! - `POST /webhook`: form-encoded message from the messaging provider,
//!   answered with `{ "text", "media_url"? }`
//! - `GET /get_image/{name}`: produced artifacts
//!
//! Built on Axum; all session logic lives in `tryon-session`.

use std::path::Path;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Form, Path as UrlPath, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::{
    Router,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use tryon_config::AppConfig;
use tryon_core::error::ArtifactError;
use tryon_core::{Error, Fetcher, InboundEvent, OutboundReply};
use tryon_session::{ArtifactStore, SessionEngine};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub engine: Arc<SessionEngine>,
    pub artifacts: Arc<ArtifactStore>,
    pub public_base_url: String,
}

/// Public URL for an artifact path, if it has a usable file name.
pub fn artifact_url(public_base_url: &str, artifact: &Path) -> Option<String> {
    let name = artifact.file_name()?.to_str()?;
    Some(format!(
        "{}/get_image/{}",
        public_base_url.trim_end_matches('/'),
        name
    ))
}

type SharedState = Arc<GatewayState>;

/// Wire the ledger, backends and session engine from configuration.
///
/// `fetcher` is passed in because the webhook and the local chat accept
/// different kinds of attachment locators.
pub async fn build_state(
    config: &AppConfig,
    fetcher: Arc<dyn Fetcher>,
) -> Result<GatewayState, Error> {
    let ledger = tryon_ledger::build_from_config(config).await?;
    let compositor = tryon_backends::build_compositor(config)?;
    let log = tryon_ledger::build_conversation_log(config);

    let engine = SessionEngine::from_config(config, ledger.clone(), fetcher, compositor, log);
    let artifacts = ArtifactStore::new(config.storage.output_dir.clone(), ledger);

    Ok(GatewayState {
        engine: Arc::new(engine),
        artifacts: Arc::new(artifacts),
        public_base_url: config.gateway.public_base_url.clone(),
    })
}

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/webhook", post(webhook_handler))
        .route("/get_image/{name}", get(image_handler))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let fetcher = tryon_backends::build_remote_fetcher(&config)?;
    let state = build_state(&config, fetcher).await?;
    info!(
        ledger = state.engine.ledger().name(),
        public_base_url = %state.public_base_url,
        "Session engine ready"
    );

    let app = build_router(Arc::new(state));

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// The messaging provider's webhook fields.
#[derive(Deserialize)]
struct WebhookForm {
    #[serde(rename = "From")]
    from: String,
    #[serde(rename = "Body", default)]
    body: String,
    #[serde(rename = "NumMedia", default)]
    num_media: u32,
    #[serde(rename = "MediaUrl0", default)]
    media_url: Option<String>,
}

impl From<WebhookForm> for InboundEvent {
    fn from(form: WebhookForm) -> Self {
        InboundEvent {
            user_id: form.from.as_str().into(),
            text: form.body,
            attachment_count: form.num_media,
            attachment_ref: form.media_url,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct WebhookResponse {
    text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    media_url: Option<String>,
}

async fn webhook_handler(
    State(state): State<SharedState>,
    Form(form): Form<WebhookForm>,
) -> Json<WebhookResponse> {
    let event = InboundEvent::from(form);
    info!(
        user = %event.user_id,
        text_len = event.text.len(),
        attachments = event.attachment_count,
        "Webhook message received"
    );

    let OutboundReply { text, artifact } = state.engine.handle(event).await;
    let media_url = artifact
        .as_deref()
        .and_then(|p| artifact_url(&state.public_base_url, p));
    Json(WebhookResponse { text, media_url })
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

async fn image_handler(
    State(state): State<SharedState>,
    UrlPath(name): UrlPath<String>,
) -> Response {
    match state.artifacts.read(&name).await {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, "image/jpeg".to_string()),
                (header::CONTENT_DISPOSITION, format!("inline; filename=\"{name}\"")),
            ],
            bytes,
        )
            .into_response(),
        Err(ArtifactError::NotFound(_)) => error_body(StatusCode::NOT_FOUND, "Image not found"),
        Err(e) => {
            error!(name = %name, error = %e, "Failed to read artifact");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read image")
        }
    }
}
