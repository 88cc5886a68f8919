//! HTTP composition backend.
//!
//! Sends both images base64-encoded to a model server:
//!
//! ```json
//! { "humanImage": "<base64>", "clothImage": "<base64>", "seed": 42 }
//! ```
//!
//! and accepts either `{ "image": "<base64>" }` or `{ "media_url": "<url>" }`
//! in return. The result is written to a fresh artifact path.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use tryon_core::error::CompositionError;
use tryon_core::{CompositionRequest, Compositor, Error, naming};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ComposeBody {
    human_image: String,
    cloth_image: String,
    seed: u64,
}

#[derive(Deserialize)]
struct ComposeResponse {
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    media_url: Option<String>,
}

pub struct HttpCompositor {
    endpoint: String,
    api_token: Option<String>,
    seed: u64,
    output_dir: PathBuf,
    client: reqwest::Client,
}

impl HttpCompositor {
    pub fn new(
        endpoint: impl Into<String>,
        api_token: Option<String>,
        seed: u64,
        timeout: Duration,
        output_dir: impl Into<PathBuf>,
    ) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            endpoint: endpoint.into(),
            api_token,
            seed,
            output_dir: output_dir.into(),
            client,
        })
    }

    fn backend_error(reason: impl Into<String>) -> CompositionError {
        CompositionError::Backend {
            backend: "http".into(),
            reason: reason.into(),
        }
    }

    async fn encode(path: &Path) -> Result<String, CompositionError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| Self::backend_error(format!("{}: {e}", path.display())))?;
        Ok(BASE64.encode(bytes))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, CompositionError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Self::backend_error(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Self::backend_error(format!(
                "result download returned {}",
                response.status().as_u16()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Self::backend_error(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Compositor for HttpCompositor {
    fn name(&self) -> &str {
        "http"
    }

    async fn compose(&self, request: CompositionRequest) -> Result<PathBuf, CompositionError> {
        let body = ComposeBody {
            human_image: Self::encode(&request.person_image).await?,
            cloth_image: Self::encode(&request.garment_image).await?,
            seed: self.seed,
        };

        debug!(endpoint = %self.endpoint, user = %request.user_id, "Sending composition request");

        let mut call = self.client.post(&self.endpoint).json(&body);
        if let Some(token) = &self.api_token {
            call = call.bearer_auth(token);
        }
        let response = call.send().await.map_err(|e| {
            if e.is_timeout() {
                Self::backend_error("request timed out")
            } else {
                Self::backend_error(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Composition backend returned error");
            return Err(Self::backend_error(format!("status {status}: {error_body}")));
        }

        let parsed: ComposeResponse = response
            .json()
            .await
            .map_err(|e| Self::backend_error(format!("failed to parse response: {e}")))?;

        let bytes = match (parsed.image, parsed.media_url) {
            (Some(image), _) => BASE64
                .decode(image.trim())
                .map_err(|e| Self::backend_error(format!("invalid base64 image: {e}")))?,
            (None, Some(url)) => self.download(&url).await?,
            (None, None) => return Err(Self::backend_error("response carried no image")),
        };

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| Self::backend_error(format!("{}: {e}", self.output_dir.display())))?;
        let output = naming::artifact_path(&self.output_dir, &request.user_id);
        tokio::fs::write(&output, bytes)
            .await
            .map_err(|e| Self::backend_error(format!("{}: {e}", output.display())))?;

        Ok(output)
    }
}
