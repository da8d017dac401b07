use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::{ClientError, Result};
use crate::transcript::Exchange;

const FALLBACK_IMAGE_TYPE: &str = "image/png";

// Body of POST /api/chat
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub message: String,
    pub history: Vec<Exchange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// `response` is the reply on success and a readable error otherwise.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatResponse {
    pub success: bool,
    #[serde(default)]
    pub response: String,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    inputs: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl GeneratedImage {
    /// Self-contained address for the image, usable directly as an `src`.
    pub fn to_data_url(&self) -> String {
        data_url(&self.content_type, &self.bytes)
    }
}

pub fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// The two remote collaborators: chat completion and image inference.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    chat_url: String,
    image_url: String,
}

impl ApiClient {
    pub fn new(chat_url: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            chat_url: chat_url.into(),
            image_url: image_url.into(),
        }
    }

    /// The body is decoded whatever the status code: the endpoint reports
    /// its own failures as `{success: false}`.
    #[instrument(skip(self, request), fields(url = %self.chat_url, history = request.history.len()))]
    pub async fn send_chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let response = self
            .http
            .post(&self.chat_url)
            .json(request)
            .send()
            .await
            .map_err(|source| ClientError::Transport {
                url: self.chat_url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "chat endpoint returned non-success status");
        }

        let chat_response = response
            .json::<ChatResponse>()
            .await
            .map_err(|source| ClientError::Decode {
                url: self.chat_url.clone(),
                source,
            })?;

        debug!(success = chat_response.success, "received chat response");
        Ok(chat_response)
    }

    #[instrument(skip(self), fields(url = %self.image_url))]
    pub async fn generate_image(&self, prompt: &str) -> Result<GeneratedImage> {
        let response = self
            .http
            .post(&self.image_url)
            .json(&ImageRequest { inputs: prompt })
            .send()
            .await
            .map_err(|source| ClientError::Transport {
                url: self.image_url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                url: self.image_url.clone(),
                status,
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .filter(|value| value.starts_with("image/"))
            .unwrap_or(FALLBACK_IMAGE_TYPE)
            .to_string();

        let bytes = response.bytes().await.map_err(|source| ClientError::Decode {
            url: self.image_url.clone(),
            source,
        })?;

        debug!(%content_type, size = bytes.len(), "received generated image");
        Ok(GeneratedImage {
            content_type,
            bytes: bytes.to_vec(),
        })
    }
}
