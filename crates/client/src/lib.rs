//! HTTP adapters for the remote solver service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use solver_core::{HealthStatus, ImageInput, ImageSolveResponse, Settings, SolveRequest, SolveResponse};
use tracing::debug;

mod error;
pub mod normalize;

pub use error::{SolveError, SolveResult};
pub use normalize::{CONNECTIVITY_MESSAGE, IMAGE_FALLBACK, TEXT_FALLBACK, error_message};

/// The solver service as seen by the application layer.
#[async_trait]
pub trait SolveService: Send + Sync {
    async fn solve_text(&self, request: &SolveRequest) -> SolveResult<SolveResponse>;

    async fn solve_image(&self, image: &ImageInput) -> SolveResult<ImageSolveResponse>;

    async fn health(&self) -> SolveResult<HealthStatus>;
}

#[derive(Debug, Clone)]
pub struct HttpSolveClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpSolveClient {
    pub fn new(settings: &Settings) -> SolveResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(SolveError::Transport)?;
        Ok(Self {
            http,
            base_url: settings.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn read<T: DeserializeOwned>(&self, response: reqwest::Response) -> SolveResult<T> {
        let status = response.status();
        let body = response.bytes().await.map_err(SolveError::Transport)?;
        debug!(%status, bytes = body.len(), "solver response received");
        decode_response(status, &body)
    }
}

#[async_trait]
impl SolveService for HttpSolveClient {
    async fn solve_text(&self, request: &SolveRequest) -> SolveResult<SolveResponse> {
        let url = self.endpoint("solve-text");
        debug!(%url, level = %request.level(), locale = request.locale(), "sending text solve");
        let response = self
            .http
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(SolveError::Transport)?;
        self.read(response).await
    }

    async fn solve_image(&self, image: &ImageInput) -> SolveResult<ImageSolveResponse> {
        let url = self.endpoint("solve-image");
        debug!(%url, mime = image.mime_type(), bytes = image.len(), "sending image solve");
        let part = Part::bytes(image.bytes().to_vec())
            .file_name(image.file_name().to_string())
            .mime_str(image.mime_type())
            .map_err(SolveError::Transport)?;
        let form = Form::new().part("file", part);
        let response = self
            .http
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(SolveError::Transport)?;
        self.read(response).await
    }

    async fn health(&self) -> SolveResult<HealthStatus> {
        let response = self
            .http
            .get(self.endpoint("health"))
            .send()
            .await
            .map_err(SolveError::Transport)?;
        self.read(response).await
    }
}

/// Maps a raw status and body onto the typed result or a [`SolveError`].
pub fn decode_response<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> SolveResult<T> {
    if !status.is_success() {
        return Err(SolveError::Service {
            status: status.as_u16(),
            message: extract_message(body),
        });
    }
    serde_json::from_slice(body).map_err(SolveError::Decode)
}

fn extract_message(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    ["message", "detail"]
        .iter()
        .filter_map(|key| value.get(key).and_then(|v| v.as_str()))
        .map(str::trim)
        .find(|msg| !msg.is_empty())
        .map(str::to_string)
}
