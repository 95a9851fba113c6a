//! HTTP client for the recipe API's `/transcribe` endpoint
//!
//! Uploads the recording as multipart form data and reads `{"text": ...}`
//! back. Error responses carry FastAPI-style `{"detail": ...}` bodies.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;

use super::client::{Transcriber, TranscriptionError, TranscriptionResponse, Upload};
use crate::settings::ClientSettings;

/// Error response body
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    detail: serde_json::Value,
}

/// Transcription client speaking to `{api_url}/transcribe`.
#[derive(Debug, Clone)]
pub struct HttpTranscriptionClient {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpTranscriptionClient {
    pub fn new(api_url: &str, timeout: Duration) -> Result<Self, TranscriptionError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TranscriptionError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/transcribe", api_url.trim_end_matches('/')),
            timeout,
        })
    }

    pub fn from_settings(settings: &ClientSettings) -> Result<Self, TranscriptionError> {
        Self::new(
            &settings.api_url,
            Duration::from_secs(settings.transcribe_timeout_secs),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn classify(&self, err: reqwest::Error) -> TranscriptionError {
        if err.is_timeout() {
            TranscriptionError::Timeout(self.timeout)
        } else {
            TranscriptionError::NetworkError(err.to_string())
        }
    }
}

/// Pull a readable message out of an error body.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorResponse>(body) {
        Ok(ApiErrorResponse {
            detail: serde_json::Value::String(message),
        }) => message,
        Ok(ApiErrorResponse { detail }) => detail.to_string(),
        Err(_) => body.to_string(),
    }
}

#[async_trait]
impl Transcriber for HttpTranscriptionClient {
    async fn transcribe(&self, upload: Upload) -> Result<TranscriptionResponse, TranscriptionError> {
        log::info!(
            "Uploading {} ({} bytes) to {}",
            upload.file_name,
            upload.bytes.len(),
            self.endpoint
        );

        let file_part = Part::bytes(upload.bytes.to_vec())
            .file_name(upload.file_name)
            .mime_str(&upload.media_type)
            .map_err(|e| TranscriptionError::InvalidUpload(e.to_string()))?;

        let form = Form::new().part(upload.field_name, file_part);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();

        if status.is_success() {
            let body = response.text().await.map_err(|e| self.classify(e))?;
            let parsed: TranscriptionResponse = serde_json::from_str(&body)
                .map_err(|e| TranscriptionError::ParseError(e.to_string()))?;

            log::info!("Transcription successful: {} chars", parsed.text.len());
            Ok(parsed)
        } else {
            let error_text = response.text().await.unwrap_or_default();
            let message = error_message(&error_text);

            log::error!("Transcription API error ({}): {}", status.as_u16(), message);

            Err(TranscriptionError::ApiError {
                status: status.as_u16(),
                message,
            })
        }
    }
}
