//! Transcription client seam
//!
//! The session only depends on `Transcriber`; the HTTP implementation lives
//! in `http.rs` and tests substitute scripted clients.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::artifact::{Blob, WAV_MEDIA_TYPE};

/// Multipart field the server reads the recording from
pub const UPLOAD_FIELD_NAME: &str = "file";

/// File name attached to every uploaded recording
pub const UPLOAD_FILE_NAME: &str = "recording.wav";

/// Errors that can occur during transcription
#[derive(Debug)]
pub enum TranscriptionError {
    /// HTTP client could not be constructed
    ClientBuild(String),
    /// Upload could not be turned into a request
    InvalidUpload(String),
    /// Network/HTTP error
    NetworkError(String),
    /// Request exceeded the client-side timeout budget
    Timeout(Duration),
    /// Server returned a non-success status
    ApiError { status: u16, message: String },
    /// Failed to parse the server response
    ParseError(String),
}

impl std::fmt::Display for TranscriptionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranscriptionError::ClientBuild(e) => write!(f, "Failed to build HTTP client: {}", e),
            TranscriptionError::InvalidUpload(e) => write!(f, "Invalid upload: {}", e),
            TranscriptionError::NetworkError(e) => write!(f, "Network error: {}", e),
            TranscriptionError::Timeout(budget) => {
                write!(f, "Transcription timed out after {}s", budget.as_secs())
            }
            TranscriptionError::ApiError { status, message } => {
                write!(f, "Transcription API error ({}): {}", status, message)
            }
            TranscriptionError::ParseError(e) => write!(f, "Failed to parse API response: {}", e),
        }
    }
}

impl std::error::Error for TranscriptionError {}

/// A named binary upload.
#[derive(Debug, Clone)]
pub struct Upload {
    pub field_name: String,
    pub file_name: String,
    pub media_type: String,
    pub bytes: Arc<[u8]>,
}

impl Upload {
    /// Package a recorded blob as `recording.wav` (`audio/wav`).
    pub fn recording(blob: &Blob) -> Self {
        Self {
            field_name: UPLOAD_FIELD_NAME.to_string(),
            file_name: UPLOAD_FILE_NAME.to_string(),
            media_type: WAV_MEDIA_TYPE.to_string(),
            bytes: Arc::from(blob.bytes()),
        }
    }
}

/// Successful `/transcribe` response body
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TranscriptionResponse {
    pub text: String,
}

/// Converts an uploaded recording into text.
#[async_trait]
pub trait Transcriber: Send + Sync + 'static {
    async fn transcribe(&self, upload: Upload) -> Result<TranscriptionResponse, TranscriptionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_upload_is_named_wav() {
        let blob = Blob::new(b"ABCD".to_vec(), "audio/webm");
        let upload = Upload::recording(&blob);
        assert_eq!(upload.field_name, "file");
        assert_eq!(upload.file_name, "recording.wav");
        // The upload is always tagged as WAV regardless of the blob's tag
        assert_eq!(upload.media_type, "audio/wav");
        assert_eq!(&upload.bytes[..], b"ABCD");
    }

    #[test]
    fn test_error_display() {
        let err = TranscriptionError::ApiError {
            status: 500,
            message: "model not loaded".to_string(),
        };
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("model not loaded"));

        let err = TranscriptionError::Timeout(Duration::from_secs(300));
        assert!(err.to_string().contains("300s"));
    }

    #[test]
    fn test_response_ignores_extra_fields() {
        let response: TranscriptionResponse =
            serde_json::from_str(r#"{"text":"two cups flour","language":"en"}"#).unwrap();
        assert_eq!(response.text, "two cups flour");
    }
}
