//! Transcription module for recipe dictation
//!
//! This module handles speech-to-text via the recipe API's `/transcribe` endpoint.

mod client;
mod http;

pub use client::{Transcriber, TranscriptionError, TranscriptionResponse, Upload};
pub use http::HttpTranscriptionClient;
