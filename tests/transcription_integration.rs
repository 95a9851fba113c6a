//! Integration tests for the HTTP transcription client
//!
//! Each test serves one canned HTTP response from a loopback listener, so no
//! recipe API needs to be running.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use recipe_dictation::audio::CpalCaptureDevice;
use recipe_dictation::transcription::{
    HttpTranscriptionClient, Transcriber, TranscriptionError, Upload,
};
use recipe_dictation::{Blob, RecordingSession};

/// What the loopback server does with the single request it accepts
enum Respond {
    With { status: &'static str, body: &'static str },
    Never,
}

/// Read one HTTP request (headers plus body) from the stream.
async fn read_request(stream: &mut TcpStream) -> Vec<u8> {
    let mut request = Vec::new();
    let mut buf = [0u8; 4096];

    let header_end = loop {
        let n = stream.read(&mut buf).await.unwrap();
        assert!(n > 0, "client closed before sending headers");
        request.extend_from_slice(&buf[..n]);
        if let Some(pos) = find(&request, b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let headers = String::from_utf8_lossy(&request[..header_end]).to_lowercase();
    let content_length = headers
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .map(|v| v.trim().parse::<usize>().unwrap());

    match content_length {
        Some(len) => {
            while request.len() < header_end + len {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
        }
        None => {
            // Chunked body: read until the terminating chunk
            while find(&request[header_end..], b"0\r\n\r\n").is_none() {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
        }
    }

    request
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Serve a single request. Returns the API base URL and a handle yielding the raw request.
async fn serve_once(respond: Respond) -> (String, JoinHandle<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let request = read_request(&mut stream).await;

        match respond {
            Respond::With { status, body } => {
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                stream.write_all(response.as_bytes()).await.unwrap();
                stream.shutdown().await.ok();
            }
            Respond::Never => {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
        }

        request
    });

    (format!("http://{}/api", addr), server)
}

fn recording_upload(bytes: &[u8]) -> Upload {
    Upload::recording(&Blob::wav(bytes.to_vec()))
}

fn client(api_url: &str) -> HttpTranscriptionClient {
    HttpTranscriptionClient::new(api_url, Duration::from_secs(10)).unwrap()
}

#[tokio::test]
async fn success_returns_text_and_sends_multipart_recording() {
    let (api_url, server) = serve_once(Respond::With {
        status: "200 OK",
        body: r#"{"text":"hello"}"#,
    })
    .await;

    let response = client(&api_url)
        .transcribe(recording_upload(b"RIFF-fake-wav"))
        .await
        .unwrap();
    assert_eq!(response.text, "hello");

    let request = String::from_utf8_lossy(&server.await.unwrap()).to_string();
    assert!(request.starts_with("POST /api/transcribe HTTP/1.1"));
    assert!(request.contains("RIFF-fake-wav"));

    let lower = request.to_lowercase();
    assert!(lower.contains("content-type: multipart/form-data"));
    assert!(lower.contains(r#"name="file""#));
    assert!(lower.contains(r#"filename="recording.wav""#));
    assert!(lower.contains("content-type: audio/wav"));
}

#[tokio::test]
async fn server_error_surfaces_detail_message() {
    let (api_url, _server) = serve_once(Respond::With {
        status: "500 Internal Server Error",
        body: r#"{"detail":"model failed to load"}"#,
    })
    .await;

    let err = client(&api_url)
        .transcribe(recording_upload(b"data"))
        .await
        .unwrap_err();

    match err {
        TranscriptionError::ApiError { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "model failed to load");
        }
        other => panic!("Expected ApiError, got: {:?}", other),
    }
}

#[tokio::test]
async fn malformed_success_body_is_parse_error() {
    let (api_url, _server) = serve_once(Respond::With {
        status: "200 OK",
        body: r#"{"transcript":"wrong field"}"#,
    })
    .await;

    let err = client(&api_url)
        .transcribe(recording_upload(b"data"))
        .await
        .unwrap_err();

    assert!(
        matches!(err, TranscriptionError::ParseError(_)),
        "Expected ParseError, got: {:?}",
        err
    );
}

#[tokio::test]
async fn slow_server_hits_timeout_budget() {
    let (api_url, _server) = serve_once(Respond::Never).await;
    let client = HttpTranscriptionClient::new(&api_url, Duration::from_millis(300)).unwrap();

    let err = client
        .transcribe(recording_upload(b"data"))
        .await
        .unwrap_err();

    assert!(
        matches!(err, TranscriptionError::Timeout(budget) if budget == Duration::from_millis(300)),
        "Expected Timeout, got: {:?}",
        err
    );
}

#[tokio::test]
async fn unreachable_server_is_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(&format!("http://{}/api", addr))
        .transcribe(recording_upload(b"data"))
        .await
        .unwrap_err();

    assert!(
        matches!(err, TranscriptionError::NetworkError(_)),
        "Expected NetworkError, got: {:?}",
        err
    );
}

// ============================================================================
// Session over HTTP
// ============================================================================

fn http_session(api_url: &str) -> RecordingSession {
    RecordingSession::new(
        Arc::new(CpalCaptureDevice::default()),
        Arc::new(client(api_url)),
    )
}

#[tokio::test]
async fn session_transcribes_blob_over_http() {
    let (api_url, _server) = serve_once(Respond::With {
        status: "200 OK",
        body: r#"{"text":" Two cups of flour."}"#,
    })
    .await;
    let session = http_session(&api_url);

    let text = session.transcribe_blob(&Blob::wav(b"RIFF".to_vec())).await;
    assert_eq!(text.as_deref(), Some(" Two cups of flour."));
    assert!(!session.is_processing());
}

#[tokio::test]
async fn session_swallows_http_failure() {
    let (api_url, _server) = serve_once(Respond::With {
        status: "422 Unprocessable Entity",
        body: r#"{"detail":[{"msg":"field required"}]}"#,
    })
    .await;
    let session = http_session(&api_url);

    let text = session.transcribe_blob(&Blob::wav(b"RIFF".to_vec())).await;
    assert_eq!(text, None);
    assert!(!session.is_processing());
}
