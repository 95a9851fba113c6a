//! Capture seams between the recording session and an audio backend
//!
//! A backend hands out a `MediaStream` once the input device has been
//! acquired. Recording on that stream yields a `CaptureHandle`; the actual
//! audio arrives asynchronously as `CaptureSignal`s on the sink passed to
//! `record()`: zero or more fragments, then exactly one `Finalized` after a
//! stop request.

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Errors that can occur while acquiring or driving the input device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    NoInputDevice,
    NoSupportedConfig,
    /// Device exists but cannot be opened (permission denied, busy, unplugged)
    DeviceUnavailable(String),
    StreamCreationFailed(String),
    EncodeFailed(String),
    ThreadDisconnected,
}

impl std::fmt::Display for AudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioError::NoInputDevice => write!(f, "No audio input device found"),
            AudioError::NoSupportedConfig => write!(f, "No supported audio configuration"),
            AudioError::DeviceUnavailable(e) => write!(f, "Audio input device unavailable: {}", e),
            AudioError::StreamCreationFailed(e) => {
                write!(f, "Failed to create audio stream: {}", e)
            }
            AudioError::EncodeFailed(e) => write!(f, "Failed to encode audio: {}", e),
            AudioError::ThreadDisconnected => write!(f, "Audio capture thread disconnected"),
        }
    }
}

impl std::error::Error for AudioError {}

/// Signal emitted by an active capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureSignal {
    /// One chunk of encoded audio, in capture order
    Fragment(Vec<u8>),
    /// All fragments for this capture have been delivered
    Finalized,
}

/// Sending half of a capture subscription.
pub type SignalSink = mpsc::UnboundedSender<CaptureSignal>;

/// Receiving half of a capture subscription.
pub type SignalReceiver = mpsc::UnboundedReceiver<CaptureSignal>;

/// Create a new capture subscription.
pub fn signal_channel() -> (SignalSink, SignalReceiver) {
    mpsc::unbounded_channel()
}

/// Source of audio input streams.
#[async_trait]
pub trait CaptureDevice: Send + Sync + 'static {
    /// Request exclusive access to the default audio input.
    /// Suspends until the platform grants or denies access.
    async fn acquire(&self) -> Result<Box<dyn MediaStream>, AudioError>;
}

/// An acquired input stream holding one or more physical tracks.
pub trait MediaStream: Send + Sync {
    /// Begin continuous capture, delivering signals to `sink`.
    fn record(&mut self, sink: SignalSink) -> Result<Box<dyn CaptureHandle>, AudioError>;

    /// Release every physical track. Hardware is freed immediately.
    /// Calling this more than once has no further effect.
    fn stop_tracks(&mut self);
}

/// An in-progress capture on a `MediaStream`.
pub trait CaptureHandle: Send + Sync {
    /// Request finalization. Remaining fragments and the `Finalized` signal
    /// follow asynchronously; this call does not wait for them.
    fn stop(&mut self);
}
