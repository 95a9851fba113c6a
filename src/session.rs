//! Recording session: microphone capture, finalized artifact, transcription
//!
//! A `RecordingSession` owns at most one acquired input stream and one
//! capture in progress. Capture signals are consumed by a pump task per
//! capture that appends fragments to that capture's buffer and, on finalize,
//! assembles them into the current `Artifact`. The pump runs asynchronously:
//! `stop_recording` returns before the artifact exists, use `wait_finalized`
//! to observe it.
//!
//! A stopped capture keeps its buffer until it finalizes, so starting again
//! right after a stop never loses the stopped take. Only a capture that
//! `start_recording` cuts short is discarded.
//!
//! Failures never cross the session boundary as errors. Device acquisition
//! failures turn into `false`, transcription failures into `None`, and both
//! are logged.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::artifact::{Artifact, Blob, ObjectUrl, ObjectUrlRegistry};
use crate::audio::{
    signal_channel, CaptureDevice, CaptureHandle, CaptureSignal, FragmentBuffer, MediaStream,
    SignalReceiver,
};
use crate::transcription::{Transcriber, Upload};

/// Whether the session is currently capturing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureState {
    #[default]
    Idle,
    Recording,
}

/// Fragments of one capture, kept until it finalizes
#[derive(Debug, Default)]
struct CaptureBuffer {
    /// Start order of the capture, 1-based
    ordinal: u64,
    fragments: FragmentBuffer,
    finalized: bool,
}

/// State touched by both the session and its signal pumps
#[derive(Debug, Default)]
struct SharedCapture {
    /// Captures whose signals are accepted, plus the latest one once finalized
    captures: HashMap<Uuid, CaptureBuffer>,
    /// Most recently started capture
    latest: Option<Uuid>,
    started: u64,
    artifact: Option<Artifact>,
    /// Ordinal of the capture the artifact was assembled from
    artifact_ordinal: u64,
}

impl SharedCapture {
    /// Register a new capture with an empty buffer.
    ///
    /// Buffers of finalized captures are dropped; stopped captures still
    /// waiting for their finalize keep theirs.
    fn begin(&mut self, id: Uuid) {
        self.captures.retain(|_, capture| !capture.finalized);
        self.started += 1;
        self.captures.insert(
            id,
            CaptureBuffer {
                ordinal: self.started,
                ..CaptureBuffer::default()
            },
        );
        self.latest = Some(id);
    }

    /// Stop accepting signals from `id`.
    fn supersede(&mut self, id: Uuid) {
        self.captures.remove(&id);
    }

    fn latest_fragments(&self) -> Option<&FragmentBuffer> {
        let id = self.latest?;
        self.captures.get(&id).map(|capture| &capture.fragments)
    }
}

/// Capture started by `start_recording` and not yet stopped
struct ActiveCapture {
    id: Uuid,
    stream: Box<dyn MediaStream>,
    handle: Box<dyn CaptureHandle>,
    pump: JoinHandle<()>,
}

/// Marks a transcription as in flight for as long as it is alive.
struct InFlightGuard<'a>(&'a AtomicUsize);

impl<'a> InFlightGuard<'a> {
    fn acquire(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct RecordingSession {
    device: Arc<dyn CaptureDevice>,
    transcriber: Arc<dyn Transcriber>,
    urls: ObjectUrlRegistry,
    shared: Arc<Mutex<SharedCapture>>,
    in_flight: AtomicUsize,
    state: CaptureState,
    active: Option<ActiveCapture>,
    /// Pump of the most recently stopped capture, until its finalize is awaited
    finalizing: Option<JoinHandle<()>>,
}

fn lock(shared: &Mutex<SharedCapture>) -> MutexGuard<'_, SharedCapture> {
    shared.lock().unwrap_or_else(|e| e.into_inner())
}

impl RecordingSession {
    pub fn new(device: Arc<dyn CaptureDevice>, transcriber: Arc<dyn Transcriber>) -> Self {
        Self {
            device,
            transcriber,
            urls: ObjectUrlRegistry::new(),
            shared: Arc::new(Mutex::new(SharedCapture::default())),
            in_flight: AtomicUsize::new(0),
            state: CaptureState::Idle,
            active: None,
            finalizing: None,
        }
    }

    /// Issue artifact URLs from `urls` instead of a private registry.
    pub fn with_url_registry(mut self, urls: ObjectUrlRegistry) -> Self {
        self.urls = urls;
        self
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == CaptureState::Recording
    }

    /// True while at least one transcription request is outstanding.
    pub fn is_processing(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    pub fn artifact(&self) -> Option<Artifact> {
        lock(&self.shared).artifact.clone()
    }

    pub fn audio_blob(&self) -> Option<Blob> {
        lock(&self.shared).artifact.as_ref().map(|a| a.blob.clone())
    }

    pub fn audio_url(&self) -> Option<ObjectUrl> {
        lock(&self.shared).artifact.as_ref().map(|a| a.url.clone())
    }

    /// Number of fragments buffered for the most recent capture
    pub fn fragment_count(&self) -> usize {
        lock(&self.shared)
            .latest_fragments()
            .map_or(0, FragmentBuffer::len)
    }

    pub fn url_registry(&self) -> &ObjectUrlRegistry {
        &self.urls
    }

    /// Acquire the microphone and begin capturing.
    ///
    /// Returns false if the device could not be acquired; the session is left
    /// exactly as it was.
    pub async fn start_recording(&mut self) -> bool {
        if let Some(id) = self.active.as_ref().map(|active| active.id) {
            log::warn!("start_recording while already recording, stopping current capture first");
            self.stop_recording();
            lock(&self.shared).supersede(id);
        }

        let mut stream = match self.device.acquire().await {
            Ok(stream) => stream,
            Err(e) => {
                log::error!("Error accessing microphone: {}", e);
                return false;
            }
        };

        let id = Uuid::new_v4();
        let (sink, signals) = signal_channel();
        let handle = match stream.record(sink) {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("Failed to start capture: {}", e);
                stream.stop_tracks();
                return false;
            }
        };

        lock(&self.shared).begin(id);

        let pump = tokio::spawn(pump_signals(
            id,
            signals,
            self.shared.clone(),
            self.urls.clone(),
        ));

        self.active = Some(ActiveCapture {
            id,
            stream,
            handle,
            pump,
        });
        self.state = CaptureState::Recording;
        log::info!("Recording {} started", id);
        true
    }

    /// Request finalize and release the device. No-op when idle.
    ///
    /// The artifact is produced later by the signal pump.
    pub fn stop_recording(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };

        active.handle.stop();
        active.stream.stop_tracks();
        self.state = CaptureState::Idle;

        // A pump from an earlier, never-awaited stop keeps running detached
        self.finalizing = Some(active.pump);
        log::info!("Recording {} stopped, awaiting finalize", active.id);
    }

    /// Stop when recording, start otherwise.
    ///
    /// Returns `Some(started)` when it started a recording, `None` when it stopped one.
    pub async fn toggle_recording(&mut self) -> Option<bool> {
        if self.is_recording() {
            self.stop_recording();
            None
        } else {
            Some(self.start_recording().await)
        }
    }

    /// Clear the artifact and the fragment buffers. Capture state is untouched.
    pub fn reset_recording(&self) {
        let mut shared = lock(&self.shared);
        if let Some(old) = shared.artifact.take() {
            self.urls.revoke(&old.url);
        }
        for capture in shared.captures.values_mut() {
            capture.fragments.clear();
        }
    }

    /// Wait for the most recently stopped capture to finalize, then return
    /// the current artifact.
    ///
    /// Returns immediately if nothing is pending.
    pub async fn wait_finalized(&mut self) -> Option<Artifact> {
        if let Some(pump) = self.finalizing.take() {
            if let Err(e) = pump.await {
                log::error!("Capture finalize task failed: {}", e);
            }
        }
        self.artifact()
    }

    /// `stop_recording` followed by `wait_finalized`.
    pub async fn stop_and_wait(&mut self) -> Option<Artifact> {
        self.stop_recording();
        self.wait_finalized().await
    }

    /// Transcribe the current artifact. `None` if there is no artifact or the
    /// request failed.
    pub async fn transcribe_audio(&self) -> Option<String> {
        let blob = self.audio_blob()?;
        self.transcribe_blob(&blob).await
    }

    /// Transcribe an explicit blob. `None` if the request failed.
    pub async fn transcribe_blob(&self, blob: &Blob) -> Option<String> {
        let _in_flight = InFlightGuard::acquire(&self.in_flight);

        match self.transcriber.transcribe(Upload::recording(blob)).await {
            Ok(response) => Some(response.text),
            Err(e) => {
                log::error!("Transcription failed: {}", e);
                None
            }
        }
    }

    /// Release the device if still held and revoke the artifact URL.
    pub fn shutdown(&mut self) {
        if let Some(mut active) = self.active.take() {
            log::info!("Tearing down recording {}", active.id);
            active.handle.stop();
            active.stream.stop_tracks();
            active.pump.abort();
            self.state = CaptureState::Idle;
        }
        if let Some(pump) = self.finalizing.take() {
            pump.abort();
        }

        let mut shared = lock(&self.shared);
        shared.captures.clear();
        shared.latest = None;
        if let Some(old) = shared.artifact.take() {
            self.urls.revoke(&old.url);
        }
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Consume capture signals until the capture finalizes or its sink closes.
async fn pump_signals(
    id: Uuid,
    mut signals: SignalReceiver,
    shared: Arc<Mutex<SharedCapture>>,
    urls: ObjectUrlRegistry,
) {
    while let Some(signal) = signals.recv().await {
        if apply_signal(id, signal, &shared, &urls) {
            return;
        }
    }
    log::warn!("Capture {} ended without a finalize signal", id);
}

/// Apply one signal. Returns true once the capture is finalized.
fn apply_signal(
    id: Uuid,
    signal: CaptureSignal,
    shared: &Mutex<SharedCapture>,
    urls: &ObjectUrlRegistry,
) -> bool {
    let mut guard = lock(shared);
    let shared = &mut *guard;

    let Some(capture) = shared
        .captures
        .get_mut(&id)
        .filter(|capture| !capture.finalized)
    else {
        log::debug!("Ignoring signal from superseded capture {}", id);
        return matches!(signal, CaptureSignal::Finalized);
    };

    match signal {
        CaptureSignal::Fragment(bytes) => {
            let sequence = capture.fragments.push(bytes);
            log::trace!("Capture {} fragment #{}", id, sequence);
            false
        }
        CaptureSignal::Finalized => {
            capture.finalized = true;
            let ordinal = capture.ordinal;
            let fragment_count = capture.fragments.len();
            let blob = Blob::wav(capture.fragments.assemble());

            if shared.latest != Some(id) {
                shared.captures.remove(&id);
            }

            if ordinal < shared.artifact_ordinal {
                log::debug!(
                    "Recording {} finalized after a newer one, keeping the newer artifact",
                    id
                );
                return true;
            }

            let url = urls.create_url(&blob);
            log::info!(
                "Recording {} finalized: {} fragments, {} bytes",
                id,
                fragment_count,
                blob.len()
            );
            shared.artifact_ordinal = ordinal;
            if let Some(old) = shared.artifact.replace(Artifact { blob, url }) {
                urls.revoke(&old.url);
            }
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared_with(ids: &[Uuid]) -> Mutex<SharedCapture> {
        let mut shared = SharedCapture::default();
        for &id in ids {
            shared.begin(id);
        }
        Mutex::new(shared)
    }

    fn artifact_bytes(shared: &Mutex<SharedCapture>) -> Option<Vec<u8>> {
        lock(shared)
            .artifact
            .as_ref()
            .map(|a| a.blob.bytes().to_vec())
    }

    #[test]
    fn test_finalize_assembles_fragments() {
        let id = Uuid::new_v4();
        let shared = shared_with(&[id]);
        let urls = ObjectUrlRegistry::new();

        assert!(!apply_signal(id, CaptureSignal::Fragment(b"AB".to_vec()), &shared, &urls));
        assert!(!apply_signal(id, CaptureSignal::Fragment(b"CD".to_vec()), &shared, &urls));
        assert!(apply_signal(id, CaptureSignal::Finalized, &shared, &urls));

        let artifact = lock(&shared).artifact.clone().unwrap();
        assert_eq!(artifact.blob.bytes(), b"ABCD");
        assert_eq!(artifact.blob.media_type(), "audio/wav");
        assert_eq!(urls.resolve(&artifact.url), Some(artifact.blob));

        // The latest buffer stays visible after finalize
        assert_eq!(lock(&shared).latest_fragments().map(FragmentBuffer::len), Some(2));
    }

    #[test]
    fn test_superseded_capture_is_ignored() {
        let old = Uuid::new_v4();
        let current = Uuid::new_v4();
        let shared = shared_with(&[old, current]);
        lock(&shared).supersede(old);
        let urls = ObjectUrlRegistry::new();

        assert!(!apply_signal(old, CaptureSignal::Fragment(b"stale".to_vec()), &shared, &urls));
        assert!(apply_signal(old, CaptureSignal::Finalized, &shared, &urls));

        let shared = lock(&shared);
        assert_eq!(shared.latest_fragments().map(FragmentBuffer::len), Some(0));
        assert!(shared.artifact.is_none());
        assert!(urls.is_empty());
    }

    #[test]
    fn test_stopped_capture_finalizes_after_newer_start() {
        let stopped = Uuid::new_v4();
        let newer = Uuid::new_v4();
        let shared = shared_with(&[stopped]);
        let urls = ObjectUrlRegistry::new();

        apply_signal(stopped, CaptureSignal::Fragment(b"two".to_vec()), &shared, &urls);
        lock(&shared).begin(newer);
        apply_signal(newer, CaptureSignal::Fragment(b"three".to_vec()), &shared, &urls);

        assert!(apply_signal(stopped, CaptureSignal::Finalized, &shared, &urls));
        assert_eq!(artifact_bytes(&shared), Some(b"two".to_vec()));

        // The stopped capture's buffer is gone, the newer one is untouched
        let guard = lock(&shared);
        assert!(!guard.captures.contains_key(&stopped));
        assert_eq!(guard.latest_fragments().map(FragmentBuffer::len), Some(1));
    }

    #[test]
    fn test_late_finalize_does_not_replace_newer_artifact() {
        let older = Uuid::new_v4();
        let newer = Uuid::new_v4();
        let shared = shared_with(&[older, newer]);
        let urls = ObjectUrlRegistry::new();

        apply_signal(older, CaptureSignal::Fragment(b"old".to_vec()), &shared, &urls);
        apply_signal(newer, CaptureSignal::Fragment(b"new".to_vec()), &shared, &urls);
        apply_signal(newer, CaptureSignal::Finalized, &shared, &urls);
        assert!(apply_signal(older, CaptureSignal::Finalized, &shared, &urls));

        assert_eq!(artifact_bytes(&shared), Some(b"new".to_vec()));
        assert_eq!(urls.len(), 1);
    }

    #[test]
    fn test_signals_after_finalize_are_ignored() {
        let id = Uuid::new_v4();
        let shared = shared_with(&[id]);
        let urls = ObjectUrlRegistry::new();

        apply_signal(id, CaptureSignal::Fragment(b"A".to_vec()), &shared, &urls);
        apply_signal(id, CaptureSignal::Finalized, &shared, &urls);
        assert!(!apply_signal(id, CaptureSignal::Fragment(b"B".to_vec()), &shared, &urls));
        assert!(apply_signal(id, CaptureSignal::Finalized, &shared, &urls));

        assert_eq!(artifact_bytes(&shared), Some(b"A".to_vec()));
        assert_eq!(urls.len(), 1);
    }

    #[test]
    fn test_new_artifact_revokes_previous_url() {
        let first_id = Uuid::new_v4();
        let second_id = Uuid::new_v4();
        let shared = shared_with(&[first_id]);
        let urls = ObjectUrlRegistry::new();

        apply_signal(first_id, CaptureSignal::Finalized, &shared, &urls);
        let first = lock(&shared).artifact.clone().unwrap();

        lock(&shared).begin(second_id);
        apply_signal(second_id, CaptureSignal::Fragment(b"x".to_vec()), &shared, &urls);
        apply_signal(second_id, CaptureSignal::Finalized, &shared, &urls);
        let second = lock(&shared).artifact.clone().unwrap();

        assert_ne!(first.url, second.url);
        assert_eq!(urls.resolve(&first.url), None);
        assert!(urls.resolve(&second.url).is_some());
        assert_eq!(urls.len(), 1);
    }

    #[test]
    fn test_begin_drops_finalized_buffers_only() {
        let finalized = Uuid::new_v4();
        let pending = Uuid::new_v4();
        let shared = shared_with(&[pending, finalized]);
        let urls = ObjectUrlRegistry::new();
        apply_signal(finalized, CaptureSignal::Finalized, &shared, &urls);
        assert!(lock(&shared).captures.contains_key(&finalized));

        let mut guard = lock(&shared);
        guard.begin(Uuid::new_v4());
        assert!(!guard.captures.contains_key(&finalized));
        assert!(guard.captures.contains_key(&pending));
        assert_eq!(guard.captures.len(), 2);
    }

    #[test]
    fn test_in_flight_guard_counts_overlapping_requests() {
        let counter = AtomicUsize::new(0);
        let first = InFlightGuard::acquire(&counter);
        let second = InFlightGuard::acquire(&counter);
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        drop(first);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        drop(second);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_capture_state_defaults_to_idle() {
        assert_eq!(CaptureState::default(), CaptureState::Idle);
    }
}
