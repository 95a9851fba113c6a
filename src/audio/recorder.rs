//! Audio capture backend using CPAL
//!
//! Each acquisition opens the default input device on a dedicated audio
//! thread. The cpal `Stream` never leaves that thread; the session talks to it
//! through a command channel. Samples are accumulated while recording and
//! encoded as WAV (hound) when the capture is finalized, then delivered as
//! fragments followed by the finalize signal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, Stream, StreamConfig};
use tokio::sync::oneshot;

use super::capture::{
    AudioError, CaptureDevice, CaptureHandle, CaptureSignal, MediaStream, SignalSink,
};
use super::wav::{encode_wav, sample_to_i16};

/// Default upper bound on the size of a delivered fragment
pub const DEFAULT_FRAGMENT_BYTES: usize = 64 * 1024;

/// Negotiated input format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Commands sent to the audio thread
enum CaptureCommand {
    /// Start accumulating samples and deliver signals to the sink
    Record(SignalSink),
    /// Stop accumulating, encode, deliver fragments then `Finalized`
    Finalize,
    /// Drop the cpal stream and exit the thread
    Release,
}

/// Capture device backed by the default cpal host.
pub struct CpalCaptureDevice {
    fragment_bytes: usize,
}

impl CpalCaptureDevice {
    pub fn new(fragment_bytes: usize) -> Self {
        Self {
            fragment_bytes: fragment_bytes.max(1),
        }
    }
}

impl Default for CpalCaptureDevice {
    fn default() -> Self {
        Self::new(DEFAULT_FRAGMENT_BYTES)
    }
}

#[async_trait]
impl CaptureDevice for CpalCaptureDevice {
    async fn acquire(&self) -> Result<Box<dyn MediaStream>, AudioError> {
        let (commands, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let fragment_bytes = self.fragment_bytes;

        thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || capture_thread_main(command_rx, ready_tx, fragment_bytes))
            .map_err(|e| AudioError::StreamCreationFailed(e.to_string()))?;

        let format = ready_rx
            .await
            .map_err(|_| AudioError::ThreadDisconnected)??;
        log::info!(
            "Microphone acquired ({} Hz, {} channels)",
            format.sample_rate,
            format.channels
        );

        Ok(Box::new(CpalStream {
            commands,
            live: true,
        }))
    }
}

/// Acquired cpal input stream. Dropping it releases the device.
pub struct CpalStream {
    commands: Sender<CaptureCommand>,
    live: bool,
}

impl MediaStream for CpalStream {
    fn record(&mut self, sink: SignalSink) -> Result<Box<dyn CaptureHandle>, AudioError> {
        if !self.live {
            return Err(AudioError::StreamCreationFailed(
                "input tracks already stopped".to_string(),
            ));
        }

        self.commands
            .send(CaptureCommand::Record(sink))
            .map_err(|_| AudioError::ThreadDisconnected)?;

        Ok(Box::new(CpalCaptureHandle {
            commands: self.commands.clone(),
            stopped: false,
        }))
    }

    fn stop_tracks(&mut self) {
        if !self.live {
            return;
        }
        self.live = false;
        if self.commands.send(CaptureCommand::Release).is_err() {
            log::debug!("Audio thread already exited before release");
        }
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}

/// Handle to a recording in progress on a `CpalStream`.
pub struct CpalCaptureHandle {
    commands: Sender<CaptureCommand>,
    stopped: bool,
}

impl CaptureHandle for CpalCaptureHandle {
    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        if self.commands.send(CaptureCommand::Finalize).is_err() {
            log::warn!("Audio thread gone, capture cannot be finalized");
        }
    }
}

/// Open input stream plus the state shared with its data callback
struct OpenInput {
    _stream: Stream,
    format: CaptureFormat,
    samples: Arc<Mutex<Vec<i16>>>,
    capturing: Arc<AtomicBool>,
}

/// Main loop for the audio thread
fn capture_thread_main(
    commands: Receiver<CaptureCommand>,
    ready: oneshot::Sender<Result<CaptureFormat, AudioError>>,
    fragment_bytes: usize,
) {
    let input = match open_default_input() {
        Ok(input) => input,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    if ready.send(Ok(input.format)).is_err() {
        log::debug!("Acquirer went away before the device was ready");
        return;
    }

    let mut sink: Option<SignalSink> = None;

    while let Ok(command) = commands.recv() {
        match command {
            CaptureCommand::Record(new_sink) => {
                if let Ok(mut samples) = input.samples.lock() {
                    samples.clear();
                }
                sink = Some(new_sink);
                input.capturing.store(true, Ordering::SeqCst);
                log::debug!("Capture started");
            }
            CaptureCommand::Finalize => {
                input.capturing.store(false, Ordering::SeqCst);
                let samples = match input.samples.lock() {
                    Ok(mut guard) => std::mem::take(&mut *guard),
                    Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
                };
                if let Some(sink) = sink.take() {
                    deliver_recording(&sink, &samples, input.format, fragment_bytes);
                }
            }
            CaptureCommand::Release => break,
        }
    }

    // Dropping `input` drops the cpal stream, freeing the device
    drop(input);
    log::info!("Audio input device released");
}

/// Encode the captured samples and emit them as fragments, then `Finalized`.
///
/// On encode failure nothing is sent; the caller drops the sink so the
/// subscriber sees the capture end without a recording.
fn deliver_recording(sink: &SignalSink, samples: &[i16], format: CaptureFormat, fragment_bytes: usize) {
    let bytes = match encode_wav(samples, format.channels, format.sample_rate) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::error!("Failed to encode recording: {}", e);
            return;
        }
    };

    log::debug!(
        "Capture finalized: {} samples, {} bytes",
        samples.len(),
        bytes.len()
    );
    for chunk in bytes.chunks(fragment_bytes) {
        if sink.send(CaptureSignal::Fragment(chunk.to_vec())).is_err() {
            log::debug!("Capture subscriber dropped, discarding fragments");
            return;
        }
    }

    let _ = sink.send(CaptureSignal::Finalized);
}

fn open_default_input() -> Result<OpenInput, AudioError> {
    let host = cpal::default_host();

    let device = host
        .default_input_device()
        .ok_or(AudioError::NoInputDevice)?;

    log::info!("Using audio input device: {:?}", device.name());

    let supported_config = device.default_input_config().map_err(|e| match e {
        cpal::DefaultStreamConfigError::DeviceNotAvailable => {
            AudioError::DeviceUnavailable(e.to_string())
        }
        _ => AudioError::NoSupportedConfig,
    })?;

    log::info!(
        "Audio config: {} Hz, {} channels, {:?}",
        supported_config.sample_rate().0,
        supported_config.channels(),
        supported_config.sample_format()
    );

    let sample_format = supported_config.sample_format();
    let config: StreamConfig = supported_config.into();
    let format = CaptureFormat {
        sample_rate: config.sample_rate.0,
        channels: config.channels,
    };

    let samples = Arc::new(Mutex::new(Vec::new()));
    let capturing = Arc::new(AtomicBool::new(false));

    let stream = match sample_format {
        SampleFormat::I16 => build_stream::<i16>(&device, &config, &samples, &capturing),
        SampleFormat::U16 => build_stream::<u16>(&device, &config, &samples, &capturing),
        SampleFormat::F32 => build_stream::<f32>(&device, &config, &samples, &capturing),
        _ => Err(AudioError::NoSupportedConfig),
    }?;

    stream.play().map_err(|e| match e {
        cpal::PlayStreamError::DeviceNotAvailable => AudioError::DeviceUnavailable(e.to_string()),
        _ => AudioError::StreamCreationFailed(format!("Failed to start stream: {}", e)),
    })?;

    Ok(OpenInput {
        _stream: stream,
        format,
        samples,
        capturing,
    })
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    samples: &Arc<Mutex<Vec<i16>>>,
    capturing: &Arc<AtomicBool>,
) -> Result<Stream, AudioError>
where
    T: cpal::SizedSample + Send + 'static,
    f32: FromSample<T>,
{
    let samples = samples.clone();
    let capturing = capturing.clone();
    let err_fn = |err: cpal::StreamError| log::error!("Audio stream error: {}", err);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if !capturing.load(Ordering::SeqCst) {
                    return;
                }
                if let Ok(mut buffer) = samples.lock() {
                    buffer.extend(data.iter().map(|&s| sample_to_i16(s)));
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| match e {
            cpal::BuildStreamError::DeviceNotAvailable => {
                AudioError::DeviceUnavailable(e.to_string())
            }
            _ => AudioError::StreamCreationFailed(e.to_string()),
        })
}
