//! Audio capture module for recipe dictation
//!
//! This module handles microphone input capture and in-memory WAV encoding.
//! Uses CPAL for audio capture and hound for WAV encoding.

pub mod capture;
mod fragments;
pub mod recorder;
mod wav;

pub use capture::{
    signal_channel, AudioError, CaptureDevice, CaptureHandle, CaptureSignal, MediaStream,
    SignalReceiver, SignalSink,
};
pub use fragments::FragmentBuffer;
pub use recorder::{CaptureFormat, CpalCaptureDevice, DEFAULT_FRAGMENT_BYTES};
pub use wav::{encode_wav, sample_to_i16};
