pub mod artifact;
pub mod audio;
pub mod session;
pub mod settings;
pub mod transcription;

pub use artifact::{Artifact, Blob, ObjectUrl, ObjectUrlRegistry, WAV_MEDIA_TYPE};
pub use session::{CaptureState, RecordingSession};
pub use settings::ClientSettings;
