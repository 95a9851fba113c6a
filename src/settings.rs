use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::audio::DEFAULT_FRAGMENT_BYTES;

const SETTINGS_DIR_NAME: &str = "recipe-dictation";
const SETTINGS_FILE_NAME: &str = "settings.json";

/// Environment variable overriding `api_url`
pub const API_URL_ENV: &str = "RECIPE_API_URL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Base URL of the recipe API. The transcription endpoint is `{api_url}/transcribe`.
    pub api_url: String,

    /// Client-side budget for a single transcription request. Long recordings are
    /// transcribed synchronously by the server, so this is generous.
    pub transcribe_timeout_secs: u64,

    /// Upper bound on the size of each captured fragment delivered by the recorder.
    pub fragment_bytes: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000/api".to_string(),
            transcribe_timeout_secs: 300,
            fragment_bytes: DEFAULT_FRAGMENT_BYTES,
        }
    }
}

impl ClientSettings {
    /// Apply environment overrides on top of file/default values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.is_empty() {
                self.api_url = url;
            }
        }
        self
    }
}

/// Default settings location: `<config_dir>/recipe-dictation/settings.json`
pub fn settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(SETTINGS_DIR_NAME).join(SETTINGS_FILE_NAME))
}

/// Load settings from the default location with environment overrides applied.
pub fn load_settings() -> ClientSettings {
    let settings = match settings_path() {
        Some(path) => load_settings_from(&path),
        None => {
            log::warn!("Settings: could not determine config directory");
            ClientSettings::default()
        }
    };
    settings.with_env_overrides()
}

pub fn load_settings_from(path: &Path) -> ClientSettings {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<ClientSettings>(&contents) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Settings: failed to parse {:?}: {}", path, e);
                ClientSettings::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => ClientSettings::default(),
        Err(e) => {
            log::warn!("Settings: failed to read {:?}: {}", path, e);
            ClientSettings::default()
        }
    }
}

pub fn save_settings_to(path: &Path, settings: &ClientSettings) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory {:?}: {}", parent, e))?;
    }

    let contents =
        serde_json::to_string_pretty(settings).map_err(|e| format!("Serialize settings: {}", e))?;

    // Write to a temp file in the same directory, then rename over the target.
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &contents)
        .map_err(|e| format!("Write temp settings {:?}: {}", tmp_path, e))?;

    // rename() does not replace an existing file on Windows
    if cfg!(windows) && path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(format!("Remove existing settings file {:?}: {}", path, e));
            }
        }
    }

    std::fs::rename(&tmp_path, path)
        .map_err(|e| format!("Rename temp settings {:?} to {:?}: {}", tmp_path, path, e))?;
    Ok(())
}
