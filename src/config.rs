use crate::error::{Error, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://aichatbot-326159028339.us-central1.run.app";
pub const DEFAULT_VOICE_PREFIX: &str =
    "https://storage.googleapis.com/oneplace-voice/voice-uploads/";

/// How the login page obtains a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthFlow {
    /// `POST /user/auth` with the phone number returns a token right away.
    #[default]
    Direct,
    /// Send a one-time code first, then verify it.
    Otp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub base_url: String,
    pub phone_digits: usize,
    pub otp_digits: usize,
    pub auth_flow: AuthFlow,
    pub token_ttl_days: i64,
    pub request_timeout_secs: Option<u64>,
    pub voice_url_prefix: String,
    pub max_attachment_bytes: u64,
    pub recorder_command: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            phone_digits: 8,
            otp_digits: 6,
            auth_flow: AuthFlow::Direct,
            token_ttl_days: 7,
            request_timeout_secs: Some(30),
            voice_url_prefix: DEFAULT_VOICE_PREFIX.to_string(),
            max_attachment_bytes: 25 * 1024 * 1024,
            recorder_command: [
                "arecord", "-q", "-f", "S16_LE", "-r", "16000", "-c", "1", "-t", "wav", "-",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

pub(crate) fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "example", "JobChat")
}

impl Settings {
    pub fn default_path() -> Option<PathBuf> {
        Some(project_dirs()?.config_dir().join("settings.toml"))
    }

    /// Loads settings from the default location. Missing or unreadable files
    /// fall back to defaults.
    pub fn load() -> Self {
        let Some(path) = Self::default_path() else {
            log::warn!("No config dir available, using default settings");
            return Self::default();
        };
        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Ignoring settings at {}: {e}", path.display());
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        toml::from_str(&text).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        fs::write(path, text)?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.token_ttl_days)
    }
}
