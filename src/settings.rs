use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::posture::Thresholds;

const DEBUG_ENV: &str = "SENTINEL_DEBUG";
const NANOS_PER_SEC: u64 = 1_000_000_000;
pub const MIN_FRAME_INTERVAL: Duration = Duration::from_millis(1);

/// Runtime configuration, built once at startup and handed to each component by reference.
///
/// Every field has a default, so a partial (or absent) settings file is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub device_id: String,
    pub backend_url: String,

    pub frame_width: u32,
    pub frame_height: u32,
    pub fps_target: u32,
    /// JSON-lines landmark feed replayed in place of a live camera + pose model.
    pub landmark_feed: Option<PathBuf>,

    /// Degrees from vertical; used until the user calibrates.
    pub default_torso_thresh: f64,
    /// Fraction of frame width; used until the user calibrates.
    pub default_head_thresh: f64,
    pub calibration_path: PathBuf,

    pub phone_check_interval_secs: u64,
    pub phone_timeout_secs: u64,
    #[serde(skip_serializing)]
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,

    #[serde(skip_serializing)]
    pub elevenlabs_api_key: Option<String>,
    pub voice_id: String,
    pub alert_cooldown_secs: u64,

    pub event_send_interval_ms: u64,
    pub flush_interval_secs: u64,
    pub http_timeout_secs: u64,

    pub serial_port: Option<String>,
    pub serial_baud: u32,
    pub serial_settle_ms: u64,
    pub serial_poll_ms: u64,

    pub initial_mode: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device_id: "focuspal-device-001".into(),
            backend_url: "http://127.0.0.1:5000".into(),
            frame_width: 320,
            frame_height: 240,
            fps_target: 10,
            landmark_feed: None,
            default_torso_thresh: 15.0,
            default_head_thresh: 0.08,
            calibration_path: std::env::temp_dir().join("posture_calibration.json"),
            phone_check_interval_secs: 5,
            phone_timeout_secs: 10,
            gemini_api_key: None,
            gemini_model: "gemini-2.5-flash".into(),
            elevenlabs_api_key: None,
            voice_id: "2ajXGJNYBR0iNHpS4VZb".into(),
            alert_cooldown_secs: 10,
            event_send_interval_ms: 1000,
            flush_interval_secs: 5,
            http_timeout_secs: 5,
            serial_port: None,
            serial_baud: 9600,
            serial_settle_ms: 3000,
            serial_poll_ms: 50,
            initial_mode: "FOCUS".into(),
        }
    }
}

impl Settings {
    /// Reads settings from `path`, falling back to defaults when the file is missing or
    /// unparsable, then applies environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let settings = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring unparsable settings file {}: {err}", path.display());
                Settings::default()
            })
        } else {
            Settings::default()
        };

        Ok(settings.with_env_overrides())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }

    fn with_env_overrides(mut self) -> Self {
        if let Some(key) = non_empty_env("GEMINI_API_KEY") {
            self.gemini_api_key = Some(key);
        }
        if let Some(key) = non_empty_env("ELEVENLABS_API_KEY") {
            self.elevenlabs_api_key = Some(key);
        }
        self
    }

    pub fn default_thresholds(&self) -> Thresholds {
        Thresholds {
            torso_deg: self.default_torso_thresh,
            head_fraction: self.default_head_thresh,
        }
    }

    /// Time between frames, never below [`MIN_FRAME_INTERVAL`] however high `fps_target` is.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_nanos(NANOS_PER_SEC / u64::from(self.fps_target.max(1)))
            .max(MIN_FRAME_INTERVAL)
    }

    pub fn phone_check_interval(&self) -> Duration {
        Duration::from_secs(self.phone_check_interval_secs)
    }

    pub fn phone_timeout(&self) -> Duration {
        Duration::from_secs(self.phone_timeout_secs)
    }

    pub fn alert_cooldown(&self) -> Duration {
        Duration::from_secs(self.alert_cooldown_secs)
    }

    pub fn event_send_interval(&self) -> Duration {
        Duration::from_millis(self.event_send_interval_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs.max(1))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// Whether `SENTINEL_DEBUG` asks for verbose logging. Read before settings are loaded so
/// the load itself is logged at the right level.
pub fn debug_requested() -> bool {
    std::env::var(DEBUG_ENV)
        .map(|value| is_truthy(&value))
        .unwrap_or(false)
}

fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    value == "1" || value.eq_ignore_ascii_case("true")
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
