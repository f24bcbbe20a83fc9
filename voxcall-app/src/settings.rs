//! Persistent application settings (JSON file in app data directory).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use voxcall_core::{CallConfig, PlaybackConfig, ResampleMode, ResourceConfig};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub server_url: String,
    pub user_id: String,
    pub scenario_id: String,
    pub preferred_input_device: Option<String>,
    pub preferred_output_device: Option<String>,
    pub initial_buffer_ms: u32,
    pub max_buffer_ms: u32,
    pub fade_ms: u32,
    pub base_rate: f32,
    pub fallback_timeout_ms: u64,
    pub release_grace_ms: u64,
    pub warm_up_ms: u64,
    pub resample_mode: ResampleMode,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:8080/call".into(),
            user_id: "anonymous".into(),
            scenario_id: "default".into(),
            preferred_input_device: None,
            preferred_output_device: None,
            initial_buffer_ms: 300,
            max_buffer_ms: 10_000,
            fade_ms: 5,
            base_rate: 0.98,
            fallback_timeout_ms: 1_000,
            release_grace_ms: 300,
            warm_up_ms: 200,
            resample_mode: ResampleMode::Linear,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        let defaults = Self::default();
        self.server_url = non_empty(&self.server_url).unwrap_or(defaults.server_url);
        self.user_id = non_empty(&self.user_id).unwrap_or(defaults.user_id);
        self.scenario_id = non_empty(&self.scenario_id).unwrap_or(defaults.scenario_id);
        self.preferred_input_device = self.preferred_input_device.as_deref().and_then(non_empty);
        self.preferred_output_device = self.preferred_output_device.as_deref().and_then(non_empty);
        self.initial_buffer_ms = self.initial_buffer_ms.clamp(20, 2_000);
        self.max_buffer_ms = self.max_buffer_ms.clamp(self.initial_buffer_ms, 60_000);
        self.fade_ms = self.fade_ms.clamp(1, 50);
        self.base_rate = if self.base_rate.is_finite() {
            self.base_rate.clamp(0.90, 1.0)
        } else {
            defaults.base_rate
        };
        self.fallback_timeout_ms = self.fallback_timeout_ms.clamp(100, 10_000);
        self.release_grace_ms = self.release_grace_ms.clamp(0, 5_000);
        self.warm_up_ms = self.warm_up_ms.clamp(0, 5_000);
    }

    /// Engine configuration derived from these settings.
    pub fn call_config(&self) -> CallConfig {
        let defaults = CallConfig::default();
        let mut playback = PlaybackConfig {
            initial_threshold_ms: self.initial_buffer_ms,
            max_buffer_ms: self.max_buffer_ms,
            fade_ms: self.fade_ms,
            ..defaults.playback.clone()
        };
        playback.rate.base = self.base_rate;
        CallConfig {
            playback,
            resources: ResourceConfig {
                release_grace: Duration::from_millis(self.release_grace_ms),
                warm_up: Duration::from_millis(self.warm_up_ms),
            },
            fallback_timeout: Duration::from_millis(self.fallback_timeout_ms),
            resample_mode: self.resample_mode,
            ..defaults
        }
    }
}

fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("voxcall")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("voxcall")
            .join("settings.json")
    }
}

pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<AppSettings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}
