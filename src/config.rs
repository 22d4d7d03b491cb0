use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("detection.frame_skip must be at least 1")]
    ZeroFrameSkip,
    #[error("display.flash_cycle_frames must be at least 1")]
    ZeroFlashCycle,
    #[error("detection.matching_distance must be finite and non-negative, got {0}")]
    BadMatchingDistance(f32),
    #[error("camera dimensions must be non-zero")]
    ZeroCameraDimensions,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    #[serde(default = "default_camera_id")]
    pub id: String,
    /// Capture input: a V4L2 device path or an rtsp:// URL.
    #[serde(default = "default_camera_input")]
    pub input: String,
    #[serde(default = "default_camera_width")]
    pub width: u32,
    #[serde(default = "default_camera_height")]
    pub height: u32,
    #[serde(default = "default_camera_fps")]
    pub fps: u32,
}

fn default_camera_id() -> String {
    "cam0".to_string()
}

fn default_camera_input() -> String {
    "/dev/video0".to_string()
}

fn default_camera_width() -> u32 {
    640
}

fn default_camera_height() -> u32 {
    480
}

fn default_camera_fps() -> u32 {
    30
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            id: default_camera_id(),
            input: default_camera_input(),
            width: default_camera_width(),
            height: default_camera_height(),
            fps: default_camera_fps(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Run the detector only every Nth captured frame.
    #[serde(default = "default_frame_skip")]
    pub frame_skip: u32,
    #[serde(default = "default_threat_labels")]
    pub threat_labels: Vec<String>,
    /// Pixel threshold deciding whether two detections are the same object.
    #[serde(default = "default_matching_distance")]
    pub matching_distance: f32,
    /// Grace period a threat stays visible after its last detection.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_frame_skip() -> u32 {
    5
}

fn default_threat_labels() -> Vec<String> {
    vec!["knife".to_string(), "scissors".to_string()]
}

fn default_matching_distance() -> f32 {
    100.0
}

fn default_timeout_ms() -> u64 {
    2000
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            frame_skip: default_frame_skip(),
            threat_labels: default_threat_labels(),
            matching_distance: default_matching_distance(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PacingConfig {
    /// Fixed sleep between cycles; not adaptive.
    #[serde(default = "default_sleep_ms")]
    pub sleep_ms: u64,
    #[serde(default = "default_overrun_warn_ms")]
    pub overrun_warn_ms: u64,
    #[serde(default = "default_fps_log_interval")]
    pub fps_log_interval: u64,
}

fn default_sleep_ms() -> u64 {
    10
}

fn default_overrun_warn_ms() -> u64 {
    100
}

fn default_fps_log_interval() -> u64 {
    30
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            sleep_ms: default_sleep_ms(),
            overrun_warn_ms: default_overrun_warn_ms(),
            fps_log_interval: default_fps_log_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    /// Frame-count period over which threat boxes alternate colors.
    #[serde(default = "default_flash_cycle_frames")]
    pub flash_cycle_frames: u32,
}

fn default_flash_cycle_frames() -> u32 {
    20
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            flash_cycle_frames: default_flash_cycle_frames(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.detection.frame_skip == 0 {
            return Err(ConfigError::ZeroFrameSkip);
        }
        if self.display.flash_cycle_frames == 0 {
            return Err(ConfigError::ZeroFlashCycle);
        }
        let distance = self.detection.matching_distance;
        if !distance.is_finite() || distance < 0.0 {
            return Err(ConfigError::BadMatchingDistance(distance));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(ConfigError::ZeroCameraDimensions);
        }
        Ok(())
    }
}
