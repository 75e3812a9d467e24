//! Service configuration for lumen

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix, e.g. `LUMEN__SERVER__PORT=8002`
pub const ENV_PREFIX: &str = "LUMEN";

/// Rooms created when the configuration does not list any
pub const DEFAULT_ROOMS: &[&str] = &["Classroom", "Lab", "Library", "Office"];

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8002,
        }
    }
}

/// Tuning for the per-room capture/detect/publish loop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Minimum detector confidence for a person box to count
    pub confidence_threshold: f32,
    /// Run the detector on every Nth frame
    pub detect_every: u32,
    /// Downscale factor applied before detection, in (0, 1]
    pub resize_factor: f32,
    /// JPEG quality of published frames (1-100)
    pub jpeg_quality: u8,
    /// Loop throttle; 0 disables throttling
    pub target_fps: u32,
    pub stop_timeout_ms: u64,
    /// Delay between reopen attempts of a network stream (retried until stopped)
    pub network_retry_backoff_ms: u64,
    /// Delay after a failed local camera read
    pub camera_retry_backoff_ms: u64,
    /// Consecutive failed local camera reads tolerated before the worker goes idle
    pub camera_max_retries: u32,
    pub camera_resolution: (u32, u32),
    pub camera_fps: u32,
    /// TrueType font for box labels and the status block, overriding the bundled one
    pub font_path: Option<PathBuf>,
    /// ONNX person detection model
    pub model_path: Option<PathBuf>,
    /// Re-annotate skipped frames with the last detections instead of
    /// keeping the last published frame
    pub redraw_skipped_frames: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.4,
            detect_every: 3,
            resize_factor: 0.6,
            jpeg_quality: 60,
            target_fps: 25,
            stop_timeout_ms: 5_000,
            network_retry_backoff_ms: 5_000,
            camera_retry_backoff_ms: 1_000,
            camera_max_retries: 30,
            camera_resolution: (640, 480),
            camera_fps: 30,
            font_path: None,
            model_path: None,
            redraw_skipped_frames: false,
        }
    }
}

impl PipelineConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn network_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.network_retry_backoff_ms)
    }

    pub fn camera_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.camera_retry_backoff_ms)
    }

    /// Minimum time between loop iterations, if throttling is enabled
    pub fn frame_interval(&self) -> Option<Duration> {
        if self.target_fps == 0 {
            None
        } else {
            Some(Duration::from_secs_f64(1.0 / self.target_fps as f64))
        }
    }
}

/// External control endpoint used by the decoupled orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub occupancy_url: String,
    pub report_timeout_ms: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            occupancy_url: "http://127.0.0.1:8002/api/occupancy".to_string(),
            report_timeout_ms: 1_000,
        }
    }
}

impl ControlConfig {
    pub fn report_timeout(&self) -> Duration {
        Duration::from_millis(self.report_timeout_ms)
    }
}

/// A room as declared in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomDefinition {
    pub id: String,
    #[serde(default)]
    pub stream_url: Option<String>,
    #[serde(default)]
    pub camera_index: i32,
}

impl RoomDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            stream_url: None,
            camera_index: 0,
        }
    }
}

/// Top-level service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LumenConfig {
    pub server: ServerConfig,
    pub pipeline: PipelineConfig,
    pub control: ControlConfig,
    pub rooms: Vec<RoomDefinition>,
}

impl Default for LumenConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            pipeline: PipelineConfig::default(),
            control: ControlConfig::default(),
            rooms: DEFAULT_ROOMS.iter().map(|id| RoomDefinition::new(*id)).collect(),
        }
    }
}

impl LumenConfig {
    /// Load configuration from an optional file, overlaid with `LUMEN__*`
    /// environment variables. The file format follows its extension.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            if !path.exists() {
                return Err(Error::Configuration(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: LumenConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let pipeline = &self.pipeline;

        if !(0.0..=1.0).contains(&pipeline.confidence_threshold) {
            return Err(Error::Configuration(
                "pipeline.confidence_threshold must be between 0 and 1".to_string(),
            ));
        }

        if pipeline.detect_every == 0 {
            return Err(Error::Configuration(
                "pipeline.detect_every must be at least 1".to_string(),
            ));
        }

        if !(pipeline.resize_factor > 0.0 && pipeline.resize_factor <= 1.0) {
            return Err(Error::Configuration(
                "pipeline.resize_factor must be in (0, 1]".to_string(),
            ));
        }

        if pipeline.jpeg_quality == 0 || pipeline.jpeg_quality > 100 {
            return Err(Error::Configuration(
                "pipeline.jpeg_quality must be between 1 and 100".to_string(),
            ));
        }

        if pipeline.target_fps > 120 {
            return Err(Error::Configuration(
                "pipeline.target_fps must be at most 120".to_string(),
            ));
        }

        let (width, height) = pipeline.camera_resolution;
        if width == 0 || height == 0 || width > 7680 || height > 4320 {
            return Err(Error::Configuration(
                "pipeline.camera_resolution must be non-zero and at most 8K".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for room in &self.rooms {
            if room.id.trim().is_empty() {
                return Err(Error::Configuration("room id cannot be empty".to_string()));
            }
            if !seen.insert(room.id.as_str()) {
                return Err(Error::Configuration(format!("duplicate room id: {}", room.id)));
            }
        }

        if self.server.port == 0 {
            return Err(Error::Configuration("server.port cannot be 0".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = LumenConfig::default();
        assert_eq!(config.server.port, 8002);
        assert_eq!(config.pipeline.detect_every, 3);
        assert_eq!(config.pipeline.jpeg_quality, 60);
        assert_eq!(config.rooms.len(), 4);
        assert_eq!(config.rooms[0].id, "Classroom");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_detect_every_zero() {
        let mut config = LumenConfig::default();
        config.pipeline.detect_every = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_resize_factor() {
        let mut config = LumenConfig::default();
        config.pipeline.resize_factor = 0.0;
        assert!(config.validate().is_err());

        config.pipeline.resize_factor = 1.5;
        assert!(config.validate().is_err());

        config.pipeline.resize_factor = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_jpeg_quality() {
        let mut config = LumenConfig::default();
        config.pipeline.jpeg_quality = 0;
        assert!(config.validate().is_err());

        config.pipeline.jpeg_quality = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_duplicate_rooms() {
        let mut config = LumenConfig::default();
        config.rooms.push(RoomDefinition::new("Lab"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_frame_interval() {
        let mut config = PipelineConfig::default();
        assert_eq!(config.frame_interval(), Some(Duration::from_millis(40)));

        config.target_fps = 0;
        assert_eq!(config.frame_interval(), None);
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let content = r#"
            [server]
            port = 9000

            [[rooms]]
            id = "Lab"
            stream_url = "rtsp://camera/1"
        "#;
        let config: LumenConfig = toml::from_str(content).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.pipeline.confidence_threshold, 0.4);
        assert_eq!(config.rooms.len(), 1);
        assert_eq!(config.rooms[0].stream_url.as_deref(), Some("rtsp://camera/1"));
        assert_eq!(config.rooms[0].camera_index, 0);
    }

    #[test]
    fn test_load_missing_file() {
        let result = LumenConfig::load(Some(Path::new("/nonexistent/lumen.toml")));
        assert!(matches!(result, Err(Error::Configuration(_))));
    }
}
