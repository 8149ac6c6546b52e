//! Configuration management for the head pose service

use crate::{
    constants::{
        DEFAULT_HOST, DEFAULT_MAX_BODY_BYTES, DEFAULT_OUTPUT_DIR, DEFAULT_PORT, DEFAULT_YAW_THRESHOLD,
        PERSON_CLASS_ID, PERSON_SCORE_THRESHOLD,
    },
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listener configuration
    pub server: ServerConfig,

    /// Model configuration
    pub models: ModelConfig,

    /// Face detection configuration
    pub face_detection: FaceDetectionConfig,

    /// Pose estimation and classification configuration
    pub pose: PoseConfig,

    /// Person counting configuration
    pub people: PeopleConfig,

    /// Saved image storage configuration
    pub storage: StorageConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,

    /// Bind port
    pub port: u16,

    /// Maximum accepted request body in bytes
    pub max_body_bytes: usize,
}

/// Model file paths configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Path to face detection ONNX model
    pub face_detector: PathBuf,

    /// Path to facial landmarks ONNX model
    pub face_landmarks: PathBuf,

    /// Path to 3D face model points
    pub face_model_3d: PathBuf,

    /// Path to object (person) detection ONNX model
    pub object_detector: PathBuf,
}

/// Face detection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceDetectionConfig {
    /// Confidence threshold for face detection (0.0-1.0)
    pub confidence_threshold: f32,

    /// IOU threshold for non-maximum suppression (0.0-1.0)
    pub iou_threshold: f32,

    /// Face region expansion factor before squaring
    pub bbox_expansion: f32,
}

/// Pose estimation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseConfig {
    /// Yaw in degrees beyond which the head counts as turned
    pub yaw_threshold: f64,

    /// Directory for debug annotation images; disabled when unset
    pub annotation_dir: Option<PathBuf>,
}

/// Person counting parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeopleConfig {
    /// Class id counted as a person
    pub person_class_id: i64,

    /// Minimum (exclusive) detection score
    pub score_threshold: f32,
}

/// Saved image storage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Output directory, relative paths resolve against the working directory
    pub output_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            face_detector: PathBuf::from("assets/face_detector.onnx"),
            face_landmarks: PathBuf::from("assets/face_landmarks.onnx"),
            face_model_3d: PathBuf::from("assets/model.txt"),
            object_detector: PathBuf::from("assets/efficientdet.onnx"),
        }
    }
}

impl Default for FaceDetectionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            iou_threshold: 0.5,
            bbox_expansion: 0.1,
        }
    }
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            yaw_threshold: DEFAULT_YAW_THRESHOLD,
            annotation_dir: None,
        }
    }
}

impl Default for PeopleConfig {
    fn default() -> Self {
        Self {
            person_class_id: PERSON_CLASS_ID,
            score_threshold: PERSON_SCORE_THRESHOLD,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text; missing fields take defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid configuration YAML
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)?;

        Ok(())
    }

    /// Validate value ranges. Model paths are checked when the models load.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] describing the first invalid value
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.face_detection.confidence_threshold) {
            return Err(Error::ConfigError(
                "Confidence threshold must be between 0.0 and 1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.face_detection.iou_threshold) {
            return Err(Error::ConfigError(
                "IOU threshold must be between 0.0 and 1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.face_detection.bbox_expansion) {
            return Err(Error::ConfigError(
                "Bounding box expansion must be between 0.0 and 1.0".to_string(),
            ));
        }

        if !self.pose.yaw_threshold.is_finite() || self.pose.yaw_threshold < 0.0 {
            return Err(Error::ConfigError(
                "Yaw threshold must be a non-negative number of degrees".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.people.score_threshold) {
            return Err(Error::ConfigError(
                "Person score threshold must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.server.max_body_bytes == 0 {
            return Err(Error::ConfigError("Maximum body size must be greater than 0".to_string()));
        }
        if self.storage.output_dir.as_os_str().is_empty() {
            return Err(Error::ConfigError("Output directory must not be empty".to_string()));
        }

        Ok(())
    }
}

/// Example configuration file content
pub const EXAMPLE_CONFIG: &str = r#"# Head Pose Service Configuration

# HTTP listener
server:
  host: "0.0.0.0"
  port: 8080
  max_body_bytes: 16777216

# Model paths
models:
  face_detector: "assets/face_detector.onnx"
  face_landmarks: "assets/face_landmarks.onnx"
  face_model_3d: "assets/model.txt"
  object_detector: "assets/efficientdet.onnx"

# Face detection parameters
face_detection:
  confidence_threshold: 0.5
  iou_threshold: 0.5
  bbox_expansion: 0.1

# Pose classification
pose:
  yaw_threshold: 15.0
  # annotation_dir: "debug"

# Person counting
people:
  person_class_id: 1
  score_threshold: 0.5

# Saved images
storage:
  output_dir: "images"
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_config_parses_and_validates() {
        let config = Config::from_yaml(EXAMPLE_CONFIG).unwrap();
        config.validate().unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.pose.yaw_threshold, 15.0);
        assert_eq!(config.people.person_class_id, 1);
        assert!(config.pose.annotation_dir.is_none());
    }

    #[test]
    fn test_defaults_match_example() {
        let defaults = Config::default();
        let example = Config::from_yaml(EXAMPLE_CONFIG).unwrap();
        assert_eq!(defaults.server.host, example.server.host);
        assert_eq!(defaults.server.max_body_bytes, example.server.max_body_bytes);
        assert_eq!(defaults.storage.output_dir, example.storage.output_dir);
        assert_eq!(defaults.models.face_model_3d, example.models.face_model_3d);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = Config::from_yaml("pose:\n  yaw_threshold: 20.0\n").unwrap();
        assert_eq!(config.pose.yaw_threshold, 20.0);
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.people.score_threshold, PERSON_SCORE_THRESHOLD);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = Config::default();
        config.pose.yaw_threshold = -1.0;
        assert!(matches!(config.validate(), Err(Error::ConfigError(_))));

        let mut config = Config::default();
        config.face_detection.confidence_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.max_body_bytes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_yaml() {
        assert!(matches!(Config::from_yaml("server: [1, 2"), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        let mut config = Config::default();
        config.server.port = 9000;
        config.pose.annotation_dir = Some(PathBuf::from("debug"));
        config.to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.server.port, 9000);
        assert_eq!(loaded.pose.annotation_dir, Some(PathBuf::from("debug")));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(Config::from_file("/nonexistent/config.yaml"), Err(Error::Io(_))));
    }
}
