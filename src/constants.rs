//! Constants used throughout the service

/// Number of facial landmarks for full face
pub const NUM_FACIAL_LANDMARKS: usize = 68;

/// Total number of 3D model coordinates (68 points × 3 dimensions)
pub const MODEL_POINTS_TOTAL_VALUES: usize = 204;

/// Camera matrix center factor
pub const CAMERA_CENTER_FACTOR: f64 = 2.0;

/// Below this `sqrt(R00² + R10²)` the rotation is treated as gimbal locked
pub const GIMBAL_LOCK_EPSILON: f64 = 1e-6;

/// Default yaw threshold in degrees separating Straight from Left/Right
pub const DEFAULT_YAW_THRESHOLD: f64 = 15.0;

/// Class id of "person" in the COCO label map used by the object detector
pub const PERSON_CLASS_ID: i64 = 1;

/// Minimum (exclusive) detection score counted as a person
pub const PERSON_SCORE_THRESHOLD: f32 = 0.5;

/// Identifier used by the save endpoint when no user is supplied
pub const DEFAULT_USER: &str = "unknown";

/// Default directory name for saved images, relative to the working directory
pub const DEFAULT_OUTPUT_DIR: &str = "images";

/// Extension of saved images
pub const SAVED_IMAGE_EXTENSION: &str = "jpg";

/// JPEG quality for saved images
pub const JPEG_QUALITY: u8 = 95;

/// Default bind address
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default bind port
pub const DEFAULT_PORT: u16 = 8080;

/// Default maximum request body size (base64 images are large)
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Image normalization constants for face detection
pub const IMAGE_NORMALIZATION_OFFSET: f32 = 127.5;
pub const IMAGE_NORMALIZATION_SCALE: f32 = 128.0;

/// Annotation box geometry in model units
pub const ANNOTATION_REAR_SIZE: f64 = 75.0;
pub const ANNOTATION_REAR_DEPTH: f64 = 0.0;
pub const ANNOTATION_FRONT_SIZE: f64 = 100.0;
pub const ANNOTATION_FRONT_DEPTH: f64 = 100.0;
