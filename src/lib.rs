//! Head pose estimation service library.
//!
//! The service decodes base64 images posted over HTTP and runs one of three
//! pipelines:
//! 1. Pose: face detection, 68-point landmark detection, remapping of the
//!    crop-space landmarks into the full image, a `PnP` (Perspective-n-Point)
//!    solve against a fixed 3D face model, decomposition of the rotation into
//!    yaw/pitch/roll, and classification of the yaw into Left/Right/Straight
//! 2. People: object detection and counting of confident person detections
//! 3. Save: writing the image as a JPEG named after the user
//!
//! Model backends sit behind the [`face_detection::FaceDetector`],
//! [`mark_detection::MarkDetector`], [`object_detection::ObjectDetector`] and
//! [`pose_estimation::PnpSolver`] traits. ONNX Runtime detectors are built with
//! the `onnx` feature; the `opencv` feature swaps the pure-Rust `PnP` solver for
//! `OpenCV`'s `solvePnP`.
//!
//! # Examples
//!
//! ## Decomposing a rotation
//!
//! ```
//! use head_pose_server::{direction::{classify, Direction}, euler::decompose};
//! use nalgebra::Vector3;
//!
//! // 30 degrees about the vertical axis
//! let angles = decompose(&Vector3::new(0.0, 30f64.to_radians(), 0.0));
//! assert!((angles.yaw - 30.0).abs() < 1e-9);
//! assert_eq!(classify(angles.yaw, 15.0), Direction::Right);
//! ```
//!
//! ## Running the service
//!
//! ```no_run
//! # #[cfg(feature = "onnx")]
//! # async fn run() -> head_pose_server::Result<()> {
//! use head_pose_server::{app::{HeadPoseApp, Models}, config::Config, server};
//!
//! let config = Config::default();
//! let app = HeadPoseApp::new(Models::load(&config)?, &config)?;
//! server::serve(app, &config.server).await
//! # }
//! ```

/// Base64 image decoding and JPEG encoding
pub mod codec;

/// Face detection module for finding faces in images
pub mod face_detection;

/// Facial landmark detection module for finding 68 key points
pub mod mark_detection;

/// Person detection and counting
pub mod object_detection;

/// Head pose estimation module using `PnP` algorithm
pub mod pose_estimation;

/// Rotation vector to Euler angle decomposition
pub mod euler;

/// Yaw-based head direction classification
pub mod direction;

/// Shared data types
pub mod types;

/// Utility functions for image processing and coordinate transformations
pub mod utils;

/// Error types and result handling
pub mod error;

/// Request pipelines
pub mod app;

/// HTTP routes and error mapping
pub mod server;

/// Constants used throughout the service
pub mod constants;

/// Configuration management
pub mod config;

pub use error::{Error, Result};
