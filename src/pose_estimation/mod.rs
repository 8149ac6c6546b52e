//! Head pose estimation from 68 facial landmarks using a `PnP` solve.

mod iterative;
#[cfg(feature = "opencv")]
mod opencv_backend;

pub use iterative::IterativePnp;
#[cfg(feature = "opencv")]
pub use opencv_backend::OpenCvPnp;

use crate::{
    constants::{
        ANNOTATION_FRONT_DEPTH, ANNOTATION_FRONT_SIZE, ANNOTATION_REAR_DEPTH, ANNOTATION_REAR_SIZE,
        CAMERA_CENTER_FACTOR, MODEL_POINTS_TOTAL_VALUES, NUM_FACIAL_LANDMARKS,
    },
    euler::rotation_vector_to_matrix,
    types::{Image, LandmarkSet, Pose},
    Error, Result,
};
use image::Rgb;
use imageproc::drawing::draw_line_segment_mut;
use nalgebra::{Matrix3, Point2, Point3};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Perspective-n-point solver: rigid pose of `object_points` seen at `image_points`
pub trait PnpSolver: Send + Sync {
    /// Short backend name for logging
    fn name(&self) -> &'static str;

    /// Solve for the pose minimizing reprojection error
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoseSolve`] if the solver does not converge
    fn solve(
        &self,
        object_points: &[Point3<f64>],
        image_points: &[Point2<f64>],
        camera: &CameraIntrinsics,
    ) -> Result<Pose>;
}

/// Pinhole intrinsics without lens distortion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraIntrinsics {
    /// Approximate intrinsics for an uncalibrated camera: focal length equal
    /// to the image width, principal point at the image center
    #[must_use]
    pub fn for_image(width: u32, height: u32) -> Self {
        let focal_length = f64::from(width);
        Self {
            fx: focal_length,
            fy: focal_length,
            cx: f64::from(width) / CAMERA_CENTER_FACTOR,
            cy: f64::from(height) / CAMERA_CENTER_FACTOR,
        }
    }

    #[must_use]
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0)
    }

    /// Project a camera-frame point to pixels
    #[must_use]
    pub fn project(&self, p: &Point3<f64>) -> Point2<f64> {
        Point2::new(self.fx * p.x / p.z + self.cx, self.fy * p.y / p.z + self.cy)
    }

    /// Pixel to normalized image plane coordinates
    #[must_use]
    pub fn normalize(&self, p: &Point2<f64>) -> Point2<f64> {
        Point2::new((p.x - self.cx) / self.fx, (p.y - self.cy) / self.fy)
    }
}

/// Project model points into the image under `pose`
#[must_use]
pub fn project_points(points: &[Point3<f64>], pose: &Pose, camera: &CameraIntrinsics) -> Vec<Point2<f64>> {
    let rotation = rotation_vector_to_matrix(&pose.rotation);
    points
        .iter()
        .map(|p| camera.project(&Point3::from(rotation * p.coords + pose.translation)))
        .collect()
}

/// 3D reference face with 68 points in iBUG landmark order
#[derive(Debug, Clone, PartialEq)]
pub struct FaceModel {
    points: Vec<Point3<f64>>,
}

impl FaceModel {
    /// Load model points from a text file of 204 values, one per line
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The model file cannot be read
    /// - The model file has an invalid format
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        log::info!("Loading 3D face model: {}", path.as_ref().display());
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse model text stored axis-major (68 x values, then y, then z).
    ///
    /// The z axis is negated so the model faces the camera.
    ///
    /// # Errors
    ///
    /// Returns an error unless exactly 204 numeric lines are present
    pub fn parse(content: &str) -> Result<Self> {
        let values: Vec<f64> = content
            .lines()
            .filter_map(|line| line.trim().parse::<f64>().ok())
            .collect();

        if values.len() != MODEL_POINTS_TOTAL_VALUES {
            return Err(Error::ModelValidationError(format!(
                "Expected {} coordinate values ({} points × 3), got {}",
                MODEL_POINTS_TOTAL_VALUES,
                NUM_FACIAL_LANDMARKS,
                values.len()
            )));
        }

        let (xs, rest) = values.split_at(NUM_FACIAL_LANDMARKS);
        let (ys, zs) = rest.split_at(NUM_FACIAL_LANDMARKS);
        let points = xs
            .iter()
            .zip(ys)
            .zip(zs)
            .map(|((&x, &y), &z)| Point3::new(x, y, -z))
            .collect();

        Ok(Self { points })
    }

    /// Use points already in camera-facing orientation
    ///
    /// # Errors
    ///
    /// Returns an error if the number of points is not 68
    pub fn from_points(points: Vec<Point3<f64>>) -> Result<Self> {
        if points.len() != NUM_FACIAL_LANDMARKS {
            return Err(Error::ModelValidationError(format!(
                "Expected {} model points, got {}",
                NUM_FACIAL_LANDMARKS,
                points.len()
            )));
        }
        Ok(Self { points })
    }

    #[must_use]
    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }
}

/// Head pose estimator for one image size
pub struct PoseEstimator {
    model: Arc<FaceModel>,
    solver: Arc<dyn PnpSolver>,
    camera: CameraIntrinsics,
}

impl PoseEstimator {
    /// Create a pose estimator with camera parameters derived from the image size
    #[must_use]
    pub fn new(model: Arc<FaceModel>, solver: Arc<dyn PnpSolver>, image_width: u32, image_height: u32) -> Self {
        Self {
            model,
            solver,
            camera: CameraIntrinsics::for_image(image_width, image_height),
        }
    }

    #[must_use]
    pub fn camera(&self) -> &CameraIntrinsics {
        &self.camera
    }

    /// Solve the head pose from full-image landmarks
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoseSolve`] if the solver fails to converge
    pub fn solve_pose(&self, landmarks: &LandmarkSet) -> Result<Pose> {
        let pose = self.solver.solve(self.model.points(), landmarks.points(), &self.camera)?;
        log::debug!(
            "{} pose: rotation {:?}, translation {:?}",
            self.solver.name(),
            pose.rotation.as_slice(),
            pose.translation.as_slice()
        );
        Ok(pose)
    }

    /// Draw a 3D box aligned with the head pose
    #[allow(clippy::cast_possible_truncation)] // pixel coordinates
    #[allow(clippy::cast_precision_loss)]
    pub fn annotate(&self, image: &mut Image, pose: &Pose, color: Rgb<u8>, line_width: u32) {
        let square = |size: f64, depth: f64| {
            [
                Point3::new(-size, -size, depth),
                Point3::new(-size, size, depth),
                Point3::new(size, size, depth),
                Point3::new(size, -size, depth),
            ]
        };
        let rear = square(ANNOTATION_REAR_SIZE, ANNOTATION_REAR_DEPTH);
        let front = square(ANNOTATION_FRONT_SIZE, ANNOTATION_FRONT_DEPTH);
        let corners: Vec<Point3<f64>> = rear.iter().chain(front.iter()).copied().collect();

        let projected = project_points(&corners, pose, &self.camera);
        if projected.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            log::warn!("Annotation box projects outside the image plane, skipping");
            return;
        }
        let pts: Vec<(f32, f32)> = projected.iter().map(|p| (p.x as f32, p.y as f32)).collect();

        let mut edges = Vec::with_capacity(12);
        for i in 0..4 {
            let j = (i + 1) % 4;
            edges.push((pts[i], pts[j]));
            edges.push((pts[i + 4], pts[j + 4]));
            edges.push((pts[i], pts[i + 4]));
        }

        let width = line_width.max(1);
        for (start, end) in edges {
            for offset in 0..width {
                let d = offset as f32 - (width - 1) as f32 / 2.0;
                draw_line_segment_mut(image, (start.0 + d, start.1), (end.0 + d, end.1), color);
                draw_line_segment_mut(image, (start.0, start.1 + d), (end.0, end.1 + d), color);
            }
        }
    }
}
