//! Core data types shared by the pipeline stages.

use crate::{constants::NUM_FACIAL_LANDMARKS, Error, Result};
use nalgebra::{Point2, Vector3};
use serde::Serialize;

/// Decoded RGB raster, 8 bits per channel
pub type Image = image::RgbImage;

/// Axis-aligned box in full-image pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    /// Create a box from its corners
    ///
    /// # Errors
    ///
    /// Returns an error unless `x1 < x2` and `y1 < y2`
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Result<Self> {
        if x1 >= x2 || y1 >= y2 {
            return Err(Error::InvalidInput(format!(
                "Degenerate bounding box ({x1}, {y1}, {x2}, {y2})"
            )));
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    /// Create a box from its top-left corner and size
    ///
    /// # Errors
    ///
    /// Returns an error if width or height is not positive
    pub fn from_xywh(x: i32, y: i32, width: i32, height: i32) -> Result<Self> {
        Self::new(x, y, x.saturating_add(width), y.saturating_add(height))
    }

    #[must_use]
    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    #[must_use]
    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    /// Intersect the box with an image of the given size.
    ///
    /// Returns `None` when no pixel of the box lies inside the image.
    #[must_use]
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Self> {
        let max_x = i32::try_from(width).unwrap_or(i32::MAX);
        let max_y = i32::try_from(height).unwrap_or(i32::MAX);
        Self::new(
            self.x1.clamp(0, max_x),
            self.y1.clamp(0, max_y),
            self.x2.clamp(0, max_x),
            self.y2.clamp(0, max_y),
        )
        .ok()
    }
}

/// The 68 facial landmarks in iBUG ordering.
///
/// Jaw 0-16, brows 17-26, nose 27-35, eyes 36-47, mouth 48-67. The pose
/// solver's 3D reference model uses the same indexing.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    points: Vec<Point2<f64>>,
}

impl LandmarkSet {
    /// Wrap exactly 68 points
    ///
    /// # Errors
    ///
    /// Returns an error if the number of points is not 68
    pub fn new(points: Vec<Point2<f64>>) -> Result<Self> {
        if points.len() != NUM_FACIAL_LANDMARKS {
            return Err(Error::InvalidInput(format!(
                "Expected {} landmarks, got {}",
                NUM_FACIAL_LANDMARKS,
                points.len()
            )));
        }
        Ok(Self { points })
    }

    /// Build from a flat `[x0, y0, x1, y1, ...]` model output
    ///
    /// # Errors
    ///
    /// Returns an error if the slice does not hold exactly 136 values
    pub fn from_flat(values: &[f32]) -> Result<Self> {
        if values.len() != NUM_FACIAL_LANDMARKS * 2 {
            return Err(Error::ModelDataFormatError(format!(
                "Expected {} landmark values, got {}",
                NUM_FACIAL_LANDMARKS * 2,
                values.len()
            )));
        }
        let points = values
            .chunks_exact(2)
            .map(|xy| Point2::new(f64::from(xy[0]), f64::from(xy[1])))
            .collect();
        Self::new(points)
    }

    #[must_use]
    pub fn points(&self) -> &[Point2<f64>] {
        &self.points
    }

    pub fn iter(&self) -> impl Iterator<Item = &Point2<f64>> {
        self.points.iter()
    }

    pub(crate) fn map(&self, f: impl Fn(&Point2<f64>) -> Point2<f64>) -> Self {
        Self {
            points: self.points.iter().map(f).collect(),
        }
    }
}

/// Camera-relative pose of the head model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// Axis-angle rotation vector
    pub rotation: Vector3<f64>,
    /// Translation in model units
    pub translation: Vector3<f64>,
}

/// Head orientation in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EulerAngles {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box_rejects_degenerate() {
        assert!(BoundingBox::new(10, 10, 10, 20).is_err());
        assert!(BoundingBox::new(10, 20, 30, 5).is_err());
        assert!(BoundingBox::from_xywh(0, 0, 0, 5).is_err());

        let bbox = BoundingBox::from_xywh(5, 6, 10, 20).unwrap();
        assert_eq!(bbox, BoundingBox { x1: 5, y1: 6, x2: 15, y2: 26 });
        assert_eq!(bbox.width(), 10);
        assert_eq!(bbox.height(), 20);
    }

    #[test]
    fn test_clamp_to_image() {
        let bbox = BoundingBox::new(-10, -5, 50, 300).unwrap();
        let clamped = bbox.clamp_to(100, 200).unwrap();
        assert_eq!(clamped, BoundingBox { x1: 0, y1: 0, x2: 50, y2: 200 });

        let outside = BoundingBox::new(150, 10, 180, 40).unwrap();
        assert!(outside.clamp_to(100, 200).is_none());
    }

    #[test]
    fn test_landmark_set_requires_68_points() {
        assert!(LandmarkSet::new(vec![Point2::origin(); 67]).is_err());
        assert!(LandmarkSet::new(vec![Point2::origin(); 69]).is_err());
        assert_eq!(LandmarkSet::new(vec![Point2::origin(); 68]).unwrap().points().len(), 68);
    }

    #[test]
    fn test_landmark_set_from_flat() {
        let values: Vec<f32> = (0..136).map(|i| i as f32 / 136.0).collect();
        let set = LandmarkSet::from_flat(&values).unwrap();
        assert!((set.points()[1].x - f64::from(2.0f32 / 136.0)).abs() < 1e-12);
        assert!((set.points()[1].y - f64::from(3.0f32 / 136.0)).abs() < 1e-12);

        assert!(matches!(
            LandmarkSet::from_flat(&values[..100]),
            Err(Error::ModelDataFormatError(_))
        ));
    }
}
