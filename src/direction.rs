//! Head direction classification from yaw.

use crate::{constants::DEFAULT_YAW_THRESHOLD, Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse head direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Left,
    Right,
    Straight,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Left => "Left",
            Self::Right => "Right",
            Self::Straight => "Straight",
        };
        f.write_str(name)
    }
}

/// Classify yaw in degrees against a symmetric threshold.
///
/// Only strict excursions beyond `±threshold` count as Left or Right.
#[must_use]
pub fn classify(yaw_deg: f64, threshold: f64) -> Direction {
    if yaw_deg < -threshold {
        Direction::Left
    } else if yaw_deg > threshold {
        Direction::Right
    } else {
        Direction::Straight
    }
}

/// Direction classifier with a validated threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionClassifier {
    threshold: f64,
}

impl DirectionClassifier {
    /// # Errors
    ///
    /// Returns an error if the threshold is negative or not finite
    pub fn new(threshold: f64) -> Result<Self> {
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(Error::ConfigError(format!(
                "Yaw threshold must be a non-negative number of degrees, got {threshold}"
            )));
        }
        Ok(Self { threshold })
    }

    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    #[must_use]
    pub fn classify(&self, yaw_deg: f64) -> Direction {
        classify(yaw_deg, self.threshold)
    }
}

impl Default for DirectionClassifier {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_YAW_THRESHOLD,
        }
    }
}
