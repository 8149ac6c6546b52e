use crate::{
    types::{Image, LandmarkSet},
    Result,
};

#[cfg(feature = "onnx")]
use crate::{
    utils::image_conversion::{normalize_unit, to_nhwc_batch},
    Error,
};
#[cfg(feature = "onnx")]
use image::imageops::{self, FilterType};
#[cfg(feature = "onnx")]
use ndarray::CowArray;
#[cfg(feature = "onnx")]
use ort::{Environment, Session, Value};
#[cfg(feature = "onnx")]
use std::path::Path;
#[cfg(feature = "onnx")]
use std::sync::Arc;

/// Default landmark detector input size
#[cfg(feature = "onnx")]
const DEFAULT_LANDMARK_INPUT_SIZE: u32 = 128;

/// Locates the 68 facial landmarks in a face crop
pub trait MarkDetector: Send + Sync {
    /// Detect landmarks normalized to the crop: `(0, 0)` is the crop's
    /// top-left corner and `1.0` spans its width.
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails or the output is not 68 points
    fn detect_landmarks(&self, face: &Image) -> Result<LandmarkSet>;
}

/// Facial landmark detector using `ONNX` Runtime
#[cfg(feature = "onnx")]
pub struct OnnxMarkDetector {
    session: Session,
    input_size: u32,
}

#[cfg(feature = "onnx")]
impl OnnxMarkDetector {
    /// Create a new landmark detector from an `ONNX` model file
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The ONNX model file cannot be loaded
    /// - The model has no inputs or outputs
    /// - The ONNX runtime environment cannot be created
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        log::info!("Initializing MarkDetector with model: {}", model_path.as_ref().display());
        let environment = Arc::new(
            Environment::builder()
                .with_name("mark_detector")
                .with_log_level(ort::LoggingLevel::Warning)
                .build()?,
        );

        let session = ort::SessionBuilder::new(&environment)?
            .with_optimization_level(ort::GraphOptimizationLevel::Level3)?
            .with_model_from_file(model_path)?;

        if session.inputs.is_empty() {
            return Err(Error::ModelInputError("Model has no inputs".to_string()));
        }
        if session.outputs.is_empty() {
            return Err(Error::ModelOutputError("Model has no outputs".to_string()));
        }

        Ok(Self {
            session,
            input_size: DEFAULT_LANDMARK_INPUT_SIZE,
        })
    }

    /// Run the model on an already resized face, returning the flat mark values
    fn forward(&self, face: &Image) -> Result<Vec<f32>> {
        // NHWC, pixels in [0, 1]
        let inputs = to_nhwc_batch(normalize_unit(face));
        let cow_array = CowArray::from(inputs.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;

        let outputs = self.session.run(vec![input_tensor])?;
        let marks_output = outputs
            .first()
            .ok_or_else(|| Error::ModelOutputError("No output from model".to_string()))?;

        let marks_tensor = marks_output.try_extract::<f32>()?;
        let marks: Vec<f32> = marks_tensor.view().iter().copied().collect();
        Ok(marks)
    }
}

#[cfg(feature = "onnx")]
impl MarkDetector for OnnxMarkDetector {
    fn detect_landmarks(&self, face: &Image) -> Result<LandmarkSet> {
        let resized = imageops::resize(face, self.input_size, self.input_size, FilterType::Triangle);
        let marks = self.forward(&resized)?;
        LandmarkSet::from_flat(&marks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::NUM_FACIAL_LANDMARKS;
    use nalgebra::Point2;

    /// Fixture returning the same normalized marks for any crop
    struct FixedMarks(Vec<f32>);

    impl MarkDetector for FixedMarks {
        fn detect_landmarks(&self, _face: &Image) -> Result<LandmarkSet> {
            LandmarkSet::from_flat(&self.0)
        }
    }

    #[test]
    fn test_trait_object_output_is_normalized() {
        let detector: Box<dyn MarkDetector> = Box::new(FixedMarks(vec![0.5; NUM_FACIAL_LANDMARKS * 2]));
        let marks = detector.detect_landmarks(&Image::new(32, 32)).unwrap();
        assert_eq!(marks.points().len(), 68);
        assert!(marks.iter().all(|p| *p == Point2::new(0.5, 0.5)));
    }

    #[test]
    fn test_short_model_output_is_rejected() {
        let detector = FixedMarks(vec![0.5; 100]);
        assert!(detector.detect_landmarks(&Image::new(32, 32)).is_err());
    }
}
