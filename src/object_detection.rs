//! Multi-object detection and person counting.

use crate::{Error, Result};
use ndarray::Array3;

#[cfg(feature = "onnx")]
use crate::utils::image_conversion::to_nhwc_batch;
#[cfg(feature = "onnx")]
use ndarray::CowArray;
#[cfg(feature = "onnx")]
use ort::{Environment, Session, Value};
#[cfg(feature = "onnx")]
use std::path::Path;
#[cfg(feature = "onnx")]
use std::sync::Arc;

/// One detected object
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectDetection {
    /// Normalized `[ymin, xmin, ymax, xmax]`
    pub bbox: [f32; 4],
    pub class_id: i64,
    pub score: f32,
}

/// Detects objects in a normalized image
pub trait ObjectDetector: Send + Sync {
    /// Run detection on an `(height, width, 3)` array of pixels in `[0, 1]`
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails or the outputs are malformed
    fn detect_objects(&self, pixels: &Array3<f32>) -> Result<Vec<ObjectDetection>>;
}

/// Count detections of `class_id` scoring strictly above `score_threshold`
#[must_use]
pub fn count_people(detections: &[ObjectDetection], class_id: i64, score_threshold: f32) -> usize {
    detections
        .iter()
        .filter(|d| d.class_id == class_id && d.score > score_threshold)
        .count()
}

/// Zip the flat detection outputs of a single-image batch.
///
/// `boxes` holds four values per detection. When `num_detections` is given,
/// only that many leading entries are valid.
///
/// # Errors
///
/// Returns an error if the output lengths disagree
#[allow(clippy::cast_possible_truncation)] // class ids are small integers stored as floats
pub fn assemble_detections(
    boxes: &[f32],
    classes: &[f32],
    scores: &[f32],
    num_detections: Option<usize>,
) -> Result<Vec<ObjectDetection>> {
    if boxes.len() != classes.len() * 4 || classes.len() != scores.len() {
        return Err(Error::ModelDataFormatError(format!(
            "Mismatched detection outputs: {} box values, {} classes, {} scores",
            boxes.len(),
            classes.len(),
            scores.len()
        )));
    }

    let count = num_detections.map_or(scores.len(), |n| n.min(scores.len()));
    Ok(boxes
        .chunks_exact(4)
        .zip(classes)
        .zip(scores)
        .take(count)
        .map(|((b, &class), &score)| ObjectDetection {
            bbox: [b[0], b[1], b[2], b[3]],
            class_id: class as i64,
            score,
        })
        .collect())
}

/// TensorFlow object detection API model (e.g. EfficientDet) exported to ONNX
#[cfg(feature = "onnx")]
pub struct OnnxObjectDetector {
    session: Session,
    boxes_index: usize,
    classes_index: usize,
    scores_index: usize,
    num_detections_index: Option<usize>,
}

#[cfg(feature = "onnx")]
impl OnnxObjectDetector {
    /// Load the detector and locate its named outputs
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be loaded or lacks
    /// `detection_boxes`, `detection_classes` or `detection_scores` outputs
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        log::info!("Initializing object detector with model: {}", model_path.as_ref().display());
        let environment = Arc::new(
            Environment::builder()
                .with_name("object_detector")
                .with_log_level(ort::LoggingLevel::Warning)
                .build()?,
        );

        let session = ort::SessionBuilder::new(&environment)?
            .with_optimization_level(ort::GraphOptimizationLevel::Level3)?
            .with_model_from_file(model_path)?;

        let find = |name: &str| session.outputs.iter().position(|o| o.name == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| Error::ModelOutputError(format!("Model has no '{name}' output")))
        };

        let boxes_index = require("detection_boxes")?;
        let classes_index = require("detection_classes")?;
        let scores_index = require("detection_scores")?;
        let num_detections_index = find("num_detections");

        Ok(Self {
            session,
            boxes_index,
            classes_index,
            scores_index,
            num_detections_index,
        })
    }
}

#[cfg(feature = "onnx")]
impl ObjectDetector for OnnxObjectDetector {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn detect_objects(&self, pixels: &Array3<f32>) -> Result<Vec<ObjectDetection>> {
        let inputs = to_nhwc_batch(pixels.clone());
        let cow_array = CowArray::from(inputs.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;
        let outputs = self.session.run(vec![input_tensor])?;

        let flat = |index: usize| -> Result<Vec<f32>> {
            let value = outputs
                .get(index)
                .ok_or_else(|| Error::ModelOutputError(format!("Missing output {index}")))?;
            let tensor = value.try_extract::<f32>()?;
            let data = tensor.view().iter().copied().collect();
            Ok(data)
        };

        let boxes = flat(self.boxes_index)?;
        let classes = flat(self.classes_index)?;
        let scores = flat(self.scores_index)?;
        let num_detections = match self.num_detections_index {
            Some(index) => flat(index)?.first().map(|&n| n.max(0.0) as usize),
            None => None,
        };

        let detections = assemble_detections(&boxes, &classes, &scores, num_detections)?;
        log::debug!("Object detector returned {} detections", detections.len());
        Ok(detections)
    }
}
