use crate::{
    types::{BoundingBox, Image},
    utils::safe_cast::f32_to_i32,
    Result,
};
use ndarray::Array2;

#[cfg(feature = "onnx")]
use crate::{
    constants::{IMAGE_NORMALIZATION_OFFSET, IMAGE_NORMALIZATION_SCALE},
    utils::{
        image_conversion::{rgb_to_array3_f32, to_nchw_batch},
        refine_box,
        safe_cast::u32_to_i32,
    },
    Error,
};
#[cfg(feature = "onnx")]
use image::imageops::{self, FilterType};
#[cfg(feature = "onnx")]
use ndarray::{Array4, CowArray};
#[cfg(feature = "onnx")]
use ort::{Environment, Session, Value};
#[cfg(feature = "onnx")]
use std::path::Path;
#[cfg(feature = "onnx")]
use std::sync::Arc;

/// Finds the face to analyse in a full image
pub trait FaceDetector: Send + Sync {
    /// Locate one face, or `None` when the image contains no face.
    ///
    /// The returned box is in full-image pixels and may extend past the
    /// image border; callers clamp it before cropping.
    ///
    /// # Errors
    ///
    /// Returns an error if model inference fails
    fn detect_face(&self, image: &Image) -> Result<Option<BoundingBox>>;
}

/// Face detection result with floating point corners `[x1, y1, x2, y2]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceDetection {
    pub bbox: [f32; 4],
    pub score: f32,
}

impl FaceDetection {
    /// Truncate the corners to integer pixels
    ///
    /// # Errors
    ///
    /// Returns an error if a corner is not finite or the box is empty
    pub fn to_bounding_box(&self) -> Result<BoundingBox> {
        let [x1, y1, x2, y2] = self.bbox;
        BoundingBox::new(f32_to_i32(x1)?, f32_to_i32(y1)?, f32_to_i32(x2)?, f32_to_i32(y2)?)
    }

    fn area(&self) -> f32 {
        let [x1, y1, x2, y2] = self.bbox;
        (x2 - x1 + 1.0) * (y2 - y1 + 1.0)
    }

    /// Intersection over union, pixel-inclusive
    #[must_use]
    pub fn iou(&self, other: &Self) -> f32 {
        let x1 = self.bbox[0].max(other.bbox[0]);
        let y1 = self.bbox[1].max(other.bbox[1]);
        let x2 = self.bbox[2].min(other.bbox[2]);
        let y2 = self.bbox[3].min(other.bbox[3]);

        let w = (x2 - x1 + 1.0).max(0.0);
        let h = (y2 - y1 + 1.0).max(0.0);
        let inter = w * h;
        inter / (self.area() + other.area() - inter)
    }
}

/// Anchor centers `(x, y)` for one stride of a `height` × `width` feature map
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn anchor_centers(height: usize, width: usize, stride: usize, num_anchors: usize) -> Array2<f32> {
    let num_anchors = num_anchors.max(1);
    Array2::from_shape_fn((height * width * num_anchors, 2), |(i, axis)| {
        let cell = i / num_anchors;
        let (y, x) = (cell / width, cell % width);
        if axis == 0 {
            (x * stride) as f32
        } else {
            (y * stride) as f32
        }
    })
}

/// Decode `(left, top, right, bottom)` distances from anchor centers into corners
#[must_use]
pub fn distance_to_bbox(points: &Array2<f32>, distances: &Array2<f32>) -> Array2<f32> {
    Array2::from_shape_fn((points.nrows(), 4), |(i, c)| match c {
        0 => points[[i, 0]] - distances[[i, 0]],
        1 => points[[i, 1]] - distances[[i, 1]],
        2 => points[[i, 0]] + distances[[i, 2]],
        _ => points[[i, 1]] + distances[[i, 3]],
    })
}

/// Greedy non-maximum suppression. Output is sorted by descending score.
#[must_use]
pub fn nms(mut detections: Vec<FaceDetection>, iou_threshold: f32) -> Vec<FaceDetection> {
    detections.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut keep: Vec<FaceDetection> = Vec::new();
    for candidate in detections {
        if keep.iter().all(|kept| kept.iou(&candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

/// Default SCRFD input size when the model has dynamic dimensions
#[cfg(feature = "onnx")]
const DEFAULT_SCRFD_INPUT_SIZE: u32 = 640;

/// SCRFD face detector using ONNX Runtime
#[cfg(feature = "onnx")]
pub struct ScrfdFaceDetector {
    session: Session,
    input_size: (u32, u32),
    conf_threshold: f32,
    nms_threshold: f32,
    box_shift: f32,
    num_anchors: usize,
    strides: Vec<usize>,
    offset: usize,
}

#[cfg(feature = "onnx")]
impl ScrfdFaceDetector {
    /// Create a face detector from an ONNX model file
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The ONNX model file cannot be loaded
    /// - The model has no inputs
    pub fn new<P: AsRef<Path>>(model_path: P, conf_threshold: f32, nms_threshold: f32, box_shift: f32) -> Result<Self> {
        log::info!("Initializing face detector with model: {}", model_path.as_ref().display());
        let environment = Arc::new(
            Environment::builder()
                .with_name("face_detector")
                .with_log_level(ort::LoggingLevel::Warning)
                .build()?,
        );

        let session = ort::SessionBuilder::new(&environment)?
            .with_optimization_level(ort::GraphOptimizationLevel::Level3)?
            .with_model_from_file(model_path)?;

        let input_meta = session
            .inputs
            .first()
            .ok_or_else(|| Error::ModelInputError("Model has no inputs".to_string()))?;

        // [batch, channels, height, width], possibly dynamic
        let dim = |i: usize| {
            input_meta
                .dimensions
                .get(i)
                .copied()
                .flatten()
                .unwrap_or(DEFAULT_SCRFD_INPUT_SIZE)
        };
        let input_size = (dim(3), dim(2));

        let num_outputs = session.outputs.len();
        let (offset, strides, num_anchors) = match num_outputs {
            6 | 9 => (3, vec![8, 16, 32], 2),
            10 | 15 => (5, vec![8, 16, 32, 64, 128], 1),
            _ => {
                log::warn!("Unknown model configuration with {num_outputs} outputs, using defaults");
                (3, vec![8, 16, 32], 2)
            }
        };

        Ok(Self {
            session,
            input_size,
            conf_threshold,
            nms_threshold,
            box_shift,
            num_anchors,
            strides,
            offset,
        })
    }

    /// Detect all faces, sorted by descending score, in full-image coordinates
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails or the outputs have an unexpected shape
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn detect_faces(&self, image: &Image) -> Result<Vec<FaceDetection>> {
        let (img_width, img_height) = image.dimensions();
        if img_width == 0 || img_height == 0 {
            return Ok(Vec::new());
        }

        // Letterbox into the model input, keeping aspect ratio
        let (input_width, input_height) = self.input_size;
        let ratio_img = img_height as f32 / img_width as f32;
        let ratio_model = input_height as f32 / input_width as f32;
        let (new_width, new_height) = if ratio_img > ratio_model {
            ((input_height as f32 / ratio_img) as u32, input_height)
        } else {
            (input_width, (input_width as f32 * ratio_img) as u32)
        };
        let (new_width, new_height) = (new_width.max(1), new_height.max(1));
        let det_scale = new_height as f32 / img_height as f32;

        let resized = imageops::resize(image, new_width, new_height, FilterType::Triangle);
        let mut canvas = Image::new(input_width, input_height);
        imageops::replace(&mut canvas, &resized, 0, 0);

        let tensor = to_nchw_batch(rgb_to_array3_f32(
            &canvas,
            IMAGE_NORMALIZATION_OFFSET,
            IMAGE_NORMALIZATION_SCALE,
        ));
        let candidates = self
            .forward(tensor)?
            .into_iter()
            .map(|d| FaceDetection {
                bbox: d.bbox.map(|v| v / det_scale),
                score: d.score,
            })
            .collect();

        Ok(nms(candidates, self.nms_threshold))
    }

    /// Run the model and decode all anchors scoring at least the confidence threshold
    fn forward(&self, inputs: Array4<f32>) -> Result<Vec<FaceDetection>> {
        let input_height = inputs.shape()[2];
        let input_width = inputs.shape()[3];

        let cow_array = CowArray::from(inputs.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;
        let outputs = self.session.run(vec![input_tensor])?;

        let mut detections = Vec::new();
        for (idx, &stride) in self.strides.iter().enumerate() {
            let score_output = outputs
                .get(idx)
                .ok_or_else(|| Error::ModelOutputError(format!("Missing score output {idx}")))?
                .try_extract::<f32>()?;
            let scores: Vec<f32> = score_output.view().iter().copied().collect();

            let bbox_output = outputs
                .get(idx + self.offset)
                .ok_or_else(|| Error::ModelOutputError(format!("Missing bbox output {}", idx + self.offset)))?
                .try_extract::<f32>()?;
            #[allow(clippy::cast_precision_loss)]
            let bbox_data: Vec<f32> = bbox_output.view().iter().map(|&x| x * stride as f32).collect();

            let centers = anchor_centers(input_height / stride, input_width / stride, stride, self.num_anchors);
            if scores.len() != centers.nrows() || bbox_data.len() != centers.nrows() * 4 {
                return Err(Error::ModelDataFormatError(format!(
                    "Stride {stride}: {} scores and {} box values for {} anchors",
                    scores.len(),
                    bbox_data.len(),
                    centers.nrows()
                )));
            }
            let distances = Array2::from_shape_vec((centers.nrows(), 4), bbox_data)
                .map_err(|e| Error::ModelDataFormatError(format!("Failed to reshape bbox: {e}")))?;
            let boxes = distance_to_bbox(&centers, &distances);

            detections.extend(
                scores
                    .iter()
                    .enumerate()
                    .filter(|&(_, &score)| score >= self.conf_threshold)
                    .map(|(i, &score)| FaceDetection {
                        bbox: [boxes[[i, 0]], boxes[[i, 1]], boxes[[i, 2]], boxes[[i, 3]]],
                        score,
                    }),
            );
        }

        Ok(detections)
    }
}

#[cfg(feature = "onnx")]
impl FaceDetector for ScrfdFaceDetector {
    fn detect_face(&self, image: &Image) -> Result<Option<BoundingBox>> {
        let Some(best) = self.detect_faces(image)?.into_iter().next() else {
            return Ok(None);
        };
        log::debug!("Face detected with score {:.3}: {:?}", best.score, best.bbox);

        let bbox = match best.to_bounding_box() {
            Ok(bbox) => bbox,
            Err(e) => {
                log::warn!("Discarding unusable face box: {e}");
                return Ok(None);
            }
        };
        let (width, height) = image.dimensions();
        Ok(Some(refine_box(&bbox, u32_to_i32(width)?, u32_to_i32(height)?, self.box_shift)))
    }
}
