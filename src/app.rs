//! Request orchestration: the pose, people and save pipelines.

use crate::{
    codec,
    config::{Config, PeopleConfig},
    constants::{DEFAULT_USER, JPEG_QUALITY, SAVED_IMAGE_EXTENSION},
    direction::{Direction, DirectionClassifier},
    euler,
    face_detection::FaceDetector,
    mark_detection::MarkDetector,
    object_detection::{count_people, ObjectDetector},
    pose_estimation::{FaceModel, PnpSolver, PoseEstimator},
    types::{BoundingBox, EulerAngles, Image},
    utils::{image_conversion::normalize_unit, remap_landmarks},
    Error, Result,
};
use image::{imageops, Rgb};
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[cfg(feature = "onnx")]
use crate::{
    face_detection::ScrfdFaceDetector, mark_detection::OnnxMarkDetector,
    object_detection::OnnxObjectDetector,
};

/// File name of the debug annotation written after each successful pose
const ANNOTATION_FILE_NAME: &str = "pose_annotation.jpg";

/// Annotation box colour
const ANNOTATION_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Loaded models, shared read-only by all requests
#[derive(Clone)]
pub struct Models {
    pub face_detector: Arc<dyn FaceDetector>,
    pub mark_detector: Arc<dyn MarkDetector>,
    pub object_detector: Arc<dyn ObjectDetector>,
    pub face_model: Arc<FaceModel>,
    pub pnp_solver: Arc<dyn PnpSolver>,
}

impl Models {
    /// Load every model named in the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any model file is missing or invalid
    #[cfg(feature = "onnx")]
    pub fn load(config: &Config) -> Result<Self> {
        info!("Loading models");
        let face = &config.face_detection;
        let face_detector = ScrfdFaceDetector::new(
            &config.models.face_detector,
            face.confidence_threshold,
            face.iou_threshold,
            face.bbox_expansion,
        )?;
        let mark_detector = OnnxMarkDetector::new(&config.models.face_landmarks)?;
        let object_detector = OnnxObjectDetector::new(&config.models.object_detector)?;
        let face_model = FaceModel::from_file(&config.models.face_model_3d)?;

        Ok(Self {
            face_detector: Arc::new(face_detector),
            mark_detector: Arc::new(mark_detector),
            object_detector: Arc::new(object_detector),
            face_model: Arc::new(face_model),
            pnp_solver: default_solver(),
        })
    }
}

/// The `PnP` backend selected at build time
#[cfg(feature = "opencv")]
#[must_use]
pub fn default_solver() -> Arc<dyn PnpSolver> {
    Arc::new(crate::pose_estimation::OpenCvPnp)
}

/// The `PnP` backend selected at build time
#[cfg(not(feature = "opencv"))]
#[must_use]
pub fn default_solver() -> Arc<dyn PnpSolver> {
    Arc::new(crate::pose_estimation::IterativePnp::default())
}

/// Result of the pose pipeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PoseOutcome {
    /// No face in the image
    NoFace,
    /// Head pose was estimated
    Estimated {
        direction: Direction,
        angles: EulerAngles,
    },
}

/// Replace path separators so a user id names a single file
#[must_use]
pub fn sanitize_user(user: &str) -> String {
    user.replace(['/', '\\'], "_")
}

/// Directory of saved images, one JPEG per user
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    /// Relative directories resolve against the current working directory
    ///
    /// # Errors
    ///
    /// Returns an error if the working directory cannot be determined
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let dir = if dir.is_absolute() {
            dir
        } else {
            std::env::current_dir()?.join(dir)
        };
        Ok(Self { dir })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `image` as `<dir>/<user>.jpg`, overwriting, and return the path
    ///
    /// # Errors
    ///
    /// Returns [`Error::Filesystem`] if the directory or file cannot be written
    pub fn save(&self, image: &Image, user: &str) -> Result<PathBuf> {
        let path = self
            .dir
            .join(format!("{}.{}", sanitize_user(user), SAVED_IMAGE_EXTENSION));

        fs::create_dir_all(&self.dir).map_err(|source| Error::Filesystem {
            path: self.dir.clone(),
            source,
        })?;
        let bytes = codec::encode_jpeg(image, JPEG_QUALITY)?;
        fs::write(&path, bytes).map_err(|source| Error::Filesystem {
            path: path.clone(),
            source,
        })?;

        info!("Saved image to {}", path.display());
        Ok(path)
    }
}

/// Crop a box that lies inside the image
fn crop(image: &Image, bbox: &BoundingBox) -> Result<Image> {
    let to_u32 = |v: i32| {
        u32::try_from(v).map_err(|_| Error::InvalidInput(format!("Negative crop coordinate {v}")))
    };
    let view = imageops::crop_imm(
        image,
        to_u32(bbox.x1)?,
        to_u32(bbox.y1)?,
        to_u32(bbox.width())?,
        to_u32(bbox.height())?,
    );
    Ok(view.to_image())
}

/// The service's request pipelines over a set of loaded models
pub struct HeadPoseApp {
    models: Models,
    classifier: DirectionClassifier,
    people: PeopleConfig,
    store: ImageStore,
    annotation_dir: Option<PathBuf>,
}

impl HeadPoseApp {
    /// # Errors
    ///
    /// Returns an error if the configured yaw threshold is invalid or the
    /// output directory cannot be resolved
    pub fn new(models: Models, config: &Config) -> Result<Self> {
        let classifier = DirectionClassifier::new(config.pose.yaw_threshold)?;
        let store = ImageStore::new(&config.storage.output_dir)?;
        info!(
            "Pose solver: {}, yaw threshold {}°, saving images to {}",
            models.pnp_solver.name(),
            classifier.threshold(),
            store.dir().display()
        );

        Ok(Self {
            models,
            classifier,
            people: config.people.clone(),
            store,
            annotation_dir: config.pose.annotation_dir.clone(),
        })
    }

    #[must_use]
    pub fn image_store(&self) -> &ImageStore {
        &self.store
    }

    /// Decode a base64 image and estimate the head pose
    ///
    /// # Errors
    ///
    /// Returns an error if decoding, detection or the pose solve fails
    pub fn predict_pose(&self, payload: &str) -> Result<PoseOutcome> {
        let image = codec::decode(payload)?;
        self.estimate_pose(&image)
    }

    /// Estimate the head pose of the face in `image`
    ///
    /// # Errors
    ///
    /// Returns an error if detection or the pose solve fails
    pub fn estimate_pose(&self, image: &Image) -> Result<PoseOutcome> {
        let (width, height) = image.dimensions();

        let Some(detected) = self.models.face_detector.detect_face(image)? else {
            debug!("No face found in {width}x{height} image");
            return Ok(PoseOutcome::NoFace);
        };
        let Some(bbox) = detected.clamp_to(width, height) else {
            debug!("Face box {detected:?} lies outside the image");
            return Ok(PoseOutcome::NoFace);
        };

        let face = crop(image, &bbox)?;
        let marks = self.models.mark_detector.detect_landmarks(&face)?;
        let landmarks = remap_landmarks(&marks, &bbox);

        let estimator = PoseEstimator::new(
            Arc::clone(&self.models.face_model),
            Arc::clone(&self.models.pnp_solver),
            width,
            height,
        );
        let pose = estimator.solve_pose(&landmarks)?;
        let angles = euler::decompose(&pose.rotation);
        let direction = self.classifier.classify(angles.yaw);
        debug!(
            "Pose: yaw {:.2}, pitch {:.2}, roll {:.2} -> {direction}",
            angles.yaw, angles.pitch, angles.roll
        );

        if let Some(dir) = &self.annotation_dir {
            let mut annotated = image.clone();
            estimator.annotate(&mut annotated, &pose, ANNOTATION_COLOR, 2);
            if let Err(e) = write_annotation(dir, &annotated) {
                warn!("Failed to write pose annotation: {e}");
            }
        }

        Ok(PoseOutcome::Estimated { direction, angles })
    }

    /// Decode a base64 image and count the people in it
    ///
    /// # Errors
    ///
    /// Returns an error if decoding or detection fails
    pub fn count_people(&self, payload: &str) -> Result<usize> {
        let image = codec::decode(payload)?;
        let pixels = normalize_unit(&image);
        let detections = self.models.object_detector.detect_objects(&pixels)?;
        let count = count_people(&detections, self.people.person_class_id, self.people.score_threshold);
        debug!("{count} of {} detections are people", detections.len());
        Ok(count)
    }

    /// Decode a base64 image and store it under the user's name
    ///
    /// # Errors
    ///
    /// Returns an error if decoding or writing fails
    pub fn save_image(&self, payload: &str, user: Option<&str>) -> Result<PathBuf> {
        let image = codec::decode(payload)?;
        self.store.save(&image, user.unwrap_or(DEFAULT_USER))
    }
}

fn write_annotation(dir: &Path, image: &Image) -> Result<()> {
    let path = dir.join(ANNOTATION_FILE_NAME);
    fs::create_dir_all(dir).map_err(|source| Error::Filesystem {
        path: dir.to_path_buf(),
        source,
    })?;
    let bytes = codec::encode_jpeg(image, JPEG_QUALITY)?;
    fs::write(&path, bytes).map_err(|source| Error::Filesystem { path, source })?;
    Ok(())
}
