use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::DynamicImage;

use crate::detector::{Detection, FaceDetector};
use crate::recognizer::{self, FaceEncoder, FACE_SIZE};

/// Locations of the ONNX models on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelPaths {
    pub detector: PathBuf,
    pub recognizer: PathBuf,
}

/// A detected face together with its embedding.
#[derive(Debug, Clone)]
pub struct FaceEmbedding {
    pub detection: Detection,
    pub embedding: Vec<f32>,
}

/// Full pipeline: detect faces → align → encode
pub struct Pipeline {
    pub detector: FaceDetector,
    pub encoder: FaceEncoder,
}

impl Pipeline {
    pub fn new(models: &ModelPaths, score_threshold: f32, nms_threshold: f32) -> Result<Self> {
        let detector = crate::model::detector_session(&models.detector)?;
        let encoder = crate::model::recognizer_session(&models.recognizer)?;
        Ok(Self {
            detector: FaceDetector::new(detector, score_threshold, nms_threshold),
            encoder: FaceEncoder::new(encoder),
        })
    }

    /// Every face in the image, in detection order (best score first).
    pub fn process_image(&mut self, img: &DynamicImage) -> Result<Vec<FaceEmbedding>> {
        let detections = self.detector.detect(img).context("detecting faces")?;

        let mut faces = Vec::with_capacity(detections.len());
        for (i, detection) in detections.into_iter().enumerate() {
            let crop = recognizer::align_face(img, &detection, FACE_SIZE);
            let embedding = self
                .encoder
                .encode(&crop)
                .with_context(|| format!("encoding face #{}", i))?;
            log::debug!(
                "face #{}: bbox=({:.0},{:.0},{:.0},{:.0}) score={:.3} dim={}",
                i,
                detection.bbox[0],
                detection.bbox[1],
                detection.bbox[2],
                detection.bbox[3],
                detection.score,
                embedding.len()
            );
            faces.push(FaceEmbedding {
                detection,
                embedding,
            });
        }
        Ok(faces)
    }

    /// Decodes the file at `path` and returns one embedding per detected face.
    pub fn analyze_path(&mut self, path: &Path) -> Result<Vec<Vec<f32>>> {
        let img = image::open(path).with_context(|| format!("reading image {}", path.display()))?;
        Ok(self
            .process_image(&img)?
            .into_iter()
            .map(|f| f.embedding)
            .collect())
    }
}
