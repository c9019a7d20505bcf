//! ONNX Runtime implementation of [`FaceComparator`]: SCRFD detection,
//! ArcFace embeddings, cosine distance.

use crate::comparator::{CompareError, FaceComparator};
use crate::detector::FaceDetector;
use crate::image_input::decode_base64_image;
use crate::recognizer::FaceRecognizer;
use crate::types::{CompareSpec, Comparison, Embedding, FaceBox};
use std::path::Path;

/// Embedding models this backend can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionModel {
    ArcFace,
}

impl RecognitionModel {
    /// Look up a model by identifier, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "arcface" => Some(Self::ArcFace),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ArcFace => "ArcFace",
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            Self::ArcFace => "w600k_r50.onnx",
        }
    }

    /// Pretuned cosine-distance threshold behind this backend's own verdict.
    pub fn cosine_threshold(self) -> f64 {
        match self {
            Self::ArcFace => 0.68,
        }
    }
}

/// Face detectors this backend can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorBackend {
    Scrfd,
}

impl DetectorBackend {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "scrfd" => Some(Self::Scrfd),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Scrfd => "scrfd",
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            Self::Scrfd => "det_10g.onnx",
        }
    }
}

/// Comparator backed by local ONNX models.
pub struct OnnxComparator {
    model: RecognitionModel,
    backend: DetectorBackend,
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxComparator {
    /// Resolve both identifiers and load their model files from `model_dir`.
    pub fn load(model_dir: &Path, model: &str, detector: &str) -> Result<Self, CompareError> {
        let model = RecognitionModel::from_name(model)
            .ok_or_else(|| CompareError::UnsupportedModel(model.to_string()))?;
        let backend = DetectorBackend::from_name(detector)
            .ok_or_else(|| CompareError::UnsupportedDetector(detector.to_string()))?;

        let detector = FaceDetector::load(&model_dir.join(backend.file_name()))?;
        let recognizer = FaceRecognizer::load(&model_dir.join(model.file_name()))?;

        Ok(Self {
            model,
            backend,
            detector,
            recognizer,
        })
    }

    pub fn model(&self) -> RecognitionModel {
        self.model
    }

    pub fn backend(&self) -> DetectorBackend {
        self.backend
    }

    fn embed_payload(
        &mut self,
        index: u8,
        payload: &str,
        enforce_detection: bool,
    ) -> Result<Embedding, CompareError> {
        let image = decode_base64_image(payload)
            .map_err(|source| CompareError::Decode { index, source })?;

        let region = match self.detector.detect(&image)?.into_iter().next() {
            Some(face) => face,
            None if enforce_detection => return Err(CompareError::NoFaceDetected(index)),
            None => {
                tracing::debug!(image = index, "no face detected; embedding whole image");
                FaceBox {
                    x: 0.0,
                    y: 0.0,
                    width: image.width() as f32,
                    height: image.height() as f32,
                    confidence: 0.0,
                }
            }
        };

        tracing::debug!(image = index, confidence = region.confidence, "face selected");
        Ok(self.recognizer.embed(&image, &region)?)
    }
}

impl FaceComparator for OnnxComparator {
    fn compare(
        &mut self,
        img1: &str,
        img2: &str,
        spec: &CompareSpec<'_>,
    ) -> Result<Comparison, CompareError> {
        if RecognitionModel::from_name(spec.model) != Some(self.model) {
            return Err(CompareError::UnsupportedModel(spec.model.to_string()));
        }
        if DetectorBackend::from_name(spec.detector) != Some(self.backend) {
            return Err(CompareError::UnsupportedDetector(spec.detector.to_string()));
        }

        let first = self.embed_payload(1, img1, spec.enforce_detection)?;
        let second = self.embed_payload(2, img2, spec.enforce_detection)?;

        let distance = first.cosine_distance(&second);
        Ok(Comparison {
            matched: distance <= self.model.cosine_threshold(),
            distance,
        })
    }
}
