//! ArcFace face recognizer via ONNX Runtime.
//!
//! Embeds a cropped RGB face into a 512-dimensional, L2-normalized vector
//! using the w600k_r50 ArcFace model.

use crate::types::{Embedding, FaceBox};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const ARCFACE_INPUT_SIZE: u32 = 112;
const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5;
const ARCFACE_EMBEDDING_DIM: usize = 512;

/// Extra context kept around a detected box before embedding, per side.
const CROP_MARGIN: f32 = 0.1;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// ArcFace-based face recognizer.
pub struct FaceRecognizer {
    session: Session,
}

impl FaceRecognizer {
    /// Load the ArcFace ONNX model.
    pub fn load(model_path: &Path) -> Result<Self, RecognizerError> {
        if !model_path.exists() {
            return Err(RecognizerError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            "loaded ArcFace model"
        );

        Ok(Self { session })
    }

    /// Embed the face inside `region` of `image`.
    pub fn embed(&mut self, image: &RgbImage, region: &FaceBox) -> Result<Embedding, RecognizerError> {
        let face = crop_face(image, region, CROP_MARGIN);
        let input = preprocess(&face);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.len() != ARCFACE_EMBEDDING_DIM {
            return Err(RecognizerError::InferenceFailed(format!(
                "expected {ARCFACE_EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(Embedding {
            values: l2_normalize(raw),
        })
    }
}

/// Crop `region` grown by `margin` on every side, clamped to the image.
/// A degenerate region falls back to the whole image.
pub fn crop_face(image: &RgbImage, region: &FaceBox, margin: f32) -> RgbImage {
    let (width, height) = image.dimensions();
    let grow_x = region.width * margin;
    let grow_y = region.height * margin;

    let left = (region.x - grow_x).floor().clamp(0.0, width as f32) as u32;
    let top = (region.y - grow_y).floor().clamp(0.0, height as f32) as u32;
    let right = (region.x + region.width + grow_x).ceil().clamp(0.0, width as f32) as u32;
    let bottom = (region.y + region.height + grow_y).ceil().clamp(0.0, height as f32) as u32;

    if right <= left || bottom <= top {
        return image.clone();
    }
    imageops::crop_imm(image, left, top, right - left, bottom - top).to_image()
}

/// Resize a face crop to 112×112 and normalize into a NCHW RGB tensor.
fn preprocess(face: &RgbImage) -> Array4<f32> {
    let size = ARCFACE_INPUT_SIZE;
    let resized = imageops::resize(face, size, size, FilterType::Triangle);

    let mut tensor = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - ARCFACE_MEAN) / ARCFACE_STD;
        }
    }
    tensor
}

fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm = raw.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|v| v / norm).collect()
    } else {
        raw.to_vec()
    }
}
