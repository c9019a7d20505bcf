//! The face comparison capability the decision policy delegates to.

use crate::detector::DetectorError;
use crate::image_input::DecodeError;
use crate::recognizer::RecognizerError;
use crate::types::{CompareSpec, Comparison};
use thiserror::Error;

/// Failures of a comparison. The `Display` text is the summary returned to
/// callers; the `source` chain carries the detail that only goes to logs.
#[derive(Error, Debug)]
pub enum CompareError {
    #[error("image {index} is not a valid base64-encoded image")]
    Decode {
        index: u8,
        #[source]
        source: DecodeError,
    },
    #[error("Face could not be detected in image {0}. Please confirm that the picture is a face photo.")]
    NoFaceDetected(u8),
    #[error("unsupported model: {0}")]
    UnsupportedModel(String),
    #[error("unsupported detector backend: {0}")]
    UnsupportedDetector(String),
    #[error("face model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("face detection failed")]
    Detector(#[from] DetectorError),
    #[error("face embedding failed")]
    Recognizer(#[from] RecognizerError),
    #[error("comparison engine stopped")]
    EngineClosed,
    /// The comparator panicked; the payload message is kept for the logs.
    #[error("comparison aborted")]
    Aborted(String),
}

/// Compares the faces in two encoded images.
///
/// Implementations report their own verdict in [`Comparison::matched`]; the
/// service never accepts it without re-checking the distance.
pub trait FaceComparator: Send {
    fn compare(
        &mut self,
        img1: &str,
        img2: &str,
        spec: &CompareSpec<'_>,
    ) -> Result<Comparison, CompareError>;
}

impl<C: FaceComparator + ?Sized> FaceComparator for Box<C> {
    fn compare(
        &mut self,
        img1: &str,
        img2: &str,
        spec: &CompareSpec<'_>,
    ) -> Result<Comparison, CompareError> {
        (**self).compare(img1, img2, spec)
    }
}

/// Stand-in used when the real backend failed to load at startup.
///
/// Every call fails fast with [`CompareError::ModelUnavailable`].
#[derive(Debug, Clone)]
pub struct UnavailableComparator {
    reason: String,
}

impl UnavailableComparator {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl FaceComparator for UnavailableComparator {
    fn compare(
        &mut self,
        _img1: &str,
        _img2: &str,
        _spec: &CompareSpec<'_>,
    ) -> Result<Comparison, CompareError> {
        Err(CompareError::ModelUnavailable(self.reason.clone()))
    }
}

/// Render an error and its `source` chain as `outer: inner: root`.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
