use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// Error text returned when either image is absent or empty.
pub const MISSING_IMAGES: &str = "Missing base64 images";

/// Message returned when a comparison ran but did not pass the policy.
pub const MISMATCH_MESSAGE: &str = "Face mismatch or low similarity";

/// Bounding box for a detected face, in source image pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl FaceBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection-over-union with another box.
    pub fn iou(&self, other: &FaceBox) -> f32 {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = (self.x + self.width).min(other.x + other.width);
        let bottom = (self.y + self.height).min(other.y + other.height);

        let overlap = (right - left).max(0.0) * (bottom - top).max(0.0);
        let union = self.area() + other.area() - overlap;
        if union > 0.0 {
            overlap / union
        } else {
            0.0
        }
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    /// Cosine similarity in [-1, 1]. Zero when either vector has no magnitude.
    pub fn similarity(&self, other: &Embedding) -> f64 {
        let (dot, norm_a, norm_b) = self.values.iter().zip(&other.values).fold(
            (0.0f64, 0.0f64, 0.0f64),
            |(dot, na, nb), (&a, &b)| {
                let (a, b) = (f64::from(a), f64::from(b));
                (dot + a * b, na + a * a, nb + b * b)
            },
        );

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 {
            dot / denom
        } else {
            0.0
        }
    }

    /// Cosine distance `1 - similarity`, never below zero. Smaller = more similar.
    pub fn cosine_distance(&self, other: &Embedding) -> f64 {
        (1.0 - self.similarity(other)).max(0.0)
    }
}

/// What the comparator is asked to use for one comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompareSpec<'a> {
    pub model: &'a str,
    pub detector: &'a str,
    /// Fail when either image has no detectable face.
    pub enforce_detection: bool,
}

/// Raw verdict of a comparator, before the service applies its own threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comparison {
    pub matched: bool,
    pub distance: f64,
}

/// Body of a verification request.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct VerificationRequest {
    #[serde(default, rename = "img1_base64", alias = "img1")]
    pub img1: Option<String>,
    #[serde(default, rename = "img2_base64", alias = "img2")]
    pub img2: Option<String>,
}

impl VerificationRequest {
    pub fn new(img1: impl Into<String>, img2: impl Into<String>) -> Self {
        Self {
            img1: Some(img1.into()),
            img2: Some(img2.into()),
        }
    }

    /// Parse a raw request body.
    ///
    /// Anything that is not a JSON object with string image fields yields an
    /// empty request, which then fails validation as missing images.
    pub fn from_body(body: &[u8]) -> Self {
        match serde_json::from_slice::<serde_json::Value>(body) {
            Ok(value @ serde_json::Value::Object(_)) => {
                serde_json::from_value(value).unwrap_or_default()
            }
            _ => Self::default(),
        }
    }

    /// Both image payloads, if both are present and non-blank.
    pub fn images(&self) -> Option<(&str, &str)> {
        fn present(img: &Option<String>) -> Option<&str> {
            img.as_deref().filter(|s| !s.trim().is_empty())
        }
        Some((present(&self.img1)?, present(&self.img2)?))
    }
}

/// Caller-visible outcome class of a verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyStatus {
    Ok,
    BadRequest,
    Unauthorized,
    InternalError,
}

impl VerifyStatus {
    pub fn http_code(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::BadRequest => 400,
            Self::Unauthorized => 401,
            Self::InternalError => 500,
        }
    }
}

/// Response body of a verification. Exactly one shape is ever populated.
#[derive(Debug, Clone, PartialEq)]
pub enum VerificationResult {
    Verified {
        distance: f64,
        threshold: f64,
        model: String,
    },
    /// Comparison ran but the policy rejected it. `distance` is `None` when
    /// the comparator produced a non-finite value.
    Mismatch {
        distance: Option<f64>,
        threshold: f64,
    },
    Failed {
        error: String,
    },
}

impl VerificationResult {
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified { .. })
    }
}

impl Serialize for VerificationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Verified {
                distance,
                threshold,
                model,
            } => {
                let mut map = serializer.serialize_map(Some(4))?;
                map.serialize_entry("verified", &true)?;
                map.serialize_entry("distance", distance)?;
                map.serialize_entry("threshold", threshold)?;
                map.serialize_entry("model", model)?;
                map.end()
            }
            Self::Mismatch {
                distance,
                threshold,
            } => {
                let mut map = serializer.serialize_map(Some(4))?;
                map.serialize_entry("verified", &false)?;
                map.serialize_entry("distance", distance)?;
                map.serialize_entry("threshold", threshold)?;
                map.serialize_entry("message", MISMATCH_MESSAGE)?;
                map.end()
            }
            Self::Failed { error } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("verified", &false)?;
                map.serialize_entry("error", error)?;
                map.end()
            }
        }
    }
}

/// A verification result together with its status.
#[derive(Debug, Clone, PartialEq)]
pub struct Verification {
    pub status: VerifyStatus,
    pub result: VerificationResult,
}

impl Verification {
    pub fn missing_images() -> Self {
        Self {
            status: VerifyStatus::BadRequest,
            result: VerificationResult::Failed {
                error: MISSING_IMAGES.into(),
            },
        }
    }

    pub fn fault(summary: impl Into<String>) -> Self {
        Self {
            status: VerifyStatus::InternalError,
            result: VerificationResult::Failed {
                error: summary.into(),
            },
        }
    }
}
