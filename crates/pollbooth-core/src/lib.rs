//! pollbooth-core — Face verification for the polling booth.
//!
//! The decision policy ([`verify`]) delegates the actual comparison to a
//! [`FaceComparator`] and never trusts its verdict without re-checking the
//! distance against the service threshold. [`OnnxComparator`] is the bundled
//! backend: SCRFD detection and ArcFace embeddings via ONNX Runtime.

pub mod comparator;
pub mod decision;
pub mod detector;
pub mod image_input;
pub mod onnx;
pub mod recognizer;
pub mod types;

use std::path::PathBuf;

pub use comparator::{CompareError, FaceComparator, UnavailableComparator};
pub use decision::{conclude, decide, require_images, verify, VerifyConfig};
pub use onnx::{DetectorBackend, OnnxComparator, RecognitionModel};
pub use types::{
    CompareSpec, Comparison, Embedding, FaceBox, Verification, VerificationRequest,
    VerificationResult, VerifyStatus,
};

/// Default ONNX model directory: `$XDG_DATA_HOME/pollbooth/models`, falling
/// back to `~/.local/share/pollbooth/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("pollbooth/models")
}
