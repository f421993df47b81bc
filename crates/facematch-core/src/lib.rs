//! facematch-core — Face verification engine.
//!
//! SCRFD for face detection and ArcFace for embeddings, both running on
//! ONNX Runtime, plus the distance metrics and thresholds that turn two
//! embeddings into a same-person decision.

pub mod alignment;
pub mod detector;
pub mod pipeline;
pub mod recognizer;
pub mod types;

use std::path::PathBuf;

pub use detector::FaceDetector;
pub use pipeline::{decode_image, FacePipeline, PipelineError};
pub use recognizer::FaceRecognizer;
pub use types::{
    BoundingBox, DetectorBackend, DistanceMetric, Embedding, RecognitionModel, Verification,
    VerificationPolicy,
};

/// Default ONNX model directory: `$XDG_DATA_HOME/facematch/models`,
/// falling back to `~/.local/share/facematch/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facematch")
        .join("models")
}
