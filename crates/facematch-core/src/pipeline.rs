//! Detect → align → embed → decide, for one pair of encoded images.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{Embedding, Verification, VerificationPolicy};
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("no face detected")]
    NoFaceDetected,
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Decode an encoded image (JPEG, PNG, ...) into RGB.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, PipelineError> {
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

/// Loaded detector + recognizer bound to a fixed verification policy.
pub struct FacePipeline {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
    policy: VerificationPolicy,
}

impl FacePipeline {
    /// Load both models named by `policy` from `model_dir`.
    pub fn load(model_dir: &Path, policy: VerificationPolicy) -> Result<Self, PipelineError> {
        let detector_path = model_dir.join(policy.detector.model_file());
        let detector = FaceDetector::load(&detector_path.to_string_lossy())?;

        let recognizer_path = model_dir.join(policy.model.model_file());
        let recognizer = FaceRecognizer::load(&recognizer_path.to_string_lossy())?;

        tracing::info!(
            model = policy.model.version(),
            metric = %policy.metric,
            threshold = policy.threshold,
            "face pipeline ready"
        );

        Ok(Self {
            detector,
            recognizer,
            policy,
        })
    }

    pub fn policy(&self) -> &VerificationPolicy {
        &self.policy
    }

    /// Embedding of the most confident face in `image`.
    pub fn represent(&mut self, image: &RgbImage) -> Result<Embedding, PipelineError> {
        let faces = self.detector.detect(image)?;
        let face = faces.first().ok_or(PipelineError::NoFaceDetected)?;
        tracing::debug!(
            faces = faces.len(),
            confidence = face.confidence,
            "represent: best face selected"
        );
        Ok(self.recognizer.extract(image, face)?)
    }

    /// Decide whether two embeddings are the same person under this pipeline's policy.
    pub fn verify(&self, probe: &Embedding, candidate: &Embedding) -> Verification {
        self.policy.decide(probe, candidate)
    }
}
