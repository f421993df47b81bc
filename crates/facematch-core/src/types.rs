use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    /// Cosine similarity in [-1, 1]. Higher = more similar.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let (dot, norm_a, norm_b) = self.values.iter().zip(other.values.iter()).fold(
            (0.0f32, 0.0f32, 0.0f32),
            |(dot, na, nb), (a, b)| (dot + a * b, na + a * a, nb + b * b),
        );

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 {
            dot / denom
        } else {
            0.0
        }
    }

    /// Euclidean distance between the raw vectors.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        euclidean(&self.values, &other.values)
    }

    /// Distance under `metric`. Lower = more similar.
    pub fn distance(&self, other: &Embedding, metric: DistanceMetric) -> f32 {
        match metric {
            DistanceMetric::Cosine => 1.0 - self.similarity(other),
            DistanceMetric::Euclidean => self.euclidean_distance(other),
            DistanceMetric::EuclideanL2 => euclidean(&l2_normalize(&self.values), &l2_normalize(&other.values)),
        }
    }
}

fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

pub(crate) fn l2_normalize(values: &[f32]) -> Vec<f32> {
    let norm = values.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        values.iter().map(|x| x / norm).collect()
    } else {
        values.to_vec()
    }
}

/// Distance metric used to compare two embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    Cosine,
    Euclidean,
    EuclideanL2,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::EuclideanL2 => "euclidean_l2",
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown distance metric: {0} (expected cosine, euclidean or euclidean_l2)")]
pub struct UnknownMetric(pub String);

impl FromStr for DistanceMetric {
    type Err = UnknownMetric;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "euclidean" => Ok(DistanceMetric::Euclidean),
            "euclidean_l2" | "euclidean-l2" => Ok(DistanceMetric::EuclideanL2),
            other => Err(UnknownMetric(other.to_string())),
        }
    }
}

/// Face recognition (embedding) model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionModel {
    /// InsightFace ArcFace, ResNet-50 trained on WebFace600K.
    #[serde(rename = "arcface")]
    ArcFace,
}

impl RecognitionModel {
    pub fn model_file(&self) -> &'static str {
        match self {
            RecognitionModel::ArcFace => "w600k_r50.onnx",
        }
    }

    pub fn version(&self) -> &'static str {
        match self {
            RecognitionModel::ArcFace => "w600k_r50",
        }
    }

    /// Default decision threshold for this model under `metric`.
    ///
    /// Embeddings from [`FaceRecognizer`](crate::FaceRecognizer) are unit
    /// length, so plain euclidean distance lives in [0, 2] and shares the
    /// L2 threshold.
    pub fn default_threshold(&self, metric: DistanceMetric) -> f32 {
        match (self, metric) {
            (RecognitionModel::ArcFace, DistanceMetric::Cosine) => 0.68,
            (RecognitionModel::ArcFace, DistanceMetric::Euclidean) => 1.13,
            (RecognitionModel::ArcFace, DistanceMetric::EuclideanL2) => 1.13,
        }
    }
}

/// Face detection backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorBackend {
    /// InsightFace SCRFD-10GF with five-point landmarks.
    Scrfd,
}

impl DetectorBackend {
    pub fn model_file(&self) -> &'static str {
        match self {
            DetectorBackend::Scrfd => "det_10g.onnx",
        }
    }
}

/// Fixed verification policy: which models run and how a pair is decided.
///
/// Built once at startup. Requests never change it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VerificationPolicy {
    pub model: RecognitionModel,
    pub detector: DetectorBackend,
    pub metric: DistanceMetric,
    pub threshold: f32,
}

impl VerificationPolicy {
    /// Policy with the model's default threshold for `metric`.
    pub fn new(model: RecognitionModel, detector: DetectorBackend, metric: DistanceMetric) -> Self {
        Self {
            model,
            detector,
            metric,
            threshold: model.default_threshold(metric),
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Decide whether two embeddings belong to the same person.
    pub fn decide(&self, probe: &Embedding, candidate: &Embedding) -> Verification {
        let distance = probe.distance(candidate, self.metric);
        Verification {
            verified: distance <= self.threshold,
            distance,
            threshold: self.threshold,
        }
    }
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        Self::new(RecognitionModel::ArcFace, DetectorBackend::Scrfd, DistanceMetric::Cosine)
    }
}

/// Outcome of verifying one pair of face images.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub verified: bool,
    pub distance: f32,
    pub threshold: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: &[f32]) -> Embedding {
        Embedding { values: values.to_vec(), model_version: None }
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = emb(&[1.0, 0.0, 0.0]);
        assert!((a.similarity(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = emb(&[0.0, 0.0]);
        let b = emb(&[1.0, 0.0]);
        assert_eq!(a.similarity(&b), 0.0);
    }

    #[test]
    fn test_cosine_distance_range() {
        let a = emb(&[1.0, 0.0]);
        assert!(a.distance(&emb(&[2.0, 0.0]), DistanceMetric::Cosine).abs() < 1e-6);
        assert!((a.distance(&emb(&[0.0, 1.0]), DistanceMetric::Cosine) - 1.0).abs() < 1e-6);
        assert!((a.distance(&emb(&[-1.0, 0.0]), DistanceMetric::Cosine) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_l2_ignores_magnitude() {
        let a = emb(&[3.0, 0.0]);
        let b = emb(&[10.0, 0.0]);
        assert!((a.distance(&b, DistanceMetric::Euclidean) - 7.0).abs() < 1e-6);
        assert!(a.distance(&b, DistanceMetric::EuclideanL2).abs() < 1e-6);
    }

    #[test]
    fn test_default_policy() {
        let policy = VerificationPolicy::default();
        assert_eq!(policy.model, RecognitionModel::ArcFace);
        assert_eq!(policy.detector, DetectorBackend::Scrfd);
        assert_eq!(policy.metric, DistanceMetric::Cosine);
        assert!((policy.threshold - 0.68).abs() < 1e-6);
    }

    #[test]
    fn test_policy_threshold_follows_metric() {
        let policy = VerificationPolicy::new(
            RecognitionModel::ArcFace,
            DetectorBackend::Scrfd,
            DistanceMetric::EuclideanL2,
        );
        assert!((policy.threshold - 1.13).abs() < 1e-6);
    }

    #[test]
    fn test_decide_boundary_is_inclusive() {
        let policy = VerificationPolicy::default().with_threshold(1.0);
        let a = emb(&[1.0, 0.0]);
        // Orthogonal: cosine distance exactly 1.0
        let result = policy.decide(&a, &emb(&[0.0, 1.0]));
        assert!(result.verified);
        assert!((result.distance - 1.0).abs() < 1e-6);

        let result = policy.decide(&a, &emb(&[-1.0, 0.0]));
        assert!(!result.verified);
        assert_eq!(result.threshold, 1.0);
    }

    #[test]
    fn test_opposite_faces_never_verified() {
        let a = emb(&l2_normalize(&[1.0, 0.0, 0.0]));
        let b = emb(&l2_normalize(&[-1.0, 0.0, 0.0]));
        for metric in [DistanceMetric::Cosine, DistanceMetric::Euclidean, DistanceMetric::EuclideanL2] {
            let policy = VerificationPolicy::new(RecognitionModel::ArcFace, DetectorBackend::Scrfd, metric);
            let result = policy.decide(&a, &b);
            assert!(!result.verified, "{metric}: distance {} <= {}", result.distance, result.threshold);
        }
    }

    #[test]
    fn test_unit_embeddings_agree_across_euclidean_metrics() {
        let a = emb(&l2_normalize(&[0.6, 0.8, 0.0]));
        let b = emb(&l2_normalize(&[0.0, 0.6, 0.8]));
        let plain = VerificationPolicy::new(RecognitionModel::ArcFace, DetectorBackend::Scrfd, DistanceMetric::Euclidean);
        let l2 = VerificationPolicy::new(RecognitionModel::ArcFace, DetectorBackend::Scrfd, DistanceMetric::EuclideanL2);
        assert_eq!(plain.decide(&a, &b).verified, l2.decide(&a, &b).verified);
        assert!((plain.decide(&a, &b).distance - l2.decide(&a, &b).distance).abs() < 1e-6);
        assert!(plain.decide(&a, &a).verified);
    }

    #[test]
    fn test_metric_from_str() {
        assert_eq!("cosine".parse::<DistanceMetric>(), Ok(DistanceMetric::Cosine));
        assert_eq!(" Euclidean ".parse::<DistanceMetric>(), Ok(DistanceMetric::Euclidean));
        assert_eq!("euclidean-l2".parse::<DistanceMetric>(), Ok(DistanceMetric::EuclideanL2));
        assert!("manhattan".parse::<DistanceMetric>().is_err());
    }

    #[test]
    fn test_policy_serializes_snake_case() {
        let value = serde_json::to_value(VerificationPolicy::default()).unwrap();
        assert_eq!(value["model"], "arcface");
        assert_eq!(value["detector"], "scrfd");
        assert_eq!(value["metric"], "cosine");
    }
}
