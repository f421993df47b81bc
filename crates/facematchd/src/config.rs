use facematch_core::{DetectorBackend, DistanceMetric, RecognitionModel, VerificationPolicy};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server listens on (default: 127.0.0.1:5000).
    pub bind: SocketAddr,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Where captured images are written while a request is processed.
    pub scratch_dir: PathBuf,
    /// Model, detector, metric and threshold used for every comparison.
    pub policy: VerificationPolicy,
    /// HTTP timeout for fetching one candidate image.
    pub fetch_timeout_secs: u64,
    /// Upper bound on fetching plus verifying one candidate.
    pub verify_timeout_secs: u64,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
}

impl Config {
    /// Load configuration from `FACEMATCH_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let metric = match get("FACEMATCH_DISTANCE_METRIC") {
            Some(raw) => raw.parse::<DistanceMetric>().unwrap_or_else(|err| {
                tracing::warn!(%err, "falling back to cosine distance");
                DistanceMetric::Cosine
            }),
            None => DistanceMetric::Cosine,
        };

        let mut policy = VerificationPolicy::new(RecognitionModel::ArcFace, DetectorBackend::Scrfd, metric);
        if let Some(threshold) = get("FACEMATCH_THRESHOLD").and_then(|v| v.parse::<f32>().ok()) {
            policy = policy.with_threshold(threshold);
        }

        Self {
            bind: parse_or(get("FACEMATCH_BIND"), default_bind()),
            model_dir: get("FACEMATCH_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(facematch_core::default_model_dir),
            scratch_dir: get("FACEMATCH_SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            policy,
            fetch_timeout_secs: parse_or(get("FACEMATCH_FETCH_TIMEOUT_SECS"), 30),
            verify_timeout_secs: parse_or(get("FACEMATCH_VERIFY_TIMEOUT_SECS"), 60),
            max_body_bytes: parse_or(get("FACEMATCH_MAX_BODY_BYTES"), DEFAULT_MAX_BODY_BYTES),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout_secs)
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5000))
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_with(&[]);
        assert_eq!(config.bind.to_string(), "127.0.0.1:5000");
        assert_eq!(config.policy, VerificationPolicy::default());
        assert_eq!(config.scratch_dir, std::env::temp_dir());
        assert_eq!(config.fetch_timeout(), Duration::from_secs(30));
        assert_eq!(config.verify_timeout(), Duration::from_secs(60));
        assert_eq!(config.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
    }

    #[test]
    fn test_overrides() {
        let config = config_with(&[
            ("FACEMATCH_BIND", "0.0.0.0:8080"),
            ("FACEMATCH_MODEL_DIR", "/opt/models"),
            ("FACEMATCH_SCRATCH_DIR", "/var/tmp/facematch"),
            ("FACEMATCH_DISTANCE_METRIC", "euclidean_l2"),
            ("FACEMATCH_FETCH_TIMEOUT_SECS", "5"),
        ]);
        assert_eq!(config.bind.port(), 8080);
        assert_eq!(config.model_dir, PathBuf::from("/opt/models"));
        assert_eq!(config.scratch_dir, PathBuf::from("/var/tmp/facematch"));
        assert_eq!(config.policy.metric, DistanceMetric::EuclideanL2);
        assert!((config.policy.threshold - 1.13).abs() < 1e-6);
        assert_eq!(config.fetch_timeout_secs, 5);
    }

    #[test]
    fn test_threshold_override() {
        let config = config_with(&[("FACEMATCH_THRESHOLD", "0.4")]);
        assert_eq!(config.policy.metric, DistanceMetric::Cosine);
        assert!((config.policy.threshold - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_unparsable_values_fall_back() {
        let config = config_with(&[
            ("FACEMATCH_BIND", "not-an-address"),
            ("FACEMATCH_DISTANCE_METRIC", "manhattan"),
            ("FACEMATCH_THRESHOLD", "high"),
            ("FACEMATCH_VERIFY_TIMEOUT_SECS", "-1"),
        ]);
        assert_eq!(config.bind, default_bind());
        assert_eq!(config.policy, VerificationPolicy::default());
        assert_eq!(config.verify_timeout_secs, 60);
    }
}
