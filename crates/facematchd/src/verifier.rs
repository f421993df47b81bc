//! The face-verification capability the matcher calls once per candidate.

use crate::engine::{EngineError, EngineHandle, ImageSide};
use crate::request::{self, DecodeError};
use facematch_core::{PipelineError, Verification};
use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Why one candidate could not be verified. The scan skips it.
#[derive(Error, Debug)]
pub enum CandidateVerificationError {
    #[error("invalid image URL: {0}")]
    InvalidUrl(String),
    #[error("unsupported image reference scheme: {0} (expected http, https or data)")]
    UnsupportedScheme(String),
    #[error("inline image: {0}")]
    Inline(#[from] DecodeError),
    #[error("fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("{0}")]
    Image(#[source] PipelineError),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error(transparent)]
    Candidate(#[from] CandidateVerificationError),
    /// The captured image is undecodable or holds no face; no candidate can match.
    #[error("no usable face in captured image: {0}")]
    CapturedImage(#[source] PipelineError),
    #[error("captured image unreadable: {0}")]
    CapturedArtifact(#[source] std::io::Error),
    #[error("verification engine unavailable: {0}")]
    Engine(#[source] EngineError),
}

impl From<EngineError> for VerifyError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Image {
                side: ImageSide::Captured,
                source,
            } => VerifyError::CapturedImage(source),
            EngineError::Image {
                side: ImageSide::Candidate,
                source,
            } => VerifyError::Candidate(CandidateVerificationError::Image(source)),
            EngineError::Timeout(budget) => VerifyError::Candidate(CandidateVerificationError::Timeout(budget)),
            other => VerifyError::Engine(other),
        }
    }
}

/// Same-person decision for a captured image on disk and one candidate reference.
pub trait FaceVerifier: Send + Sync + 'static {
    fn verify(
        &self,
        captured: &Path,
        candidate: &str,
    ) -> impl Future<Output = Result<Verification, VerifyError>> + Send;
}

/// Where a candidate image comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageRef {
    Remote(reqwest::Url),
    Inline(Vec<u8>),
}

impl ImageRef {
    /// Accepts `http(s)://` URLs and `data:` URIs. Local paths are refused.
    pub fn parse(reference: &str) -> Result<Self, CandidateVerificationError> {
        let reference = reference.trim();
        if reference.starts_with("data:") {
            return Ok(ImageRef::Inline(request::decode_base64_image(reference)?));
        }

        let url = reqwest::Url::parse(reference)
            .map_err(|e| CandidateVerificationError::InvalidUrl(format!("{reference}: {e}")))?;
        match url.scheme() {
            "http" | "https" => Ok(ImageRef::Remote(url)),
            other => Err(CandidateVerificationError::UnsupportedScheme(other.to_string())),
        }
    }
}

/// Production verifier: fetches the candidate, then hands both images to the engine.
///
/// `verify_timeout` covers the candidate's own work: the fetch plus inference
/// once the engine has dequeued the job. Waiting behind other requests for the
/// engine is not charged to the candidate.
pub struct EngineVerifier {
    engine: EngineHandle,
    client: reqwest::Client,
    verify_timeout: Duration,
}

impl EngineVerifier {
    pub fn new(engine: EngineHandle, fetch_timeout: Duration, verify_timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .user_agent(concat!("facematchd/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            engine,
            client,
            verify_timeout,
        })
    }

    async fn load_candidate(&self, reference: &str) -> Result<Vec<u8>, CandidateVerificationError> {
        match ImageRef::parse(reference)? {
            ImageRef::Inline(bytes) => Ok(bytes),
            ImageRef::Remote(url) => {
                let response = self.client.get(url).send().await?.error_for_status()?;
                let bytes = response.bytes().await?;
                tracing::debug!(candidate = reference, bytes = bytes.len(), "candidate fetched");
                Ok(bytes.to_vec())
            }
        }
    }

    async fn run(&self, captured: &Path, candidate: &str) -> Result<Verification, VerifyError> {
        let captured = tokio::fs::read(captured)
            .await
            .map_err(VerifyError::CapturedArtifact)?;

        let begun = Instant::now();
        let candidate_bytes = tokio::time::timeout(self.verify_timeout, self.load_candidate(candidate))
            .await
            .map_err(|_| CandidateVerificationError::Timeout(self.verify_timeout))??;

        let budget = self.verify_timeout.saturating_sub(begun.elapsed());
        Ok(self.engine.verify(captured, candidate_bytes, budget).await?)
    }
}

impl FaceVerifier for EngineVerifier {
    fn verify(
        &self,
        captured: &Path,
        candidate: &str,
    ) -> impl Future<Output = Result<Verification, VerifyError>> + Send {
        self.run(captured, candidate)
    }
}
