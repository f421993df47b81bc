use crate::verifier::{FaceVerifier, VerifyError};
use std::path::Path;

/// Return the first candidate, in order, that verifies against the captured image.
///
/// Candidate-level failures count as non-matches and the scan moves on.
/// Any other error ends the scan. Ties are decided by position only.
pub async fn find_match<V: FaceVerifier>(
    verifier: &V,
    captured: &Path,
    candidates: &[String],
) -> Result<Option<String>, VerifyError> {
    for (position, candidate) in candidates.iter().enumerate() {
        tracing::debug!(position, candidate = %candidate, "comparing");

        match verifier.verify(captured, candidate).await {
            Ok(v) if v.verified => {
                tracing::info!(position, candidate = %candidate, distance = v.distance, "match found");
                return Ok(Some(candidate.clone()));
            }
            Ok(v) => {
                tracing::debug!(position, distance = v.distance, threshold = v.threshold, "no match");
            }
            Err(VerifyError::Candidate(err)) => {
                tracing::warn!(position, candidate = %candidate, error = %err, "candidate skipped");
            }
            Err(err) => return Err(err),
        }
    }

    tracing::info!(candidates = candidates.len(), "no match found");
    Ok(None)
}
