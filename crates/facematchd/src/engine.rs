use facematch_core::{decode_image, Embedding, FacePipeline, PipelineError, Verification, VerificationPolicy};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Which side of a comparison an image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSide {
    Captured,
    Candidate,
}

impl fmt::Display for ImageSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ImageSide::Captured => "captured",
            ImageSide::Candidate => "candidate",
        })
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("model load failed: {0}")]
    Load(#[source] PipelineError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("{side} image: {source}")]
    Image {
        side: ImageSide,
        #[source]
        source: PipelineError,
    },
    #[error("engine thread exited")]
    ChannelClosed,
    #[error("verification exceeded {0:?}")]
    Timeout(Duration),
}

/// Messages sent from request handlers to the engine thread.
pub(crate) enum EngineRequest {
    Verify {
        captured: Vec<u8>,
        candidate: Vec<u8>,
        /// Signalled when the engine picks the job up.
        started: oneshot::Sender<()>,
        reply: oneshot::Sender<Result<Verification, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    #[cfg(test)]
    pub(crate) fn from_sender(tx: mpsc::Sender<EngineRequest>) -> Self {
        Self { tx }
    }

    /// Decode both encoded images, embed the best face of each and decide.
    ///
    /// `budget` starts once the engine dequeues the job; time spent queued
    /// behind other requests is not charged to it.
    pub async fn verify(
        &self,
        captured: Vec<u8>,
        candidate: Vec<u8>,
        budget: Duration,
    ) -> Result<Verification, EngineError> {
        let (started_tx, started_rx) = oneshot::channel();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Verify {
                captured,
                candidate,
                started: started_tx,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;

        started_rx.await.map_err(|_| EngineError::ChannelClosed)?;
        match tokio::time::timeout(budget, reply_rx).await {
            Ok(reply) => reply.map_err(|_| EngineError::ChannelClosed)?,
            Err(_) => Err(EngineError::Timeout(budget)),
        }
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Both ONNX models are loaded before this returns, so a missing or broken
/// model fails startup instead of the first request.
pub fn spawn_engine(model_dir: &Path, policy: VerificationPolicy) -> Result<EngineHandle, EngineError> {
    let mut pipeline = FacePipeline::load(model_dir, policy).map_err(EngineError::Load)?;
    tracing::info!(dir = %model_dir.display(), "models loaded");

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(16);

    std::thread::Builder::new()
        .name("facematch-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Verify {
                        captured,
                        candidate,
                        started,
                        reply,
                    } => {
                        // Requester gave up while queued: skip the work.
                        if started.send(()).is_err() || reply.is_closed() {
                            tracing::debug!("verify: abandoned job dropped");
                            continue;
                        }
                        let result = run_verify(&mut pipeline, &captured, &candidate);
                        // Receiver is gone if the request timed out.
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}

fn embed(pipeline: &mut FacePipeline, bytes: &[u8], side: ImageSide) -> Result<Embedding, EngineError> {
    decode_image(bytes)
        .and_then(|image| pipeline.represent(&image))
        .map_err(|source| EngineError::Image { side, source })
}

/// Captured side first: if it has no usable face, the candidate is never touched.
fn run_verify(pipeline: &mut FacePipeline, captured: &[u8], candidate: &[u8]) -> Result<Verification, EngineError> {
    let probe = embed(pipeline, captured, ImageSide::Captured)?;
    let other = embed(pipeline, candidate, ImageSide::Candidate)?;
    let verification = pipeline.verify(&probe, &other);

    tracing::debug!(
        verified = verification.verified,
        distance = verification.distance,
        threshold = verification.threshold,
        "verify: pair compared"
    );

    Ok(verification)
}
