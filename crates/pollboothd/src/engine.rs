use crate::config::Config;
use pollbooth_core::{
    CompareError, CompareSpec, Comparison, FaceComparator, OnnxComparator, UnavailableComparator,
};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Requests queued ahead of the engine thread before senders wait.
const ENGINE_QUEUE_DEPTH: usize = 16;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Messages sent from request handlers to the engine thread.
enum EngineRequest {
    Compare {
        img1: String,
        img2: String,
        model: String,
        detector: String,
        enforce_detection: bool,
        reply: oneshot::Sender<Result<Comparison, CompareError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Queue one comparison and wait for the engine's reply.
    pub async fn compare(
        &self,
        img1: &str,
        img2: &str,
        spec: &CompareSpec<'_>,
    ) -> Result<Comparison, CompareError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Compare {
                img1: img1.to_string(),
                img2: img2.to_string(),
                model: spec.model.to_string(),
                detector: spec.detector.to_string(),
                enforce_detection: spec.enforce_detection,
                reply: reply_tx,
            })
            .await
            .map_err(|_| CompareError::EngineClosed)?;
        reply_rx.await.map_err(|_| CompareError::EngineClosed)?
    }
}

/// Build the comparator named by the configuration.
///
/// Never fails: when the models cannot be loaded the service still starts,
/// with a comparator that rejects every request as unavailable. The flag
/// reports whether the real backend loaded.
pub fn load_comparator(config: &Config) -> (Box<dyn FaceComparator>, bool) {
    tracing::info!(
        model = %config.verify.model,
        detector = %config.verify.detector,
        dir = %config.model_dir.display(),
        "loading face models"
    );

    match OnnxComparator::load(&config.model_dir, &config.verify.model, &config.verify.detector) {
        Ok(comparator) => {
            tracing::info!(
                model = comparator.model().name(),
                detector = comparator.backend().name(),
                "face models loaded"
            );
            (Box::new(comparator), true)
        }
        Err(err) => {
            let reason = pollbooth_core::comparator::error_chain(&err);
            tracing::error!(error = %reason, "failed to load face models; verification disabled");
            (Box::new(UnavailableComparator::new(reason)), false)
        }
    }
}

/// Spawn the engine on a dedicated OS thread that owns `comparator`.
///
/// Comparisons run one at a time in arrival order. A panicking comparison
/// fails only its own request. The thread exits once every handle has been
/// dropped.
pub fn spawn_engine(mut comparator: Box<dyn FaceComparator>) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(ENGINE_QUEUE_DEPTH);

    std::thread::Builder::new()
        .name("pollbooth-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Compare {
                        img1,
                        img2,
                        model,
                        detector,
                        enforce_detection,
                        reply,
                    } => {
                        let spec = CompareSpec {
                            model: &model,
                            detector: &detector,
                            enforce_detection,
                        };
                        let started = std::time::Instant::now();
                        let result = panic::catch_unwind(AssertUnwindSafe(|| {
                            comparator.compare(&img1, &img2, &spec)
                        }))
                        .unwrap_or_else(|payload| {
                            let message = panic_message(payload.as_ref());
                            tracing::error!(panic = %message, "comparator panicked");
                            Err(CompareError::Aborted(message))
                        });
                        tracing::debug!(
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            ok = result.is_ok(),
                            "comparison finished"
                        );
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
