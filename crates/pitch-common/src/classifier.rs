/// Zero-shot classification engine.
///
/// The engine wraps a heavy, synchronous `ZeroShotModel` (model weights plus an inference
/// runtime). The model is built lazily by a loader closure the first time any caller needs
/// it, exactly once per engine, and then shared read-only by every later call.
///
/// Initialization and inference both run on tokio's blocking pool. Inference concurrency is
/// bounded by a semaphore so a burst of scoring runs cannot starve the blocking pool.
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{error, info};

use crate::error::CommonError;

/// A model that scores free text against label phrases it was never trained on.
///
/// Implementations are CPU-bound and synchronous; the engine never calls them from an
/// async context directly.
pub trait ZeroShotModel: Send + Sync + 'static {
    /// Returns one confidence value per label, in the order of `labels`.
    fn score(&self, text: &str, labels: &[String]) -> Result<Vec<f32>, CommonError>;
}

/// Type-erased model, for services that pick the implementation at startup.
pub type BoxedModel = Box<dyn ZeroShotModel>;

impl ZeroShotModel for BoxedModel {
    fn score(&self, text: &str, labels: &[String]) -> Result<Vec<f32>, CommonError> {
        (**self).score(text, labels)
    }
}

/// Confidence assigned to a single candidate label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub confidence: f32,
}

/// Confidence distribution over a set of candidate labels, in the caller's label order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub scores: Vec<LabelScore>,
}

impl ClassificationResult {
    /// Highest confidence in the distribution, or `0.0` when there are no labels.
    pub fn max_confidence(&self) -> f32 {
        self.scores
            .iter()
            .map(|s| s.confidence)
            .fold(0.0_f32, f32::max)
    }

    pub fn confidence_for(&self, label: &str) -> Option<f32> {
        self.scores
            .iter()
            .find(|s| s.label == label)
            .map(|s| s.confidence)
    }
}

type Loader<M> = dyn Fn() -> Result<M, CommonError> + Send + Sync;

/// Shared, lazily-initialized classification resource.
///
/// Construct once at startup and hand out as `Arc<ClassificationEngine<M>>`.
pub struct ClassificationEngine<M: ZeroShotModel> {
    loader: Arc<Loader<M>>,
    /// Holds the loaded model or the initialization failure. A failure is never retried.
    model: Arc<OnceLock<Result<Arc<M>, String>>>,
    workers: Arc<Semaphore>,
}

impl<M: ZeroShotModel> ClassificationEngine<M> {
    /// Create an engine that will build its model with `loader` on first use.
    ///
    /// `max_workers` bounds the number of concurrent inference calls (minimum 1).
    pub fn new<F>(loader: F, max_workers: usize) -> Self
    where
        F: Fn() -> Result<M, CommonError> + Send + Sync + 'static,
    {
        Self {
            loader: Arc::new(loader),
            model: Arc::new(OnceLock::new()),
            workers: Arc::new(Semaphore::new(max_workers.max(1))),
        }
    }

    /// Whether initialization has already completed (successfully or not).
    pub fn is_initialized(&self) -> bool {
        self.model.get().is_some()
    }

    /// Force initialization now instead of on the first `classify` call.
    pub async fn warm_up(&self) -> Result<(), CommonError> {
        self.model().await.map(|_| ())
    }

    /// Score `text` against `labels`.
    ///
    /// The calling task suspends while inference runs on the blocking pool. Dropping the
    /// returned future does not cancel inference that has already been dispatched.
    pub async fn classify(
        &self,
        text: &str,
        labels: &[String],
    ) -> Result<ClassificationResult, CommonError> {
        if labels.is_empty() {
            return Ok(ClassificationResult::default());
        }

        let model = self.model().await?;
        let permit = Arc::clone(&self.workers)
            .acquire_owned()
            .await
            .map_err(|e| CommonError::ModelUnavailable(format!("worker pool closed: {e}")))?;

        let text = text.to_owned();
        let owned_labels = labels.to_vec();
        let scores = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            model.score(&text, &owned_labels)
        })
        .await
        .map_err(|e| CommonError::Inference(format!("spawn_blocking join error: {e}")))??;

        if scores.len() != labels.len() {
            return Err(CommonError::Inference(format!(
                "model returned {} scores for {} labels",
                scores.len(),
                labels.len()
            )));
        }

        Ok(ClassificationResult {
            scores: labels
                .iter()
                .zip(scores)
                .map(|(label, confidence)| LabelScore {
                    label: label.clone(),
                    confidence,
                })
                .collect(),
        })
    }

    /// Return the shared model, building it on a blocking thread if this is the first use.
    ///
    /// `OnceLock::get_or_init` blocks concurrent initializers until the first one finishes,
    /// and the blocking task runs to completion even if the awaiting caller is dropped.
    async fn model(&self) -> Result<Arc<M>, CommonError> {
        let loaded = match self.model.get() {
            Some(loaded) => loaded.clone(),
            None => {
                let cell = Arc::clone(&self.model);
                let loader = Arc::clone(&self.loader);
                tokio::task::spawn_blocking(move || {
                    cell.get_or_init(|| {
                        info!("initializing classification model");
                        match loader() {
                            Ok(model) => {
                                info!("classification model ready");
                                Ok(Arc::new(model))
                            }
                            Err(e) => {
                                error!(error = %e, "classification model initialization failed");
                                Err(e.to_string())
                            }
                        }
                    })
                    .clone()
                })
                .await
                .map_err(|e| CommonError::ModelInit(format!("spawn_blocking join error: {e}")))?
            }
        };
        loaded.map_err(CommonError::ModelUnavailable)
    }
}
