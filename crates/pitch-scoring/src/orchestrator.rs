/// Scoring runs: extract a stored deck, classify it once per category, aggregate.
///
/// Category classifications are independent and run concurrently, one task per category.
/// Results are gathered as they complete and merged by category, never by completion order.
/// The first failing category aborts the rest of the run.
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use pitch_common::classifier::{ClassificationEngine, ZeroShotModel};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::extract;
use crate::model::{
    AnalysisResult, Category, CategoryScores, DocumentRef, CATEGORY_DEFINITIONS,
};

/// Scale applied to a category's maximum label confidence.
const CATEGORY_SCALE: f64 = 20.0;
/// Scale applied to the category mean to form the total.
const TOTAL_SCALE: f64 = 100.0;

/// Lifecycle of a single scoring run. Transitions only move forward.
///
/// Extraction, classification and aggregation failures all end in `Failed`; the error
/// logged with it says which stage broke. `Persisted` is logged by the ingestion service
/// once the result is saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Extracting,
    Classifying,
    Aggregating,
    Completed,
    Persisted,
    Failed,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStage::Extracting => "extracting",
            RunStage::Classifying => "classifying",
            RunStage::Aggregating => "aggregating",
            RunStage::Completed => "completed",
            RunStage::Persisted => "persisted",
            RunStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

pub struct ScoringOrchestrator<M: ZeroShotModel> {
    engine: Arc<ClassificationEngine<M>>,
}

impl<M: ZeroShotModel> Clone for ScoringOrchestrator<M> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
        }
    }
}

impl<M: ZeroShotModel> ScoringOrchestrator<M> {
    pub fn new(engine: Arc<ClassificationEngine<M>>) -> Self {
        Self { engine }
    }

    /// Score a stored document for `startup_id`.
    ///
    /// Returns a complete result (all five categories plus the total) or an error; never a
    /// partial result. The result is not persisted here.
    pub async fn score(
        &self,
        doc: &DocumentRef,
        startup_id: Uuid,
        founder_id: Uuid,
    ) -> Result<AnalysisResult, AppError> {
        let run_id = Uuid::new_v4();
        let outcome = self.run(run_id, doc, startup_id, founder_id).await;
        if let Err(e) = &outcome {
            warn!(run_id = %run_id, document_id = %doc.id, stage = %RunStage::Failed, error = %e, "scoring run failed");
        }
        outcome
    }

    async fn run(
        &self,
        run_id: Uuid,
        doc: &DocumentRef,
        startup_id: Uuid,
        founder_id: Uuid,
    ) -> Result<AnalysisResult, AppError> {
        info!(run_id = %run_id, document_id = %doc.id, stage = %RunStage::Extracting, "scoring run started");
        let text = extract::extract_text(doc).await?;
        if text.trim().is_empty() {
            return Err(AppError::EmptyContent);
        }

        debug!(run_id = %run_id, stage = %RunStage::Classifying, chars = text.len());
        let category_scores = self.classify_categories(Arc::from(text)).await?;

        debug!(run_id = %run_id, stage = %RunStage::Aggregating);
        let total_score = total_score(&category_scores);

        info!(
            run_id = %run_id,
            document_id = %doc.id,
            startup_id = %startup_id,
            stage = %RunStage::Completed,
            total_score,
            "scoring run finished"
        );
        Ok(AnalysisResult {
            id: run_id,
            startup_id,
            founder_id,
            document_id: doc.id,
            total_score,
            category_scores,
            created_at: Utc::now(),
        })
    }

    async fn classify_categories(&self, text: Arc<str>) -> Result<CategoryScores, AppError> {
        let mut tasks = JoinSet::new();
        for definition in CATEGORY_DEFINITIONS {
            let engine = Arc::clone(&self.engine);
            let text = Arc::clone(&text);
            tasks.spawn(async move {
                let labels = definition.candidate_labels();
                let result = engine.classify(&text, &labels).await;
                (definition.category, result)
            });
        }

        // Returning early drops the JoinSet, which aborts the categories still in flight.
        let mut scores = CategoryScores::default();
        while let Some(joined) = tasks.join_next().await {
            let (category, result) = joined
                .map_err(|e| AppError::Classification(format!("category task failed: {e}")))?;
            let classification =
                result.map_err(|e| AppError::Classification(format!("{category}: {e}")))?;
            let score = category_score(classification.max_confidence());
            debug!(category = %category, score, "category scored");
            scores.insert(category, score);
        }

        if !scores.is_complete() {
            return Err(AppError::Classification(
                "not every category produced a score".to_string(),
            ));
        }
        Ok(scores)
    }
}

pub fn category_score(max_confidence: f32) -> f64 {
    round2(f64::from(max_confidence) * CATEGORY_SCALE)
}

/// Sum of category scores over the category count, times 100. With five 0-20 scores
/// this ranges up to 2000.
pub fn total_score(scores: &CategoryScores) -> f64 {
    round2(scores.sum() / Category::ALL.len() as f64 * TOTAL_SCALE)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}
