/// Pitch deck ingestion and score lookup, shared by the HTTP routes and the MCP tools.
use std::collections::HashMap;
use std::fmt::Display;

use bytes::Bytes;
use futures::Stream;
use pitch_common::classifier::BoxedModel;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::ScoreCache;
use crate::error::AppError;
use crate::model::{AnalysisResult, Caller, DocumentFormat, DocumentRef, Role};
use crate::orchestrator::{RunStage, ScoringOrchestrator};
use crate::repository::ScoreRepository;
use crate::store::DocumentStore;

/// A stored deck and the analysis produced from it.
#[derive(Debug, Clone)]
pub struct Submission {
    pub document: DocumentRef,
    pub analysis: AnalysisResult,
}

pub struct PitchService {
    store: DocumentStore,
    repository: ScoreRepository,
    orchestrator: ScoringOrchestrator<BoxedModel>,
    cache: ScoreCache,
}

impl PitchService {
    pub fn new(
        store: DocumentStore,
        repository: ScoreRepository,
        orchestrator: ScoringOrchestrator<BoxedModel>,
        cache: ScoreCache,
    ) -> Self {
        Self {
            store,
            repository,
            orchestrator,
            cache,
        }
    }

    /// Store a founder's deck, score it, and persist the result.
    ///
    /// Role and format are checked before anything is written. A failed scoring run
    /// leaves the stored document in place but never writes an analysis result.
    pub async fn submit_document<S, E>(
        &self,
        caller: Caller,
        filename: &str,
        content_type: Option<&str>,
        stream: S,
    ) -> Result<Submission, AppError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        if caller.role != Role::Founder {
            warn!(caller_id = %caller.id, role = ?caller.role, "upload rejected: not a founder");
            return Err(AppError::Forbidden(
                "only founders can upload pitch decks".to_string(),
            ));
        }

        let format = DocumentFormat::detect(filename, content_type).inspect_err(|e| {
            warn!(caller_id = %caller.id, filename, error = %e, "upload rejected");
        })?;

        let startup_id = self
            .repository
            .startup_for_founder(caller.id)
            .await?
            .ok_or_else(|| AppError::NotFound("startup for founder".to_string()))?;

        let document = self.store.store(caller.id, filename, format, stream).await?;
        self.repository.record_document(&document).await?;

        let analysis = self
            .orchestrator
            .score(&document, startup_id, caller.id)
            .await?;
        let analysis_id = self.repository.save(&analysis).await?;
        self.cache.publish(&analysis).await;

        info!(
            run_id = %analysis_id,
            startup_id = %startup_id,
            document_id = %document.id,
            stage = %RunStage::Persisted,
            total_score = analysis.total_score,
            "pitch deck scored"
        );
        Ok(Submission { document, analysis })
    }

    /// Latest analysis for a startup, `None` when it has never been scored.
    pub async fn get_score(&self, startup_id: Uuid) -> Result<Option<AnalysisResult>, AppError> {
        if let Some(cached) = self.cache.get(startup_id).await {
            return Ok(Some(cached));
        }
        let latest = self.repository.latest_for(startup_id).await?;
        if let Some(result) = &latest {
            self.cache.fill(result).await;
        }
        Ok(latest)
    }

    /// Latest analysis per startup; unscored startups are omitted.
    pub async fn get_scores(
        &self,
        startup_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, AnalysisResult>, AppError> {
        self.repository.latest_for_many(startup_ids).await
    }
}
