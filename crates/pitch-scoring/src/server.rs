use std::collections::BTreeMap;
use std::sync::Arc;

use base64::Engine as _;
use bytes::Bytes;
use rmcp::{
    Json, ServerHandler,
    handler::server::router::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::*,
    tool, tool_handler, tool_router,
};

use pitch_common::api::{
    GetPitchScoreParams, GetPitchScoresParams, PitchScoreResponse, PitchScoresResponse,
    SubmitPitchDeckParams, SubmitPitchDeckResponse,
};

use crate::error::AppError;
use crate::model::{parse_startup_id, Caller};
use crate::service::PitchService;

/// Upper bound on ids accepted by one `get_pitch_scores` call.
const MAX_BATCH_IDS: usize = 500;

#[derive(Clone)]
pub struct PitchScoringServer {
    service: Arc<PitchService>,
    max_upload_bytes: usize,
    tool_router: ToolRouter<PitchScoringServer>,
}

impl PitchScoringServer {
    pub fn new(service: Arc<PitchService>, max_upload_bytes: usize) -> Self {
        Self {
            service,
            max_upload_bytes,
            tool_router: Self::tool_router(),
        }
    }
}

fn tool_error(e: AppError) -> String {
    if !e.is_client_error() {
        tracing::error!(error = %e, "tool call failed");
    }
    e.public_message()
}

#[tool_router]
impl PitchScoringServer {
    #[tool(description = "Get the latest pitch deck score for a startup: total plus the USP, market, business model, team and finance breakdown. Returns score: null when the startup has never been scored.")]
    async fn get_pitch_score(
        &self,
        Parameters(params): Parameters<GetPitchScoreParams>,
    ) -> Result<Json<PitchScoreResponse>, String> {
        let startup_id = parse_startup_id(&params.startup_id).map_err(tool_error)?;
        let score = self
            .service
            .get_score(startup_id)
            .await
            .map_err(tool_error)?;
        Ok(Json(PitchScoreResponse {
            score: score.map(|r| r.to_api()),
        }))
    }

    #[tool(description = "Get the latest pitch deck scores for several startups in one read. Startups without a score are omitted from the result map.")]
    async fn get_pitch_scores(
        &self,
        Parameters(params): Parameters<GetPitchScoresParams>,
    ) -> Result<Json<PitchScoresResponse>, String> {
        if params.startup_ids.is_empty() {
            return Err("startup_ids must not be empty".to_string());
        }
        if params.startup_ids.len() > MAX_BATCH_IDS {
            return Err(format!("at most {MAX_BATCH_IDS} startup_ids per call"));
        }
        let ids = params
            .startup_ids
            .iter()
            .map(|raw| parse_startup_id(raw))
            .collect::<Result<Vec<_>, _>>()
            .map_err(tool_error)?;

        let scores: BTreeMap<String, _> = self
            .service
            .get_scores(&ids)
            .await
            .map_err(tool_error)?
            .into_iter()
            .map(|(id, result)| (id.to_string(), result.to_api()))
            .collect();
        Ok(Json(PitchScoresResponse { scores }))
    }

    #[tool(description = "Submit a founder's pitch deck (PDF or PPTX, base64-encoded) for scoring. The deck is stored, scored across five categories, and the new score becomes the startup's latest.")]
    async fn submit_pitch_deck(
        &self,
        Parameters(params): Parameters<SubmitPitchDeckParams>,
    ) -> Result<Json<SubmitPitchDeckResponse>, String> {
        let caller = Caller::parse(&params.caller_id, &params.role).map_err(tool_error)?;
        let filename = params.filename.trim().to_string();
        if filename.is_empty() {
            return Err("filename must not be empty".to_string());
        }
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(params.content_base64.trim())
            .map_err(|e| format!("content_base64 is not valid base64: {e}"))?;
        if bytes.len() > self.max_upload_bytes {
            return Err(format!(
                "document exceeds the {} byte upload limit",
                self.max_upload_bytes
            ));
        }

        let body = futures::stream::iter([Ok::<_, std::convert::Infallible>(Bytes::from(bytes))]);
        let submission = self
            .service
            .submit_document(caller, &filename, params.content_type.as_deref(), body)
            .await
            .map_err(tool_error)?;
        Ok(Json(SubmitPitchDeckResponse {
            document: submission.document.to_api(),
            analysis: submission.analysis.to_api(),
        }))
    }
}

#[tool_handler]
impl ServerHandler for PitchScoringServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_06_18,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "pitch-scoring".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Pitch deck scoring server. Use get_pitch_score or get_pitch_scores to read the \
latest score of startups; use submit_pitch_deck to score a new deck on behalf of a founder. \
Totals are the mean category score times 100, so they range from 0 to 2000."
                    .to_string(),
            ),
        }
    }
}
