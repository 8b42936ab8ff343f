/// Caller-visible payloads shared by the HTTP and MCP surfaces.
///
/// Only derived scalars are exposed: the total score and the per-category breakdown.
/// Transient classification distributions never leave the service.
use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetPitchScoreParams {
    /// Startup UUID.
    pub startup_id: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetPitchScoresParams {
    /// Startup UUIDs. Startups without an analysis are omitted from the response.
    pub startup_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SubmitPitchDeckParams {
    /// Caller identity as issued by the auth service.
    pub caller_id: String,
    /// Caller role; only "founder" may submit.
    pub role: String,
    /// Original file name. The extension selects the format (pdf or pptx).
    pub filename: String,
    /// Declared MIME type, if known.
    pub content_type: Option<String>,
    /// File content, standard base64.
    pub content_base64: String,
}

/// Per-category scores, each in the 0-20 range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CategoryBreakdown {
    pub usp: f64,
    pub market: f64,
    pub business_model: f64,
    pub team: f64,
    pub finance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PitchScore {
    pub startup_id: String,
    pub analysis_id: String,
    pub document_id: String,
    pub total: f64,
    pub categories: CategoryBreakdown,
    /// RFC 3339 creation timestamp of the analysis.
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PitchScoreResponse {
    /// `None` when the startup has no analysis yet.
    pub score: Option<PitchScore>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PitchScoresResponse {
    /// Latest score keyed by startup id.
    pub scores: BTreeMap<String, PitchScore>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DocumentInfo {
    pub document_id: String,
    pub format: String,
    pub size_bytes: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SubmitPitchDeckResponse {
    pub document: DocumentInfo,
    pub analysis: PitchScore,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ErrorResponse {
    pub error: String,
}
