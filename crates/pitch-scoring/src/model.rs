use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use pitch_common::api::{CategoryBreakdown, DocumentInfo, PitchScore};

/// Evaluation category of a pitch deck.
///
/// Declaration order is the canonical order for iteration and storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    Usp,
    Market,
    BusinessModel,
    Team,
    Finance,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Usp,
        Category::Market,
        Category::BusinessModel,
        Category::Team,
        Category::Finance,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Category::Usp => "USP",
            Category::Market => "Market",
            Category::BusinessModel => "Business Model",
            Category::Team => "Team",
            Category::Finance => "Finance",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A category and the label phrases the classifier scores it with.
#[derive(Debug, Clone, Copy)]
pub struct CategoryDefinition {
    pub category: Category,
    pub labels: &'static [&'static str],
}

impl CategoryDefinition {
    pub fn candidate_labels(&self) -> Vec<String> {
        self.labels.iter().map(|l| l.to_string()).collect()
    }
}

pub const CATEGORY_DEFINITIONS: [CategoryDefinition; 5] = [
    CategoryDefinition {
        category: Category::Usp,
        labels: &["unique selling proposition", "differentiation", "competitive advantage"],
    },
    CategoryDefinition {
        category: Category::Market,
        labels: &["market size", "TAM", "SAM", "SOM", "growth potential"],
    },
    CategoryDefinition {
        category: Category::BusinessModel,
        labels: &["revenue model", "monetization", "pricing strategy"],
    },
    CategoryDefinition {
        category: Category::Team,
        labels: &["founders", "team experience", "leadership"],
    },
    CategoryDefinition {
        category: Category::Finance,
        labels: &["funding", "financial projections", "investment"],
    },
];

/// Accepted pitch deck formats. Anything else is rejected before storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentFormat {
    Pdf,
    /// Office Open XML slide deck (.pptx).
    SlideDeck,
}

const PDF_MIME: &str = "application/pdf";
const PPTX_MIME: &str = "application/vnd.openxmlformats-officedocument.presentationml.presentation";

impl DocumentFormat {
    pub fn extension(self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::SlideDeck => "pptx",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            DocumentFormat::Pdf => PDF_MIME,
            DocumentFormat::SlideDeck => PPTX_MIME,
        }
    }

    pub fn from_extension(ext: &str) -> Result<Self, AppError> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Ok(DocumentFormat::Pdf),
            "pptx" => Ok(DocumentFormat::SlideDeck),
            other => Err(AppError::UnsupportedFormat(format!("'.{other}'"))),
        }
    }

    /// Detect the format of an upload from its file name and declared content type.
    ///
    /// The extension decides. A specific content type that names a different format is a
    /// mismatch; generic types (`application/octet-stream`, missing) are ignored.
    pub fn detect(filename: &str, content_type: Option<&str>) -> Result<Self, AppError> {
        let ext = file_extension(filename)
            .ok_or_else(|| AppError::UnsupportedFormat(format!("'{filename}' has no extension")))?;
        let format = Self::from_extension(ext)?;

        if let Some(declared) = content_type.map(essence) {
            let generic = declared.is_empty()
                || declared == "application/octet-stream"
                || declared == "binary/octet-stream";
            if !generic && declared != format.mime_type() {
                return Err(AppError::UnsupportedFormat(format!(
                    "content type '{declared}' does not match '.{ext}'"
                )));
            }
        }
        Ok(format)
    }

    pub fn as_str(self) -> &'static str {
        self.extension()
    }
}

fn file_extension(filename: &str) -> Option<&str> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext)
}

/// MIME type without parameters, lower-cased.
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// A stored pitch deck. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub path: PathBuf,
    pub format: DocumentFormat,
    pub original_name: String,
    pub size_bytes: u64,
    /// Hex-encoded SHA-256 of the stored bytes.
    pub sha256: String,
    pub created_at: DateTime<Utc>,
}

impl DocumentRef {
    pub fn to_api(&self) -> DocumentInfo {
        DocumentInfo {
            document_id: self.id.to_string(),
            format: self.format.as_str().to_string(),
            size_bytes: self.size_bytes,
            sha256: self.sha256.clone(),
        }
    }
}

/// Per-category scalar scores, keyed by category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryScores(BTreeMap<Category, f64>);

impl CategoryScores {
    pub fn insert(&mut self, category: Category, score: f64) {
        self.0.insert(category, score);
    }

    /// Score for `category`, `0.0` when absent.
    pub fn get(&self, category: Category) -> f64 {
        self.0.get(&category).copied().unwrap_or(0.0)
    }

    pub fn is_complete(&self) -> bool {
        Category::ALL.iter().all(|c| self.0.contains_key(c))
    }

    pub fn sum(&self) -> f64 {
        self.0.values().sum()
    }

    pub fn to_api(&self) -> CategoryBreakdown {
        CategoryBreakdown {
            usp: self.get(Category::Usp),
            market: self.get(Category::Market),
            business_model: self.get(Category::BusinessModel),
            team: self.get(Category::Team),
            finance: self.get(Category::Finance),
        }
    }
}

impl FromIterator<(Category, f64)> for CategoryScores {
    fn from_iter<I: IntoIterator<Item = (Category, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Outcome of one scoring run. Append-only: a re-upload produces a new record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: Uuid,
    pub startup_id: Uuid,
    pub founder_id: Uuid,
    pub document_id: Uuid,
    pub total_score: f64,
    pub category_scores: CategoryScores,
    pub created_at: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn to_api(&self) -> PitchScore {
        PitchScore {
            startup_id: self.startup_id.to_string(),
            analysis_id: self.id.to_string(),
            document_id: self.document_id.to_string(),
            total: self.total_score,
            categories: self.category_scores.to_api(),
            created_at: self.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Founder,
    Investor,
    Other,
}

impl Role {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "founder" => Role::Founder,
            "investor" => Role::Investor,
            _ => Role::Other,
        }
    }
}

/// Identity supplied by the auth collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub id: Uuid,
    pub role: Role,
}

impl Caller {
    pub fn parse(id: &str, role: &str) -> Result<Self, AppError> {
        let id = Uuid::parse_str(id.trim())
            .map_err(|_| AppError::Unauthorized("caller id is not a valid UUID".to_string()))?;
        Ok(Self {
            id,
            role: Role::parse(role),
        })
    }
}

pub fn parse_startup_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::InvalidInput(format!("invalid startup id '{}'", raw.trim())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_category_has_one_definition() {
        let defined: Vec<Category> = CATEGORY_DEFINITIONS.iter().map(|d| d.category).collect();
        assert_eq!(defined, Category::ALL.to_vec());
        assert!(CATEGORY_DEFINITIONS.iter().all(|d| !d.labels.is_empty()));
    }

    #[test]
    fn detect_by_extension() {
        assert_eq!(DocumentFormat::detect("deck.pdf", None).unwrap(), DocumentFormat::Pdf);
        assert_eq!(
            DocumentFormat::detect("Deck.Final.PPTX", Some("application/octet-stream")).unwrap(),
            DocumentFormat::SlideDeck
        );
        assert_eq!(
            DocumentFormat::detect("deck.pdf", Some("application/pdf; charset=binary")).unwrap(),
            DocumentFormat::Pdf
        );
    }

    #[test]
    fn detect_rejects_unknown_or_missing_extension() {
        assert!(matches!(
            DocumentFormat::detect("numbers.csv", Some("text/csv")),
            Err(AppError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            DocumentFormat::detect("deck", None),
            Err(AppError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            DocumentFormat::detect(".pdf", None),
            Err(AppError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn detect_rejects_content_type_mismatch() {
        assert!(matches!(
            DocumentFormat::detect("deck.pdf", Some(PPTX_MIME)),
            Err(AppError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn category_scores_complete_and_sum() {
        let mut scores: CategoryScores = Category::ALL.iter().map(|&c| (c, 10.0)).collect();
        assert!(scores.is_complete());
        assert_eq!(scores.sum(), 50.0);
        scores = CategoryScores::default();
        scores.insert(Category::Team, 4.5);
        assert!(!scores.is_complete());
        assert_eq!(scores.get(Category::Market), 0.0);
        assert_eq!(scores.to_api().team, 4.5);
    }

    #[test]
    fn caller_parse() {
        let id = Uuid::new_v4();
        let caller = Caller::parse(&id.to_string(), "Founder").unwrap();
        assert_eq!(caller.role, Role::Founder);
        assert!(matches!(
            Caller::parse("nope", "founder"),
            Err(AppError::Unauthorized(_))
        ));
    }
}
