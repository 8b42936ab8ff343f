use tracing::{debug, warn};

use crate::error::AppError;
use crate::model::{DocumentFormat, DocumentRef};
use crate::slides;

/// Turns the bytes of a stored document into plain text.
///
/// Implementations are synchronous and CPU-bound; callers run them on the blocking pool.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> Result<String, AppError>;
}

/// PDF text extractor using the pdf-extract crate.
/// Handles digital PDFs with embedded text layers; page texts are joined with newlines.
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, AppError> {
        let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
            .map_err(|e| AppError::Extraction(format!("pdf parsing failed: {e}")))?;
        Ok(pages.join("\n"))
    }
}

pub struct SlideDeckExtractor;

impl TextExtractor for SlideDeckExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, AppError> {
        slides::extract_slide_deck(bytes)
    }
}

pub fn extractor_for(format: DocumentFormat) -> &'static dyn TextExtractor {
    match format {
        DocumentFormat::Pdf => &PdfTextExtractor,
        DocumentFormat::SlideDeck => &SlideDeckExtractor,
    }
}

/// Extract the full text of a stored document.
///
/// Returns an empty string for a document with no text layer; deciding what to do with
/// that is up to the caller. Parser panics are reported as extraction failures.
pub async fn extract_text(doc: &DocumentRef) -> Result<String, AppError> {
    let bytes = tokio::fs::read(&doc.path)
        .await
        .map_err(|e| AppError::Storage(format!("read {}: {e}", doc.path.display())))?;

    let format = doc.format;
    let text = tokio::task::spawn_blocking(move || extractor_for(format).extract(&bytes))
        .await
        .map_err(|e| {
            warn!(document_id = %doc.id, error = %e, "extractor task failed");
            AppError::Extraction(format!("extractor aborted: {e}"))
        })??;

    if text.trim().is_empty() {
        return Ok(String::new());
    }
    debug!(document_id = %doc.id, chars = text.len(), "text extracted");
    Ok(text)
}
