/// Embedding-backed zero-shot model built on fastembed.
///
/// Zero-shot scoring works by comparing the document against one hypothesis sentence per
/// candidate label in embedding space. The nomic-embed-text-v1.5 model uses task-prefixed
/// inputs:
/// - Documents: "search_document: {text}"
/// - Queries: "search_query: {text}"
///
/// Long documents are split into passages; a label's similarity is its best match over all
/// passages. Similarities are turned into a confidence distribution with a temperature
/// softmax, so the confidences of one call sum to 1.
use crate::classifier::ZeroShotModel;
use crate::error::CommonError;

/// Passage length in characters. Roughly 512 tokens of English prose.
const DEFAULT_PASSAGE_CHARS: usize = 2_000;
const EMBED_BATCH_SIZE: usize = 4;

#[derive(Debug, Clone)]
pub struct ZeroShotOptions {
    /// Softmax temperature; lower values sharpen the distribution.
    pub temperature: f32,
    pub passage_chars: usize,
    pub show_download_progress: bool,
}

impl Default for ZeroShotOptions {
    fn default() -> Self {
        Self {
            temperature: 0.05,
            passage_chars: DEFAULT_PASSAGE_CHARS,
            show_download_progress: true,
        }
    }
}

/// Zero-shot classifier over fastembed's `TextEmbedding`.
pub struct EmbeddingZeroShot {
    model: fastembed::TextEmbedding,
    options: ZeroShotOptions,
}

impl EmbeddingZeroShot {
    /// Load the embedding model (nomic-embed-text-v1.5).
    ///
    /// This downloads the model on first run (~300MB) and is synchronous; call it from a
    /// blocking context such as the `ClassificationEngine` loader.
    pub fn load(options: ZeroShotOptions) -> Result<Self, CommonError> {
        let init = fastembed::InitOptions::new(fastembed::EmbeddingModel::NomicEmbedTextV15)
            .with_show_download_progress(options.show_download_progress);
        let model = fastembed::TextEmbedding::try_new(init)
            .map_err(|e| CommonError::ModelInit(format!("{e}")))?;
        Ok(Self { model, options })
    }
}

impl ZeroShotModel for EmbeddingZeroShot {
    fn score(&self, text: &str, labels: &[String]) -> Result<Vec<f32>, CommonError> {
        let passages: Vec<String> = split_passages(text, self.options.passage_chars)
            .into_iter()
            .map(|p| format!("search_document: {p}"))
            .collect();
        if passages.is_empty() {
            return Err(CommonError::Inference("no text to classify".to_string()));
        }

        let hypotheses: Vec<String> = labels
            .iter()
            .map(|l| format!("search_query: {}", hypothesis(l)))
            .collect();

        let passage_vectors = self
            .model
            .embed(passages, Some(EMBED_BATCH_SIZE))
            .map_err(|e| CommonError::Inference(format!("passage embedding failed: {e}")))?;
        let label_vectors = self
            .model
            .embed(hypotheses, None)
            .map_err(|e| CommonError::Inference(format!("label embedding failed: {e}")))?;

        let similarities: Vec<f32> = label_vectors
            .iter()
            .map(|label| {
                passage_vectors
                    .iter()
                    .map(|passage| cosine_similarity(label, passage))
                    .fold(f32::MIN, f32::max)
            })
            .collect();

        Ok(softmax(&similarities, self.options.temperature))
    }
}

fn hypothesis(label: &str) -> String {
    format!("This pitch deck is about {label}.")
}

/// Split text into passages of at most `max_chars` characters, breaking on whitespace.
///
/// A single word longer than `max_chars` becomes its own passage.
fn split_passages(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut passages = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if current_len > 0 && current_len + 1 + word_len > max_chars {
            passages.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }
    if !current.is_empty() {
        passages.push(current);
    }
    passages
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn softmax(values: &[f32], temperature: f32) -> Vec<f32> {
    if values.is_empty() {
        return Vec::new();
    }
    let temperature = if temperature > 0.0 { temperature } else { 1.0 };
    let max = values.iter().copied().fold(f32::MIN, f32::max);
    let exps: Vec<f32> = values
        .iter()
        .map(|v| ((v - max) / temperature).exp())
        .collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_passages_respects_limit() {
        let text = "alpha beta gamma delta epsilon";
        let passages = split_passages(text, 11);
        assert_eq!(passages, vec!["alpha beta", "gamma delta", "epsilon"]);
        assert!(passages.iter().all(|p| p.chars().count() <= 11));
    }

    #[test]
    fn split_passages_ignores_blank_text() {
        assert!(split_passages(" \n\t ", 100).is_empty());
    }

    #[test]
    fn split_passages_keeps_oversized_word() {
        let passages = split_passages("short supercalifragilistic end", 5);
        assert_eq!(passages, vec!["short", "supercalifragilistic", "end"]);
    }

    #[test]
    fn cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn softmax_sums_to_one_and_preserves_order() {
        let probs = softmax(&[0.2, 0.5, 0.1], 0.05);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(probs[1] > probs[0] && probs[0] > probs[2]);
    }

    #[test]
    fn softmax_falls_back_on_bad_temperature() {
        let probs = softmax(&[1.0, 1.0], 0.0);
        assert!((probs[0] - 0.5).abs() < 1e-6);
    }

    /// Runs the real model. Downloads weights on first run.
    #[test]
    #[ignore]
    fn real_model_prefers_relevant_label() {
        let model = EmbeddingZeroShot::load(ZeroShotOptions::default()).expect("load model");
        let labels = vec!["market size".to_string(), "leadership".to_string()];
        let scores = model
            .score(
                "The total addressable market is $40B and growing 12% per year.",
                &labels,
            )
            .expect("score");
        assert!(scores[0] > scores[1], "scores: {scores:?}");
    }
}
