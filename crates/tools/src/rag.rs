//! Lexical corpus search.
//!
//! Token-frequency cosine similarity over the corpus documents. No index is
//! built: corpora are small (interview reference material), so every query
//! scores all documents and returns the top matches.

use std::collections::HashMap;

use intervet_core::Document;
use serde::Serialize;

pub const DEFAULT_TOP_K: usize = 3;
const SNIPPET_CHARS: usize = 500;

/// One corpus hit returned to the model.
#[derive(Debug, Clone, Serialize)]
pub struct RagSearchResult {
    pub document_id: i64,
    pub filename: String,
    pub snippet: String,
    pub score: f64,
}

/// Tokens are runs of Latin or Cyrillic letters, digits, or underscores,
/// lowercased.
fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || ('А'..='я').contains(&c)
}

fn tokenize(text: &str) -> HashMap<String, u32> {
    let mut counts = HashMap::new();
    for token in text
        .to_lowercase()
        .split(|c: char| !is_token_char(c))
        .filter(|t| !t.is_empty())
    {
        *counts.entry(token.to_string()).or_insert(0) += 1;
    }
    counts
}

fn cosine_similarity(a: &HashMap<String, u32>, b: &HashMap<String, u32>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let num: f64 = a
        .iter()
        .filter_map(|(token, &av)| b.get(token).map(|&bv| f64::from(av) * f64::from(bv)))
        .sum();
    let norm = |m: &HashMap<String, u32>| {
        m.values()
            .map(|&v| f64::from(v) * f64::from(v))
            .sum::<f64>()
            .sqrt()
    };
    let denom = norm(a) * norm(b);
    if denom == 0.0 { 0.0 } else { num / denom }
}

fn snippet(content: &str) -> String {
    content.chars().take(SNIPPET_CHARS).collect()
}

/// Score all documents against the query and return the `top_k` best hits.
///
/// Ties keep corpus order (the sort is stable), so identical documents come
/// back in the order they were added.
pub fn search_documents(docs: &[Document], query: &str, top_k: usize) -> Vec<RagSearchResult> {
    let query_tokens = tokenize(query);
    let mut scored: Vec<(&Document, f64)> = docs
        .iter()
        .map(|doc| (doc, cosine_similarity(&query_tokens, &tokenize(&doc.content))))
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));

    scored
        .into_iter()
        .take(top_k)
        .map(|(doc, score)| RagSearchResult {
            document_id: doc.id,
            filename: doc.filename.clone(),
            snippet: snippet(&doc.content),
            score,
        })
        .collect()
}
