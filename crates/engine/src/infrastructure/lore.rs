//! Keyword-overlap lore retrieval.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;
use tokio::fs;

use crate::infrastructure::ports::{MemoryPort, MemorySnippet, ServiceError};

/// One lore entry as stored in the lore file.
#[derive(Debug, Clone, Deserialize)]
pub struct LoreEntry {
    #[serde(default)]
    pub source: String,
    pub text: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Read-only semantic memory backed by a JSON array of [`LoreEntry`].
///
/// Nothing the turn loop does writes here, so rewinds never touch it.
#[derive(Debug, Default)]
pub struct LoreMemory {
    entries: Vec<(LoreEntry, BTreeSet<String>)>,
}

impl LoreMemory {
    pub fn new(entries: Vec<LoreEntry>) -> Self {
        let entries = entries
            .into_iter()
            .map(|entry| {
                let mut terms = tokenize(&entry.text);
                terms.extend(entry.keywords.iter().flat_map(|k| tokenize(k)));
                (entry, terms)
            })
            .collect();
        Self { entries }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub async fn load(path: &Path) -> Result<Self, ServiceError> {
        let content = fs::read_to_string(path).await.map_err(|e| {
            ServiceError::Unavailable(format!("cannot read lore file {}: {e}", path.display()))
        })?;
        let entries: Vec<LoreEntry> = serde_json::from_str(&content)
            .map_err(|e| ServiceError::InvalidResponse(format!("invalid lore file: {e}")))?;
        tracing::info!(path = %path.display(), entries = entries.len(), "Loaded lore");
        Ok(Self::new(entries))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Lowercased alphanumeric words of three letters or more.
fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 3)
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl MemoryPort for LoreMemory {
    async fn retrieve(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<MemorySnippet>, ServiceError> {
        let query_terms = tokenize(query);
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut ranked: Vec<MemorySnippet> = self
            .entries
            .iter()
            .filter_map(|(entry, terms)| {
                let overlap = terms.intersection(&query_terms).count();
                (overlap > 0).then(|| MemorySnippet {
                    source: entry.source.clone(),
                    text: entry.text.clone(),
                    score: overlap as f32 / query_terms.len() as f32,
                })
            })
            .collect();

        // Stable sort keeps file order among equal scores.
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked.truncate(limit);
        Ok(ranked)
    }
}
