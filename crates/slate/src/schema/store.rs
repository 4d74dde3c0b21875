// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use crate::llm::embeddings::EmbeddingClient;
use crate::schema::descriptor::ColumnDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedColumn {
    pub name: String,
    pub description: String,
    pub example: String,
    pub score: f32,
}

pub struct SchemaStore {
    descriptors: Vec<ColumnDescriptor>,
    by_name: HashMap<String, usize>,
    embeddings: Option<Vec<Vec<f32>>>,
    embedder: Option<Arc<dyn EmbeddingClient>>,
}

impl SchemaStore {
    pub fn new(descriptors: Vec<ColumnDescriptor>) -> Self {
        let by_name = descriptors
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name.clone(), i))
            .collect();
        Self {
            descriptors,
            by_name,
            embeddings: None,
            embedder: None,
        }
    }

    pub async fn with_embeddings(
        descriptors: Vec<ColumnDescriptor>,
        embedder: Arc<dyn EmbeddingClient>,
    ) -> Self {
        let mut store = Self::new(descriptors);
        let texts: Vec<String> = store
            .descriptors
            .iter()
            .map(ColumnDescriptor::searchable_text)
            .collect();
        match embedder.embed(&texts).await {
            Ok(vectors) if vectors.len() == store.descriptors.len() => {
                info!(
                    columns = vectors.len(),
                    "Schema index built with embeddings"
                );
                store.embeddings = Some(vectors);
                store.embedder = Some(embedder);
            }
            Ok(vectors) => {
                warn!(
                    expected = store.descriptors.len(),
                    received = vectors.len(),
                    "Embedding backend returned a partial index, using lexical ranking"
                );
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "Embedding backend unavailable, schema index degrades to lexical ranking"
                );
            }
        }
        store
    }

    pub async fn rank(&self, query: &str, top_k: usize) -> Vec<RankedColumn> {
        if let (Some(embeddings), Some(embedder)) = (&self.embeddings, &self.embedder) {
            match embedder.embed(&[query.to_string()]).await {
                Ok(mut vectors) if !vectors.is_empty() => {
                    let query_vector = vectors.remove(0);
                    return self.rank_by_cosine(&query_vector, embeddings, top_k);
                }
                Ok(_) => warn!("Embedding backend returned no query vector"),
                Err(e) => warn!(error = %e, "Query embedding failed, using lexical ranking"),
            }
        }
        self.rank_lexical(query, top_k)
    }

    fn rank_by_cosine(
        &self,
        query_vector: &[f32],
        embeddings: &[Vec<f32>],
        top_k: usize,
    ) -> Vec<RankedColumn> {
        let mut scored: Vec<(usize, f32)> = embeddings
            .iter()
            .enumerate()
            .map(|(i, v)| (i, cosine_similarity(query_vector, v)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        debug!(candidates = scored.len(), "Ranked columns by cosine similarity");
        scored
            .into_iter()
            .take(top_k)
            .map(|(i, score)| self.ranked(i, score))
            .collect()
    }

    fn rank_lexical(&self, query: &str, top_k: usize) -> Vec<RankedColumn> {
        let query_tokens = tokenise(query);
        if query_tokens.is_empty() {
            return Vec::new();
        }
        let mut scored: Vec<(usize, f32)> = self
            .descriptors
            .iter()
            .enumerate()
            .map(|(i, descriptor)| {
                let text_tokens = tokenise(&descriptor.searchable_text());
                let name_tokens = tokenise(&descriptor.name);
                let mut hits = 0usize;
                for token in &query_tokens {
                    if name_tokens.contains(token) {
                        hits += 2;
                    } else if text_tokens.contains(token) {
                        hits += 1;
                    }
                }
                (i, hits as f32 / (query_tokens.len() as f32 * 2.0))
            })
            .filter(|(_, score)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(top_k)
            .map(|(i, score)| self.ranked(i, score))
            .collect()
    }

    fn ranked(&self, index: usize, score: f32) -> RankedColumn {
        let descriptor = &self.descriptors[index];
        RankedColumn {
            name: descriptor.name.clone(),
            description: descriptor.description.clone(),
            example: descriptor.example.clone(),
            score,
        }
    }

    pub fn descriptors(&self) -> &[ColumnDescriptor] {
        &self.descriptors
    }

    pub fn descriptor(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.by_name.get(name).map(|&i| &self.descriptors[i])
    }

    pub fn column_names(&self) -> Vec<String> {
        self.descriptors.iter().map(|d| d.name.clone()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

fn tokenise(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
