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

use crate::llm::contracts::{CapabilityError, CapabilityResult};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, texts: &[String]) -> CapabilityResult<Vec<Vec<f32>>>;
}

#[derive(Debug, Clone)]
pub struct OllamaEmbeddingClient {
    client: Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OllamaEmbeddingClient {
    pub fn new(base_url: &str, model: &str, timeout_seconds: u64) -> Self {
        let timeout = Duration::from_secs(timeout_seconds);
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: base_url.to_string(),
            model: model.to_string(),
            timeout,
        }
    }

    async fn embed_one(&self, text: &str) -> CapabilityResult<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let payload = json!({ "model": self.model, "prompt": text });
        let response = tokio::time::timeout(
            self.timeout,
            self.client
                .post(&url)
                .header("content-type", "application/json")
                .json(&payload)
                .send(),
        )
        .await
        .map_err(|_| CapabilityError::Timeout)?
        .map_err(|e| CapabilityError::Network(format!("Embedding request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(CapabilityError::Provider(format!(
                "Embedding endpoint returned {}",
                response.status()
            )));
        }

        let data: Value = response.json().await.map_err(|e| {
            CapabilityError::Serialisation(format!("Failed to parse embedding response: {e}"))
        })?;
        let vector = data["embedding"]
            .as_array()
            .ok_or_else(|| {
                CapabilityError::Provider("Embedding response carried no vector".to_string())
            })?
            .iter()
            .filter_map(Value::as_f64)
            .map(|v| v as f32)
            .collect::<Vec<f32>>();

        if vector.is_empty() {
            return Err(CapabilityError::Provider(
                "Embedding response carried an empty vector".to_string(),
            ));
        }
        Ok(vector)
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn embed(&self, texts: &[String]) -> CapabilityResult<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed_one(text).await?);
        }
        debug!(count = vectors.len(), model = %self.model, "Embedded texts");
        Ok(vectors)
    }
}
