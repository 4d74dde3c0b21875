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

use crate::llm::contracts::{CapabilityResult, CompletionRequest};
use crate::llm::core::TextGenerator;
use crate::llm::providers::{ApiClient, OllamaChatClient, OllamaGenerateClient};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct CapabilityAdapter {
    model: String,
    preferred: Arc<dyn ApiClient>,
    fallback: Option<Arc<dyn ApiClient>>,
}

impl CapabilityAdapter {
    pub fn new(
        model: &str,
        preferred: Arc<dyn ApiClient>,
        fallback: Option<Arc<dyn ApiClient>>,
    ) -> Self {
        Self {
            model: model.to_string(),
            preferred,
            fallback,
        }
    }

    pub fn ollama(
        base_url: &str,
        model: &str,
        timeout_seconds: u64,
        max_retries: u32,
    ) -> Self {
        let chat = Arc::new(OllamaChatClient::new(
            Some(base_url.to_string()),
            Some(timeout_seconds),
            Some(max_retries),
        ));
        let generate = Arc::new(OllamaGenerateClient::new(
            Some(base_url.to_string()),
            Some(timeout_seconds),
            Some(max_retries),
        ));
        Self::new(model, chat, Some(generate))
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl TextGenerator for CapabilityAdapter {
    async fn complete(&self, prompt: &str) -> CapabilityResult<String> {
        let request = CompletionRequest::from_prompt(&self.model, prompt);
        match self.preferred.send_request(request.clone()).await {
            Ok(response) => {
                debug!(
                    provider = response.provider_used,
                    tokens = response.usage.total_tokens,
                    "Completion received"
                );
                Ok(response.content)
            }
            Err(primary_error) => match &self.fallback {
                Some(fallback) => {
                    warn!(
                        error = %primary_error,
                        preferred = self.preferred.provider_name(),
                        fallback = fallback.provider_name(),
                        "Preferred completion backend failed, falling back"
                    );
                    fallback
                        .send_request(request)
                        .await
                        .map(|response| response.content)
                }
                None => Err(primary_error),
            },
        }
    }

    async fn health_check(&self) -> CapabilityResult<()> {
        match self.preferred.health_check().await {
            Ok(()) => Ok(()),
            Err(e) => match &self.fallback {
                Some(fallback) => fallback.health_check().await,
                None => Err(e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::contracts::{CapabilityError, CompletionResponse, Usage};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct FixedClient {
        name: &'static str,
        fail: bool,
        calls: AtomicUsize,
    }

    impl FixedClient {
        fn new(name: &'static str, fail: bool) -> Self {
            Self {
                name,
                fail,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ApiClient for FixedClient {
        async fn send_request(
            &self,
            request: CompletionRequest,
        ) -> CapabilityResult<CompletionResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CapabilityError::Network("unreachable".to_string()));
            }
            Ok(CompletionResponse {
                id: Uuid::new_v4(),
                request_id: request.id,
                content: format!("reply from {}", self.name),
                model_used: request.model,
                provider_used: self.name.to_string(),
                usage: Usage::default(),
                created_at: Utc::now(),
            })
        }

        fn provider_name(&self) -> &'static str {
            self.name
        }

        async fn health_check(&self) -> CapabilityResult<()> {
            if self.fail {
                Err(CapabilityError::Network("unreachable".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn preferred_backend_answers_when_healthy() {
        let preferred = Arc::new(FixedClient::new("chat", false));
        let fallback = Arc::new(FixedClient::new("generate", false));
        let adapter =
            CapabilityAdapter::new("test-model", preferred.clone(), Some(fallback.clone()));
        let content = adapter.complete("hello").await.unwrap();
        assert_eq!(content, "reply from chat");
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fallback_backend_takes_over_on_failure() {
        let preferred = Arc::new(FixedClient::new("chat", true));
        let fallback = Arc::new(FixedClient::new("generate", false));
        let adapter = CapabilityAdapter::new("test-model", preferred, Some(fallback));
        let content = adapter.complete("hello").await.unwrap();
        assert_eq!(content, "reply from generate");
    }

    #[tokio::test]
    async fn error_propagates_without_fallback() {
        let preferred = Arc::new(FixedClient::new("chat", true));
        let adapter = CapabilityAdapter::new("test-model", preferred, None);
        assert!(adapter.complete("hello").await.is_err());
    }
}
