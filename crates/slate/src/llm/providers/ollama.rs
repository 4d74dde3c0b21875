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

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::ApiClient;
use crate::llm::contracts::{
    CapabilityError, CapabilityResult, CompletionRequest, CompletionResponse, Usage,
};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_TIMEOUT_SECONDS: u64 = 120;
const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct OllamaChatClient {
    client: Client,
    base_url: String,
    timeout: Duration,
    max_retries: u32,
}

impl OllamaChatClient {
    pub fn new(
        base_url: Option<String>,
        timeout_seconds: Option<u64>,
        max_retries: Option<u32>,
    ) -> Self {
        let timeout = Duration::from_secs(timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS));
        Self {
            client: build_http_client(timeout),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            timeout,
            max_retries: max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
        }
    }

    fn build_payload(&self, request: &CompletionRequest) -> Value {
        let mut payload = json!({
            "model": request.model,
            "messages": request.messages.iter().map(|msg| {
                json!({
                    "role": msg.role,
                    "content": msg.content
                })
            }).collect::<Vec<_>>(),
            "stream": false
        });
        apply_options(&mut payload, request);
        payload
    }

    fn parse_response(
        &self,
        response_data: Value,
        request: &CompletionRequest,
    ) -> CapabilityResult<CompletionResponse> {
        let content = response_data["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                CapabilityError::Provider(
                    "Failed to extract content from Ollama chat response".to_string(),
                )
            })?
            .to_string();
        Ok(assemble_response(
            content,
            request,
            "ollama-chat",
            &response_data,
        ))
    }
}

#[async_trait]
impl ApiClient for OllamaChatClient {
    async fn send_request(
        &self,
        request: CompletionRequest,
    ) -> CapabilityResult<CompletionResponse> {
        let payload = self.build_payload(&request);
        let response_data = execute_with_retry(
            &self.client,
            &self.base_url,
            "/api/chat",
            self.timeout,
            self.max_retries,
            payload,
        )
        .await?;
        self.parse_response(response_data, &request)
    }

    fn provider_name(&self) -> &'static str {
        "ollama-chat"
    }

    async fn health_check(&self) -> CapabilityResult<()> {
        health_check_tags(&self.client, &self.base_url).await
    }
}

#[derive(Debug, Clone)]
pub struct OllamaGenerateClient {
    client: Client,
    base_url: String,
    timeout: Duration,
    max_retries: u32,
}

impl OllamaGenerateClient {
    pub fn new(
        base_url: Option<String>,
        timeout_seconds: Option<u64>,
        max_retries: Option<u32>,
    ) -> Self {
        let timeout = Duration::from_secs(timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS));
        Self {
            client: build_http_client(timeout),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            timeout,
            max_retries: max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
        }
    }

    fn build_payload(&self, request: &CompletionRequest) -> Value {
        let mut payload = json!({
            "model": request.model,
            "prompt": request.rendered_prompt(),
            "stream": false
        });
        apply_options(&mut payload, request);
        payload
    }

    fn parse_response(
        &self,
        response_data: Value,
        request: &CompletionRequest,
    ) -> CapabilityResult<CompletionResponse> {
        let content = response_data["response"]
            .as_str()
            .ok_or_else(|| {
                CapabilityError::Provider(
                    "Failed to extract content from Ollama generate response".to_string(),
                )
            })?
            .to_string();
        Ok(assemble_response(
            content,
            request,
            "ollama-generate",
            &response_data,
        ))
    }
}

#[async_trait]
impl ApiClient for OllamaGenerateClient {
    async fn send_request(
        &self,
        request: CompletionRequest,
    ) -> CapabilityResult<CompletionResponse> {
        let payload = self.build_payload(&request);
        let response_data = execute_with_retry(
            &self.client,
            &self.base_url,
            "/api/generate",
            self.timeout,
            self.max_retries,
            payload,
        )
        .await?;
        self.parse_response(response_data, &request)
    }

    fn provider_name(&self) -> &'static str {
        "ollama-generate"
    }

    async fn health_check(&self) -> CapabilityResult<()> {
        health_check_tags(&self.client, &self.base_url).await
    }
}

fn build_http_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

fn apply_options(payload: &mut Value, request: &CompletionRequest) {
    if let Some(max_tokens) = request.max_tokens {
        payload["options"] = json!({ "num_predict": max_tokens });
    }
    if let Some(temperature) = request.temperature {
        if payload["options"].is_null() {
            payload["options"] = json!({});
        }
        payload["options"]["temperature"] = json!(temperature);
    }
}

fn assemble_response(
    content: String,
    request: &CompletionRequest,
    provider: &str,
    response_data: &Value,
) -> CompletionResponse {
    let prompt_tokens = response_data["prompt_eval_count"].as_u64().unwrap_or(0) as u32;
    let completion_tokens = response_data["eval_count"].as_u64().unwrap_or(0) as u32;
    CompletionResponse {
        id: Uuid::new_v4(),
        request_id: request.id,
        content,
        model_used: request.model.clone(),
        provider_used: provider.to_string(),
        usage: Usage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        },
        created_at: Utc::now(),
    }
}

async fn execute_with_retry(
    client: &Client,
    base_url: &str,
    endpoint: &str,
    timeout: Duration,
    max_retries: u32,
    payload: Value,
) -> CapabilityResult<Value> {
    let mut last_error = None;

    for attempt in 0..=max_retries {
        debug!(
            attempt = attempt + 1,
            max_retries = max_retries + 1,
            endpoint,
            "Sending request to Ollama API"
        );

        let url = format!("{base_url}{endpoint}");
        let response = tokio::time::timeout(
            timeout,
            client
                .post(&url)
                .header("content-type", "application/json")
                .json(&payload)
                .send(),
        )
        .await;

        match response {
            Ok(Ok(resp)) => {
                let status = resp.status();
                info!("Received response from Ollama API: {}", status);

                if status.is_success() {
                    match resp.json::<Value>().await {
                        Ok(data) => {
                            debug!("Successfully parsed Ollama response");
                            return Ok(data);
                        }
                        Err(e) => {
                            last_error = Some(CapabilityError::Serialisation(format!(
                                "Failed to parse JSON response: {e}"
                            )));
                        }
                    }
                } else {
                    let error_body = resp.text().await.unwrap_or_default();
                    last_error = Some(CapabilityError::Provider(format!(
                        "Ollama API error {status}: {error_body}"
                    )));

                    if status.is_client_error() {
                        break;
                    }
                }
            }
            Ok(Err(e)) => {
                last_error = Some(CapabilityError::Network(format!("Request failed: {e}")));

                if attempt < max_retries {
                    let wait_time = Duration::from_secs(2_u64.pow(attempt.min(3)));
                    tokio::time::sleep(wait_time).await;
                }
            }
            Err(_) => {
                warn!("Request to Ollama API timed out after {:?}", timeout);
                last_error = Some(CapabilityError::Timeout);
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| CapabilityError::Provider("Unknown transport error".to_string())))
}

async fn health_check_tags(client: &Client, base_url: &str) -> CapabilityResult<()> {
    let url = format!("{base_url}/api/tags");
    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| CapabilityError::Network(format!("Failed to connect to Ollama: {e}")))?;

    if !response.status().is_success() {
        return Err(CapabilityError::Provider(format!(
            "Ollama health check failed: {}",
            response.status()
        )));
    }

    let models_data: Value = response
        .json()
        .await
        .map_err(|e| CapabilityError::Serialisation(format!("Failed to parse models response: {e}")))?;

    match models_data["models"].as_array() {
        Some(models) if !models.is_empty() => {
            debug!("Ollama connected with {} models available", models.len());
            Ok(())
        }
        Some(_) => {
            warn!("Ollama is running but no models are available");
            Err(CapabilityError::Provider(
                "No models available in Ollama".to_string(),
            ))
        }
        None => Err(CapabilityError::Provider(
            "Invalid response format from Ollama /api/tags".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_payload_carries_messages_and_options() {
        let client = OllamaChatClient::new(None, Some(5), Some(0));
        let request = CompletionRequest::from_prompt("llama3.1:8b", "hello");
        let payload = client.build_payload(&request);
        assert_eq!(payload["model"], "llama3.1:8b");
        assert_eq!(payload["messages"][0]["content"], "hello");
        assert_eq!(payload["stream"], false);
        assert!((payload["options"]["temperature"].as_f64().unwrap() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn generate_payload_flattens_messages_into_a_prompt() {
        let client = OllamaGenerateClient::new(None, Some(5), Some(0));
        let request = CompletionRequest::from_prompt("llama3.1:8b", "hello");
        let payload = client.build_payload(&request);
        assert_eq!(payload["prompt"], "hello");
        assert!(payload.get("messages").is_none());
    }

    #[test]
    fn chat_response_parsing_reads_message_content() {
        let client = OllamaChatClient::new(None, Some(5), Some(0));
        let request = CompletionRequest::from_prompt("llama3.1:8b", "hello");
        let data = json!({
            "message": {"role": "assistant", "content": "SELECT 1"},
            "prompt_eval_count": 12,
            "eval_count": 4,
            "done": true
        });
        let response = client.parse_response(data, &request).unwrap();
        assert_eq!(response.content, "SELECT 1");
        assert_eq!(response.usage.total_tokens, 16);
        assert_eq!(response.provider_used, "ollama-chat");
    }

    #[test]
    fn generate_response_parsing_rejects_missing_field() {
        let client = OllamaGenerateClient::new(None, Some(5), Some(0));
        let request = CompletionRequest::from_prompt("llama3.1:8b", "hello");
        let err = client.parse_response(json!({"done": true}), &request);
        assert!(matches!(err, Err(CapabilityError::Provider(_))));
    }
}
