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

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file {0}: {1}")]
    Io(String, std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub model: String,
    pub embedding_model: String,
    pub use_embeddings: bool,
    pub timeout_seconds: u64,
    pub max_retries: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.1:8b".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            use_embeddings: true,
            timeout_seconds: 120,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub data_path: PathBuf,
    pub schema_path: PathBuf,
    pub table_name: String,
    pub key_column: String,
    pub default_columns: Vec<String>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("dataset/patient_data.csv"),
            schema_path: PathBuf::from("dataset/patient_data_description.csv"),
            table_name: "patient_data".to_string(),
            key_column: "Anonymous_Uid".to_string(),
            default_columns: vec![
                "Anonymous_Uid".to_string(),
                "Drugname".to_string(),
                "DiagnosisName".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SlateConfig {
    pub provider: ProviderConfig,
    pub dataset: DatasetConfig,
    pub server: ServerConfig,
}

impl SlateConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(path)
                    .map_err(|e| ConfigError::Io(path.display().to_string(), e))?;
                info!(path = %path.display(), "Configuration loaded");
                toml::from_str(&content)?
            }
            _ => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(base_url) = std::env::var("SLATE_OLLAMA_BASE_URL") {
            self.provider.base_url = base_url;
        }
        if let Ok(model) = std::env::var("SLATE_MODEL") {
            self.provider.model = model;
        }
        if let Ok(model) = std::env::var("SLATE_EMBEDDING_MODEL") {
            self.provider.embedding_model = model;
        }
        if let Ok(timeout) = std::env::var("SLATE_TIMEOUT_SECONDS") {
            if let Ok(seconds) = timeout.parse() {
                self.provider.timeout_seconds = seconds;
            }
        }
        if let Ok(data_path) = std::env::var("SLATE_DATA_PATH") {
            self.dataset.data_path = PathBuf::from(data_path);
        }
        if let Ok(schema_path) = std::env::var("SLATE_SCHEMA_PATH") {
            self.dataset.schema_path = PathBuf::from(schema_path);
        }
        if let Ok(bind_addr) = std::env::var("SLATE_BIND_ADDR") {
            self.server.bind_addr = bind_addr;
        }
    }
}
