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

use crate::config::SlateConfig;
use crate::dataset::executor::{ExecutionError, TabularExecutor};
use crate::dataset::ingest::{load_schema_descriptions, load_table, DatasetError};
use crate::llm::adapter::CapabilityAdapter;
use crate::llm::embeddings::OllamaEmbeddingClient;
use crate::schema::store::SchemaStore;
use crate::workflow::engine::{EngineSettings, WorkflowEngine};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Dataset ingestion failed: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Executor setup failed: {0}")]
    Executor(#[from] ExecutionError),
}

pub async fn build_engine(config: &SlateConfig) -> Result<WorkflowEngine, BootstrapError> {
    let table = load_table(&config.dataset.data_path)?;
    let descriptors = load_schema_descriptions(&config.dataset.schema_path)?;
    let executor = Arc::new(TabularExecutor::from_table(
        &config.dataset.table_name,
        &table,
    )?);

    let schema = if config.provider.use_embeddings {
        let embedder = Arc::new(OllamaEmbeddingClient::new(
            &config.provider.base_url,
            &config.provider.embedding_model,
            config.provider.timeout_seconds,
        ));
        Arc::new(SchemaStore::with_embeddings(descriptors, embedder).await)
    } else {
        Arc::new(SchemaStore::new(descriptors))
    };

    let generator = Arc::new(CapabilityAdapter::ollama(
        &config.provider.base_url,
        &config.provider.model,
        config.provider.timeout_seconds,
        config.provider.max_retries,
    ));

    let settings = EngineSettings {
        key_column: config.dataset.key_column.clone(),
        default_columns: config.dataset.default_columns.clone(),
        ..EngineSettings::default()
    };

    info!(
        table = %config.dataset.table_name,
        rows = executor.row_count(),
        columns = schema.len(),
        model = %config.provider.model,
        "Workflow engine assembled"
    );
    Ok(WorkflowEngine::with_settings(
        generator, schema, executor, settings,
    ))
}
