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

use crate::dataset::executor::TabularExecutor;
use crate::llm::core::TextGenerator;
use crate::schema::store::SchemaStore;
use crate::workflow::retry::{self, RetryDecision};
use crate::workflow::state::{PhaseOutcome, SessionOutcome, SessionRecord, WorkflowPhase};
use crate::workflow::transition::next_phase;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Tabular executor unavailable: {0}")]
    ExecutorUnavailable(String),
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub key_column: String,
    pub default_columns: Vec<String>,
    pub small_result_rows: usize,
    pub sample_rows: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            key_column: "Anonymous_Uid".to_string(),
            default_columns: vec![
                "Anonymous_Uid".to_string(),
                "Drugname".to_string(),
                "DiagnosisName".to_string(),
            ],
            small_result_rows: 5,
            sample_rows: 3,
        }
    }
}

pub struct WorkflowEngine {
    pub(crate) generator: Arc<dyn TextGenerator>,
    pub(crate) schema: Arc<SchemaStore>,
    pub(crate) executor: Arc<TabularExecutor>,
    pub(crate) settings: EngineSettings,
}

impl WorkflowEngine {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        schema: Arc<SchemaStore>,
        executor: Arc<TabularExecutor>,
    ) -> Self {
        Self::with_settings(generator, schema, executor, EngineSettings::default())
    }

    pub fn with_settings(
        generator: Arc<dyn TextGenerator>,
        schema: Arc<SchemaStore>,
        executor: Arc<TabularExecutor>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            generator,
            schema,
            executor,
            settings,
        }
    }

    pub fn schema(&self) -> &SchemaStore {
        &self.schema
    }

    pub fn executor(&self) -> &TabularExecutor {
        &self.executor
    }

    pub async fn generator_health(&self) -> bool {
        self.generator.health_check().await.is_ok()
    }

    pub async fn run(&self, user_query: &str) -> Result<SessionOutcome, WorkflowError> {
        let mut session = SessionRecord::new(user_query);
        info!(query = user_query, "Workflow session started");

        loop {
            let phase = session.current_phase;
            debug!(phase = phase.as_str(), attempt = session.attempt_count, "Entering phase");

            let (next_session, outcome) = match phase {
                WorkflowPhase::Plan => (self.plan(session).await, PhaseOutcome::Advance),
                WorkflowPhase::Retrieve => (self.retrieve(session).await, PhaseOutcome::Advance),
                WorkflowPhase::Generate => (self.generate(session).await, PhaseOutcome::Advance),
                WorkflowPhase::Validate => {
                    let validated = self.validate(session).await?;
                    let outcome =
                        match retry::decide(&validated.last_error, validated.attempt_count) {
                            RetryDecision::Retry => PhaseOutcome::Retry,
                            RetryDecision::End => PhaseOutcome::End,
                        };
                    (validated, outcome)
                }
                WorkflowPhase::Terminated => break,
            };

            session = next_session;
            session.current_phase = next_phase(phase, outcome);
        }

        info!(
            attempts = session.attempt_count,
            failed = !session.last_error.is_empty(),
            "Workflow session terminated"
        );
        Ok(SessionOutcome::from(session))
    }
}
