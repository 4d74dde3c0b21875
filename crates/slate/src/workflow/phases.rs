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

use crate::dataset::executor::{ExecutionError, ResultSet};
use crate::extract;
use crate::workflow::engine::{WorkflowEngine, WorkflowError};
use crate::workflow::prompts::{self, GenerationPrompt};
use crate::workflow::retry::{MAX_GENERATION_ATTEMPTS, MAX_RETRIES_MESSAGE};
use crate::workflow::state::{CandidateColumn, QueryPlan, SessionRecord};
use tracing::{debug, info, warn};

pub(crate) const MAX_CANDIDATE_COLUMNS: usize = 10;
const RESPONSE_SNIPPET_CHARS: usize = 200;

impl WorkflowEngine {
    pub(crate) async fn plan(&self, mut session: SessionRecord) -> SessionRecord {
        session.attempt_count = 0;
        let prompt = prompts::plan_prompt(&session.user_query);

        session.plan = match self.generator.complete(&prompt).await {
            Ok(response) => {
                debug!(chars = response.len(), "Planner response received");
                match extract::extract_json_object(&response)
                    .and_then(|json| serde_json::from_str::<QueryPlan>(&json).ok())
                {
                    Some(plan) if !plan.is_empty() => plan,
                    _ => {
                        warn!("Planner response carried no usable JSON plan, using single-step default");
                        QueryPlan::single_step(&session.user_query)
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Planner capability call failed, using single-step default");
                QueryPlan::single_step(&session.user_query)
            }
        };
        session
    }

    pub(crate) async fn retrieve(&self, mut session: SessionRecord) -> SessionRecord {
        let context = prompts::query_context(&session.user_query, &session.plan);
        let schema_text = prompts::schema_text(self.schema.descriptors());
        let prompt = prompts::column_selection_prompt(&context, &schema_text);

        let mut candidates = match self.generator.complete(&prompt).await {
            Ok(response) => {
                let names = extract::extract_json_array(&response)
                    .and_then(|json| serde_json::from_str::<Vec<String>>(&json).ok())
                    .unwrap_or_else(|| {
                        debug!("No JSON array in column selection response, matching substrings");
                        self.substring_column_matches(&response)
                    });
                self.candidates_from_names(&names)
            }
            Err(e) => {
                warn!(error = %e, "Column selection capability call failed, using semantic ranking");
                self.schema
                    .rank(&context, MAX_CANDIDATE_COLUMNS)
                    .await
                    .into_iter()
                    .map(|ranked| CandidateColumn {
                        column_name: ranked.name,
                        description: ranked.description,
                        example: ranked.example,
                        relevance_score: ranked.score,
                    })
                    .collect()
            }
        };

        if candidates.is_empty() {
            warn!("No candidate columns resolved, substituting the default column set");
            candidates = self.default_candidates();
        }
        candidates.truncate(MAX_CANDIDATE_COLUMNS);
        info!(candidates = candidates.len(), "Candidate columns selected");
        session.candidate_columns = candidates;
        session
    }

    pub(crate) async fn generate(&self, mut session: SessionRecord) -> SessionRecord {
        session.attempt_count += 1;
        let previous_query = std::mem::take(&mut session.generated_query);
        let fix_mode = !session.last_error.is_empty() && session.attempt_count > 1;
        let error_block = if fix_mode {
            prompts::fix_mode_block(&session.last_error, &previous_query)
        } else {
            String::new()
        };

        info!(attempt = session.attempt_count, fix_mode, "Generating statement");
        let all_columns = self.schema.column_names();
        let prompt = prompts::generation_prompt(&GenerationPrompt {
            candidates: &session.candidate_columns,
            all_columns: &all_columns,
            user_query: &session.user_query,
            plan: &session.plan,
            error_block: &error_block,
            table_name: self.executor.table_name(),
            key_column: &self.settings.key_column,
        });

        match self.generator.complete(&prompt).await {
            Ok(response) => match extract::extract_statement(&response) {
                Ok(statement) => session.generated_query = statement,
                Err(_) => {
                    debug!("Could not extract a statement, issuing a clarifying re-prompt");
                    let retry_prompt = prompts::clarifying_prompt(
                        &session.user_query,
                        &session.plan,
                        &all_columns,
                    );
                    match self.generator.complete(&retry_prompt).await {
                        Ok(second) => match extract::extract_statement(&second) {
                            Ok(statement) => session.generated_query = statement,
                            Err(_) => {
                                session.last_error = format!(
                                    "Could not generate a valid SQL statement. Model response: {}",
                                    snippet(&response)
                                );
                            }
                        },
                        Err(e) => {
                            session.last_error = format!("Statement generation failed: {e}");
                        }
                    }
                }
            },
            Err(e) => {
                session.last_error = format!("Statement generation failed: {e}");
            }
        }
        session
    }

    pub(crate) async fn validate(
        &self,
        mut session: SessionRecord,
    ) -> Result<SessionRecord, WorkflowError> {
        if session.attempt_count >= MAX_GENERATION_ATTEMPTS {
            warn!(attempts = session.attempt_count, "Retry ceiling reached, terminating");
            session.last_error = MAX_RETRIES_MESSAGE.to_string();
            session.result_rows = ResultSet::default();
            return Ok(session);
        }

        match self.executor.execute(&session.generated_query) {
            Ok(rows) => {
                info!(rows = rows.row_count(), "Statement executed successfully");
                session.result_rows = rows;
                session.last_error.clear();
                session.explanation = self.explain(&session).await;
            }
            Err(ExecutionError::Unavailable(message)) => {
                return Err(WorkflowError::ExecutorUnavailable(message));
            }
            Err(e) => {
                warn!(error = %e, statement = %session.generated_query, "Statement execution failed");
                session.last_error = e.to_string();
                session.result_rows = ResultSet::default();
            }
        }
        Ok(session)
    }

    async fn explain(&self, session: &SessionRecord) -> String {
        let result = &session.result_rows;
        if result.is_empty() {
            return "No matching records found for your query.".to_string();
        }

        let row_count = result.row_count();
        let results_text = if row_count <= self.settings.small_result_rows {
            prompts::render_rows(result)
        } else {
            format!(
                "Found {row_count} rows. First {} rows:\n{}",
                self.settings.sample_rows,
                prompts::render_rows(&result.head(self.settings.sample_rows))
            )
        };

        let prompt = prompts::explanation_prompt(&session.user_query, &results_text, row_count);
        match self.generator.complete(&prompt).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            _ => {
                debug!("Explanation generation degraded to the templated summary");
                match result.single_value() {
                    Some(value) => format!("**{}**", render_plain(value)),
                    None => format!("Found {row_count} record(s)."),
                }
            }
        }
    }

    fn substring_column_matches(&self, response: &str) -> Vec<String> {
        let lowered = response.to_lowercase();
        self.schema
            .column_names()
            .into_iter()
            .filter(|name| lowered.contains(&name.to_lowercase()))
            .take(MAX_CANDIDATE_COLUMNS)
            .collect()
    }

    fn candidates_from_names(&self, names: &[String]) -> Vec<CandidateColumn> {
        names
            .iter()
            .filter_map(|name| self.schema.descriptor(name))
            .take(MAX_CANDIDATE_COLUMNS)
            .enumerate()
            .map(|(i, descriptor)| CandidateColumn {
                column_name: descriptor.name.clone(),
                description: descriptor.description.clone(),
                example: descriptor.example.clone(),
                relevance_score: (1.0 - i as f32 * 0.1).max(0.1),
            })
            .collect()
    }

    fn default_candidates(&self) -> Vec<CandidateColumn> {
        let mut candidates: Vec<CandidateColumn> = self
            .settings
            .default_columns
            .iter()
            .filter_map(|name| self.schema.descriptor(name))
            .map(|descriptor| CandidateColumn {
                column_name: descriptor.name.clone(),
                description: descriptor.description.clone(),
                example: descriptor.example.clone(),
                relevance_score: 0.9,
            })
            .collect();
        if candidates.is_empty() {
            // The configured defaults are absent from this schema version.
            candidates = self
                .schema
                .descriptors()
                .iter()
                .take(3)
                .map(|descriptor| CandidateColumn {
                    column_name: descriptor.name.clone(),
                    description: descriptor.description.clone(),
                    example: descriptor.example.clone(),
                    relevance_score: 0.9,
                })
                .collect();
        }
        candidates
    }
}

fn snippet(response: &str) -> String {
    response.chars().take(RESPONSE_SNIPPET_CHARS).collect()
}

fn render_plain(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
