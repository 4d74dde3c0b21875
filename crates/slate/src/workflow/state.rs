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

use crate::dataset::executor::ResultSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    Plan,
    Retrieve,
    Generate,
    Validate,
    Terminated,
}

impl WorkflowPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowPhase::Plan => "plan",
            WorkflowPhase::Retrieve => "retrieve",
            WorkflowPhase::Generate => "generate",
            WorkflowPhase::Validate => "validate",
            WorkflowPhase::Terminated => "terminated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseOutcome {
    Advance,
    Retry,
    End,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanAction {
    Filter,
    Count,
    Aggregate,
    Join,
    #[default]
    Query,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanStep {
    #[serde(default)]
    pub step_number: u32,
    #[serde(default)]
    pub action: PlanAction,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryPlan {
    #[serde(default)]
    pub steps: Vec<PlanStep>,
    #[serde(default)]
    pub final_action: String,
}

impl QueryPlan {
    pub fn single_step(user_query: &str) -> Self {
        Self {
            steps: vec![PlanStep {
                step_number: 1,
                action: PlanAction::Query,
                description: format!("Process query: {user_query}"),
                filters: None,
                target: Some(user_query.to_string()),
            }],
            final_action: "Return results".to_string(),
        }
    }

    pub fn rendered_steps(&self) -> String {
        self.steps
            .iter()
            .map(|step| format!("Step {}: {}", step.step_number, step.description))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateColumn {
    pub column_name: String,
    pub description: String,
    pub example: String,
    pub relevance_score: f32,
}

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub user_query: String,
    pub plan: QueryPlan,
    pub candidate_columns: Vec<CandidateColumn>,
    pub generated_query: String,
    pub last_error: String,
    pub attempt_count: u32,
    pub result_rows: ResultSet,
    pub explanation: String,
    pub current_phase: WorkflowPhase,
}

impl SessionRecord {
    pub fn new(user_query: &str) -> Self {
        Self {
            user_query: user_query.to_string(),
            plan: QueryPlan::default(),
            candidate_columns: Vec::new(),
            generated_query: String::new(),
            last_error: String::new(),
            attempt_count: 0,
            result_rows: ResultSet::default(),
            explanation: String::new(),
            current_phase: WorkflowPhase::Plan,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionOutcome {
    pub query: String,
    pub plan: QueryPlan,
    pub candidate_columns: Vec<CandidateColumn>,
    pub generated_query: String,
    pub result_rows: ResultSet,
    pub explanation: String,
    pub error: String,
    pub final_phase: WorkflowPhase,
}

impl From<SessionRecord> for SessionOutcome {
    fn from(session: SessionRecord) -> Self {
        let failed = !session.last_error.is_empty();
        Self {
            query: session.user_query,
            plan: session.plan,
            candidate_columns: session.candidate_columns,
            generated_query: session.generated_query,
            result_rows: if failed {
                ResultSet::default()
            } else {
                session.result_rows
            },
            explanation: if failed {
                String::new()
            } else {
                session.explanation
            },
            error: session.last_error,
            final_phase: session.current_phase,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_plan_carries_the_raw_query() {
        let plan = QueryPlan::single_step("Count patients with Glaucoma");
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].action, PlanAction::Query);
        assert!(plan.steps[0].description.contains("Count patients"));
        assert_eq!(plan.rendered_steps(), "Step 1: Process query: Count patients with Glaucoma");
    }

    #[test]
    fn unknown_plan_actions_deserialise_to_the_catch_all() {
        let json = r#"{"steps": [{"step_number": 1, "action": "summarise", "description": "d"}], "final_action": "x"}"#;
        let plan: QueryPlan = serde_json::from_str(json).unwrap();
        assert_eq!(plan.steps[0].action, PlanAction::Other);
    }

    #[test]
    fn missing_plan_fields_take_defaults() {
        let json = r#"{"steps": [{"description": "count rows"}]}"#;
        let plan: QueryPlan = serde_json::from_str(json).unwrap();
        assert_eq!(plan.steps[0].action, PlanAction::Query);
        assert_eq!(plan.steps[0].step_number, 0);
        assert!(plan.final_action.is_empty());
    }

    #[test]
    fn failed_sessions_never_expose_stale_rows_or_explanations() {
        let mut session = SessionRecord::new("q");
        session.result_rows = ResultSet {
            columns: vec!["n".to_string()],
            rows: vec![vec![serde_json::json!(3)]],
        };
        session.explanation = "stale".to_string();
        session.last_error = "no such column: X".to_string();
        session.current_phase = WorkflowPhase::Terminated;
        let outcome = SessionOutcome::from(session);
        assert!(outcome.result_rows.is_empty());
        assert!(outcome.explanation.is_empty());
        assert_eq!(outcome.error, "no such column: X");
    }
}
