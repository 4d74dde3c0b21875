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
use slate::dataset::ingest::TableData;
use slate::workflow::MAX_RETRIES_MESSAGE;
use slate::{
    CapabilityError, CapabilityResult, ColumnDescriptor, SchemaStore, TabularExecutor,
    TextGenerator, WorkflowEngine, WorkflowPhase,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

struct ScriptedGenerator {
    script: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    fn new(responses: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(responses.iter().map(|r| r.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn generation_attempts(&self) -> usize {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.contains("Generate the SQL query:"))
            .count()
    }

    fn prompt(&self, index: usize) -> String {
        self.prompts.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn complete(&self, prompt: &str) -> CapabilityResult<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| CapabilityError::Provider("script exhausted".to_string()))
    }

    async fn health_check(&self) -> CapabilityResult<()> {
        Ok(())
    }
}

struct ConstantGenerator {
    response: String,
    prompts: Mutex<Vec<String>>,
}

impl ConstantGenerator {
    fn new(response: &str) -> Arc<Self> {
        Arc::new(Self {
            response: response.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn generation_attempts(&self) -> usize {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.contains("Generate the SQL query:"))
            .count()
    }
}

#[async_trait]
impl TextGenerator for ConstantGenerator {
    async fn complete(&self, prompt: &str) -> CapabilityResult<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.response.clone())
    }

    async fn health_check(&self) -> CapabilityResult<()> {
        Ok(())
    }
}

struct FailingGenerator;

#[async_trait]
impl TextGenerator for FailingGenerator {
    async fn complete(&self, _prompt: &str) -> CapabilityResult<String> {
        Err(CapabilityError::Network("connection refused".to_string()))
    }

    async fn health_check(&self) -> CapabilityResult<()> {
        Err(CapabilityError::Network("connection refused".to_string()))
    }
}

fn fixture_executor() -> Arc<TabularExecutor> {
    let data = TableData {
        columns: vec![
            "Anonymous_Uid".to_string(),
            "DiagnosisName".to_string(),
            "Drugname".to_string(),
            "deptname".to_string(),
        ],
        rows: vec![
            vec![
                Some("E5F99".to_string()),
                Some("Diabetic Retinopathy; Hypertension".to_string()),
                Some("Latanoprost".to_string()),
                Some("RETINA CLINIC".to_string()),
            ],
            vec![
                Some("E5F86".to_string()),
                Some("Glaucoma".to_string()),
                None,
                Some("GLAUCOMA CLINIC".to_string()),
            ],
            vec![
                Some("E5F77".to_string()),
                Some("Diabetic Retinopathy".to_string()),
                Some("Timolol".to_string()),
                Some("RETINA CLINIC".to_string()),
            ],
        ],
    };
    Arc::new(TabularExecutor::from_table("patient_data", &data).expect("executor"))
}

fn fixture_schema() -> Arc<SchemaStore> {
    Arc::new(SchemaStore::new(vec![
        ColumnDescriptor::new("Anonymous_Uid", "Anonymised patient identifier", "E5F99"),
        ColumnDescriptor::new(
            "DiagnosisName",
            "Semicolon separated diagnosis names",
            "Glaucoma; Hypertension",
        ),
        ColumnDescriptor::new("Drugname", "Prescribed drug for the visit", "Latanoprost"),
        ColumnDescriptor::new("deptname", "Clinic department name", "RETINA CLINIC"),
    ]))
}

fn engine(generator: Arc<dyn TextGenerator>) -> WorkflowEngine {
    WorkflowEngine::new(generator, fixture_schema(), fixture_executor())
}

const PLAN_RESPONSE: &str = r#"{"steps": [{"step_number": 1, "action": "count", "description": "Count rows where DiagnosisName contains Diabetic Retinopathy"}], "final_action": "Return the count"}"#;

const COLUMNS_RESPONSE: &str = r#"["DiagnosisName", "Anonymous_Uid"]"#;

#[tokio::test]
async fn scenario_a_fenced_count_query_succeeds_first_attempt() {
    let generator = ScriptedGenerator::new(&[
        PLAN_RESPONSE,
        COLUMNS_RESPONSE,
        "```sql\nSELECT COUNT(*) AS patient_count FROM patient_data WHERE DiagnosisName LIKE '%Diabetic Retinopathy%'\n```",
        "There are **2** patients with Diabetic Retinopathy.",
    ]);
    let engine = engine(generator.clone());

    let outcome = engine
        .run("Count patients with Diabetic Retinopathy")
        .await
        .expect("workflow");

    assert_eq!(outcome.final_phase, WorkflowPhase::Terminated);
    assert!(outcome.error.is_empty());
    assert_eq!(outcome.result_rows.row_count(), 1);
    assert_eq!(outcome.result_rows.column_count(), 1);
    assert_eq!(
        outcome.result_rows.single_value(),
        Some(&serde_json::json!(2))
    );
    assert_eq!(
        outcome.explanation,
        "There are **2** patients with Diabetic Retinopathy."
    );
    assert_eq!(generator.generation_attempts(), 1);
}

#[tokio::test]
async fn scenario_b_recovers_from_a_missing_column_on_the_second_attempt() {
    let generator = ScriptedGenerator::new(&[
        PLAN_RESPONSE,
        COLUMNS_RESPONSE,
        "SELECT PatientID FROM patient_data WHERE DiagnosisName LIKE '%Diabetic Retinopathy%';",
        "SELECT Anonymous_Uid FROM patient_data WHERE DiagnosisName LIKE '%Diabetic Retinopathy%';",
        "Patients **E5F99** and **E5F77** match.",
    ]);
    let engine = engine(generator.clone());

    let outcome = engine
        .run("Which patients have Diabetic Retinopathy?")
        .await
        .expect("workflow");

    assert!(outcome.error.is_empty());
    assert_eq!(outcome.result_rows.row_count(), 2);
    assert_eq!(generator.generation_attempts(), 2);

    // The second generation prompt carries the fix-mode block with the
    // executor diagnostic from the failed first attempt.
    let fix_prompt = generator.prompt(3);
    assert!(fix_prompt.contains("PREVIOUS ATTEMPT FAILED"));
    assert!(fix_prompt.contains("no such column"));
    assert!(fix_prompt.contains("SELECT PatientID FROM patient_data"));
}

#[tokio::test]
async fn scenario_c_prose_only_output_terminates_at_the_ceiling() {
    let generator = ConstantGenerator::new("I am sorry, I cannot help with that question.");
    let engine = engine(generator.clone());

    let outcome = engine.run("Count the patients").await.expect("workflow");

    assert_eq!(outcome.final_phase, WorkflowPhase::Terminated);
    assert_eq!(outcome.error, MAX_RETRIES_MESSAGE);
    assert!(outcome.result_rows.is_empty());
    assert!(outcome.explanation.is_empty());
    assert_eq!(generator.generation_attempts(), 4);
}

#[tokio::test]
async fn scenario_d_total_capability_failure_still_reaches_validate() {
    let engine = engine(Arc::new(FailingGenerator));

    let outcome = engine.run("xyzzy plugh").await.expect("workflow");

    let candidate_names: Vec<&str> = outcome
        .candidate_columns
        .iter()
        .map(|c| c.column_name.as_str())
        .collect();
    assert_eq!(
        candidate_names,
        vec!["Anonymous_Uid", "Drugname", "DiagnosisName"]
    );
    assert_eq!(outcome.final_phase, WorkflowPhase::Terminated);
    assert_eq!(outcome.error, MAX_RETRIES_MESSAGE);
    assert!(outcome.result_rows.is_empty());
    // The default plan still flows through to generation.
    assert_eq!(outcome.plan.steps.len(), 1);
}

#[tokio::test]
async fn recoverable_failures_burn_exactly_four_attempts() {
    let generator = ConstantGenerator::new(
        "SELECT Nonexistent FROM patient_data WHERE Drugname IS NOT NULL;",
    );
    let engine = engine(generator.clone());

    let outcome = engine.run("List the prescriptions").await.expect("workflow");

    assert_eq!(outcome.error, MAX_RETRIES_MESSAGE);
    assert!(outcome.result_rows.is_empty());
    assert_eq!(generator.generation_attempts(), 4);
}

#[tokio::test]
async fn empty_result_sets_explain_themselves_without_the_model() {
    let generator = ScriptedGenerator::new(&[
        PLAN_RESPONSE,
        COLUMNS_RESPONSE,
        "SELECT Drugname FROM patient_data WHERE Anonymous_Uid = 'ZZZZZ';",
    ]);
    let engine = engine(generator.clone());

    let outcome = engine
        .run("What drug is patient ZZZZZ taking?")
        .await
        .expect("workflow");

    assert!(outcome.error.is_empty());
    assert!(outcome.result_rows.is_empty());
    assert_eq!(
        outcome.explanation,
        "No matching records found for your query."
    );
}

#[tokio::test]
async fn explanation_falls_back_to_the_templated_summary() {
    // The script runs dry before the explanation call, which degrades to the
    // single-cell template.
    let generator = ScriptedGenerator::new(&[
        PLAN_RESPONSE,
        COLUMNS_RESPONSE,
        "SELECT COUNT(*) AS n FROM patient_data WHERE deptname LIKE '%RETINA%';",
    ]);
    let engine = engine(generator.clone());

    let outcome = engine
        .run("How many retina clinic visits are there?")
        .await
        .expect("workflow");

    assert!(outcome.error.is_empty());
    assert_eq!(outcome.explanation, "**2**");
}

#[tokio::test]
async fn clarifying_reprompt_rescues_a_prose_first_response() {
    let generator = ScriptedGenerator::new(&[
        PLAN_RESPONSE,
        COLUMNS_RESPONSE,
        "Sure! Let me think about the right query for that.",
        "SELECT COUNT(*) AS n FROM patient_data WHERE DiagnosisName LIKE '%Glaucoma%';",
        "**1** patient has Glaucoma.",
    ]);
    let engine = engine(generator.clone());

    let outcome = engine
        .run("Count patients with Glaucoma")
        .await
        .expect("workflow");

    assert!(outcome.error.is_empty());
    assert_eq!(
        outcome.result_rows.single_value(),
        Some(&serde_json::json!(1))
    );
    // One logical generation attempt, even though two completions were used.
    assert_eq!(generator.generation_attempts(), 1);
}
