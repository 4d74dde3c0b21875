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
use crate::schema::descriptor::ColumnDescriptor;
use crate::workflow::state::{CandidateColumn, QueryPlan};
use serde_json::Value;

const MAX_DESCRIPTION_CHARS: usize = 150;
const MAX_SCHEMA_TEXT_CHARS: usize = 8000;
const MAX_SCHEMA_LINES: usize = 40;

pub fn plan_prompt(user_query: &str) -> String {
    format!(
        r#"You are a planning assistant that breaks down complex medical data queries into simple, executable steps.

User Query: {user_query}

Your task is to analyse this query and create a JSON plan with the following structure:
{{
    "steps": [
        {{
            "step_number": 1,
            "action": "filter|count|aggregate|join",
            "description": "Clear description of what this step does",
            "filters": {{"column": "column_name", "condition": "value or condition"}},
            "target": "what we're looking for"
        }}
    ],
    "final_action": "what the final result should be"
}}

Important:
- Break complex queries into simple steps
- Identify what columns might be needed
- Specify filter conditions clearly
- For diagnosis queries, remember that diagnosis fields may contain semicolon-separated values

Return ONLY valid JSON, no additional text."#
    )
}

pub fn schema_text(descriptors: &[ColumnDescriptor]) -> String {
    let mut lines: Vec<String> = descriptors
        .iter()
        .map(|descriptor| {
            let description: String = descriptor
                .description
                .chars()
                .take(MAX_DESCRIPTION_CHARS)
                .collect();
            format!("- {}: {}", descriptor.name, description)
        })
        .collect();
    let mut text = lines.join("\n");
    if text.len() > MAX_SCHEMA_TEXT_CHARS {
        lines.truncate(MAX_SCHEMA_LINES);
        text = lines.join("\n");
        text.push_str("\n... (and more columns)");
    }
    text
}

pub fn query_context(user_query: &str, plan: &QueryPlan) -> String {
    let mut context = user_query.to_string();
    if !plan.is_empty() {
        context.push_str("\n\nPlan:\n");
        context.push_str(&plan.rendered_steps());
    }
    context
}

pub fn column_selection_prompt(query_context: &str, schema_text: &str) -> String {
    format!(
        r#"You are a schema librarian. Given a user query and execution plan, identify the most relevant database columns.

User Query and Plan:
{query_context}

Available Database Columns:
{schema_text}

Based on the query and plan, identify the top 8-10 most relevant columns needed to answer this query.
Return ONLY a JSON array of column names in order of relevance, like: ["Column1", "Column2", "Column3", ...]

Do not include explanations, just the JSON array. Example: ["Anonymous_Uid", "Drugname", "DiagnosisName"]"#
    )
}

pub struct GenerationPrompt<'a> {
    pub candidates: &'a [CandidateColumn],
    pub all_columns: &'a [String],
    pub user_query: &'a str,
    pub plan: &'a QueryPlan,
    pub error_block: &'a str,
    pub table_name: &'a str,
    pub key_column: &'a str,
}

pub fn generation_prompt(args: &GenerationPrompt<'_>) -> String {
    let column_context = args
        .candidates
        .iter()
        .map(|col| format!("- {}: {}", col.column_name, col.description))
        .collect::<Vec<_>>()
        .join("\n");
    let all_columns = args.all_columns.join(", ");
    let plan_json = plan_as_json(args.plan);
    let few_shots = few_shot_examples(args.table_name, args.key_column);
    let table_name = args.table_name;
    let key_column = args.key_column;
    let user_query = args.user_query;
    let error_block = args.error_block;

    format!(
        r#"You are a SQL engineer. Generate a SQLite query based on the user's request.

Relevant Columns (most likely needed):
{column_context}

All Available Columns: {all_columns}

User Query: {user_query}

Plan: {plan_json}
{error_block}

Few-Shot Examples:
{few_shots}

IMPORTANT INFORMATION:
- Table name: '{table_name}'
- Patient ID column: '{key_column}'
- Diagnosis fields contain semicolon-separated values, so use LIKE '%value%' for searching
- Handle NULL values with: IS NOT NULL or IS NULL
- Always use exact column names from the Available Columns list above
- When filtering by patient ID like 'E5F99', use: WHERE {key_column} = 'E5F99'

CRITICAL: Return ONLY the SQL query, nothing else. No explanations, no markdown, just the SQL statement.
Start with SELECT and end properly. Use '{key_column}' for patient ID filtering.

Generate the SQL query:"#
    )
}

pub fn fix_mode_block(last_error: &str, failed_query: &str) -> String {
    let failed = if failed_query.is_empty() {
        "N/A"
    } else {
        failed_query
    };
    format!(
        "\n\nPREVIOUS ATTEMPT FAILED:\nError: {last_error}\nFailed SQL: {failed}\n\nPlease fix the SQL query based on this error."
    )
}

pub fn clarifying_prompt(user_query: &str, plan: &QueryPlan, all_columns: &[String]) -> String {
    let plan_json = plan_as_json(plan);
    let columns = all_columns.join(", ");
    format!(
        r#"The previous response was not a valid SQL query. Please generate ONLY a SQLite query for this request:

User Query: {user_query}
Plan: {plan_json}

Available Columns: {columns}

Return ONLY the SQL query, no other text. Start with SELECT."#
    )
}

pub fn few_shot_examples(table_name: &str, key_column: &str) -> String {
    format!(
        r#"
Example 1:
Query: "Count patients with Diabetic Retinopathy"
SQL: SELECT COUNT(*) as patient_count FROM {table_name} WHERE DiagnosisName LIKE '%Diabetic Retinopathy%'

Example 2:
Query: "Show patients with vision problems in right eye"
SQL: SELECT {key_column}, Revalue, DiagnosisName FROM {table_name} WHERE Revalue IS NOT NULL LIMIT 20

Example 3:
Query: "Count patients with both Glaucoma and Hypertension"
SQL: SELECT COUNT(*) as patient_count FROM {table_name} WHERE DiagnosisName LIKE '%Glaucoma%' AND DiagnosisName LIKE '%Hypertension%'

Example 4:
Query: "what drug is the patient E5F99 taking?"
SQL: SELECT Drugname FROM {table_name} WHERE {key_column} = 'E5F99' AND Drugname IS NOT NULL

Example 5:
Query: "Show patient E5F86 diagnosis"
SQL: SELECT DiagnosisName FROM {table_name} WHERE {key_column} = 'E5F86' AND DiagnosisName IS NOT NULL
"#
    )
}

pub fn explanation_prompt(user_query: &str, results_text: &str, row_count: usize) -> String {
    let plural = if row_count == 1 { "" } else { "s" };
    format!(
        r#"Given the user's query and the SQL query results, provide a concise, direct answer in natural language.

User Query: {user_query}

Query Results ({row_count} row{plural}):
{results_text}

Provide a direct, concise answer to the user's question.
- If the query asks for a specific value (like a drug name or count), give that value directly
- If the query asks for a list, summarise the key findings
- Do not explain the SQL or the process, just answer the question
- Use **bold** for important values
- Keep it brief and natural

Answer:"#
    )
}

pub fn render_rows(result: &ResultSet) -> String {
    let mut lines = vec![result.columns.join(" | ")];
    for row in &result.rows {
        let rendered: Vec<String> = row.iter().map(render_value).collect();
        lines.push(rendered.join(" | "));
    }
    lines.join("\n")
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn plan_as_json(plan: &QueryPlan) -> String {
    serde_json::to_string_pretty(plan).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_text_truncates_long_schemas() {
        let descriptors: Vec<ColumnDescriptor> = (0..60)
            .map(|i| {
                ColumnDescriptor::new(
                    &format!("Column_{i}"),
                    &"very long description ".repeat(20),
                    "",
                )
            })
            .collect();
        let text = schema_text(&descriptors);
        assert!(text.ends_with("... (and more columns)"));
        assert_eq!(text.lines().count(), MAX_SCHEMA_LINES + 1);
    }

    #[test]
    fn query_context_appends_rendered_plan_steps() {
        let plan = QueryPlan::single_step("count the patients");
        let context = query_context("count the patients", &plan);
        assert!(context.starts_with("count the patients"));
        assert!(context.contains("Plan:\nStep 1:"));
    }

    #[test]
    fn generation_prompt_includes_fix_mode_block_verbatim() {
        let plan = QueryPlan::single_step("q");
        let candidates = vec![CandidateColumn {
            column_name: "Drugname".to_string(),
            description: "Prescribed drug".to_string(),
            example: String::new(),
            relevance_score: 1.0,
        }];
        let all_columns = vec!["Drugname".to_string()];
        let error_block = fix_mode_block("no such column: X", "SELECT X FROM patient_data");
        let prompt = generation_prompt(&GenerationPrompt {
            candidates: &candidates,
            all_columns: &all_columns,
            user_query: "q",
            plan: &plan,
            error_block: &error_block,
            table_name: "patient_data",
            key_column: "Anonymous_Uid",
        });
        assert!(prompt.contains("PREVIOUS ATTEMPT FAILED"));
        assert!(prompt.contains("no such column: X"));
        assert!(prompt.contains("Table name: 'patient_data'"));
    }

    #[test]
    fn rendered_rows_show_nulls_explicitly() {
        let result = ResultSet {
            columns: vec!["Drugname".to_string()],
            rows: vec![vec![Value::Null], vec![Value::String("Latanoprost".to_string())]],
        };
        let rendered = render_rows(&result);
        assert_eq!(rendered, "Drugname\nNULL\nLatanoprost");
    }
}
