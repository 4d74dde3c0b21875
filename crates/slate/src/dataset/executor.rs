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

use crate::dataset::ingest::TableData;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("malformed statement: {0}")]
    Malformed(String),

    #[error("{0}")]
    Statement(String),

    #[error("executor unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn head(&self, n: usize) -> ResultSet {
        ResultSet {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    pub fn single_value(&self) -> Option<&Value> {
        if self.row_count() == 1 && self.column_count() == 1 {
            self.rows[0].first()
        } else {
            None
        }
    }
}

pub struct TabularExecutor {
    conn: Mutex<Connection>,
    table_name: String,
    columns: Vec<String>,
    row_count: usize,
}

impl TabularExecutor {
    pub fn from_table(table_name: &str, data: &TableData) -> Result<Self, ExecutionError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ExecutionError::Unavailable(e.to_string()))?;

        let column_defs = data
            .columns
            .iter()
            .map(|c| format!("\"{c}\" TEXT"))
            .collect::<Vec<_>>()
            .join(", ");
        conn.execute(
            &format!("CREATE TABLE \"{table_name}\" ({column_defs})"),
            [],
        )
        .map_err(|e| ExecutionError::Unavailable(e.to_string()))?;

        let placeholders = vec!["?"; data.columns.len()].join(", ");
        let insert = format!("INSERT INTO \"{table_name}\" VALUES ({placeholders})");
        conn.execute_batch("BEGIN")
            .map_err(|e| ExecutionError::Unavailable(e.to_string()))?;
        {
            let mut stmt = conn
                .prepare(&insert)
                .map_err(|e| ExecutionError::Unavailable(e.to_string()))?;
            for row in &data.rows {
                stmt.execute(rusqlite::params_from_iter(row.iter()))
                    .map_err(|e| ExecutionError::Unavailable(e.to_string()))?;
            }
        }
        conn.execute_batch("COMMIT")
            .map_err(|e| ExecutionError::Unavailable(e.to_string()))?;

        info!(
            table = table_name,
            rows = data.row_count(),
            columns = data.column_count(),
            "Tabular executor ready"
        );
        Ok(Self {
            conn: Mutex::new(conn),
            table_name: table_name.to_string(),
            columns: data.columns.clone(),
            row_count: data.row_count(),
        })
    }

    pub fn execute(&self, statement: &str) -> Result<ResultSet, ExecutionError> {
        let trimmed = statement.trim();
        if trimmed.is_empty() {
            return Err(ExecutionError::Malformed("statement is empty".to_string()));
        }

        let conn = self
            .conn
            .lock()
            .map_err(|_| ExecutionError::Unavailable("executor lock poisoned".to_string()))?;

        let mut stmt = conn
            .prepare(trimmed)
            .map_err(|e| ExecutionError::Statement(e.to_string()))?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let column_count = columns.len();

        let mut rows = Vec::new();
        let mut raw_rows = stmt
            .query([])
            .map_err(|e| ExecutionError::Statement(e.to_string()))?;
        while let Some(raw) = raw_rows
            .next()
            .map_err(|e| ExecutionError::Statement(e.to_string()))?
        {
            let mut row = Vec::with_capacity(column_count);
            for i in 0..column_count {
                let value = raw
                    .get_ref(i)
                    .map_err(|e| ExecutionError::Statement(e.to_string()))?;
                row.push(value_ref_to_json(value));
            }
            rows.push(row);
        }

        debug!(
            statement = trimmed,
            rows = rows.len(),
            "Statement executed"
        );
        Ok(ResultSet { columns, rows })
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }
}

fn value_ref_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(_) => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> TabularExecutor {
        let data = TableData {
            columns: vec![
                "Anonymous_Uid".to_string(),
                "DiagnosisName".to_string(),
                "Drugname".to_string(),
            ],
            rows: vec![
                vec![
                    Some("E5F99".to_string()),
                    Some("Diabetic Retinopathy; Hypertension".to_string()),
                    Some("Latanoprost".to_string()),
                ],
                vec![
                    Some("E5F86".to_string()),
                    Some("Glaucoma".to_string()),
                    None,
                ],
            ],
        };
        TabularExecutor::from_table("patient_data", &data).expect("executor")
    }

    #[test]
    fn count_query_returns_a_single_cell() {
        let executor = fixture();
        let result = executor
            .execute(
                "SELECT COUNT(*) AS patient_count FROM patient_data WHERE DiagnosisName LIKE '%Diabetic Retinopathy%'",
            )
            .unwrap();
        assert_eq!(result.columns, vec!["patient_count"]);
        assert_eq!(result.single_value(), Some(&Value::from(1)));
    }

    #[test]
    fn null_cells_round_trip_as_json_null() {
        let executor = fixture();
        let result = executor
            .execute("SELECT Drugname FROM patient_data WHERE Anonymous_Uid = 'E5F86'")
            .unwrap();
        assert_eq!(result.rows[0][0], Value::Null);
    }

    #[test]
    fn unknown_column_yields_a_classifiable_diagnostic() {
        let executor = fixture();
        let err = executor
            .execute("SELECT PatientID FROM patient_data")
            .unwrap_err();
        assert!(err.to_string().contains("no such column"));
    }

    #[test]
    fn empty_statement_is_rejected_as_malformed() {
        let executor = fixture();
        let err = executor.execute("   ").unwrap_err();
        assert!(err.to_string().contains("malformed statement"));
    }

    #[test]
    fn head_truncates_rows_only() {
        let executor = fixture();
        let result = executor.execute("SELECT * FROM patient_data").unwrap();
        let head = result.head(1);
        assert_eq!(head.row_count(), 1);
        assert_eq!(head.column_count(), 3);
    }
}
