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

use crate::schema::descriptor::ColumnDescriptor;
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Dataset file not found: {0}")]
    NotFound(String),

    #[error("Failed to parse CSV record: {0}")]
    Csv(#[from] csv::Error),

    #[error("Schema description file is missing the '{0}' column")]
    MissingSchemaColumn(&'static str),

    #[error("Dataset file carries no columns")]
    EmptyHeader,
}

#[derive(Debug, Clone, Default)]
pub struct TableData {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl TableData {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

pub fn normalise_column_name(raw: &str) -> String {
    raw.trim().replace(' ', "_")
}

fn canonicalise_cell(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") || trimmed == "nan" {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn load_table(path: &Path) -> Result<TableData, DatasetError> {
    if !path.exists() {
        return Err(DatasetError::NotFound(path.display().to_string()));
    }
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;

    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .map(normalise_column_name)
        .collect();
    if columns.is_empty() {
        return Err(DatasetError::EmptyHeader);
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut row: Vec<Option<String>> = record.iter().map(canonicalise_cell).collect();
        row.resize(columns.len(), None);
        rows.push(row);
    }

    info!(
        rows = rows.len(),
        columns = columns.len(),
        path = %path.display(),
        "Loaded dataset table"
    );
    Ok(TableData { columns, rows })
}

pub fn load_schema_descriptions(path: &Path) -> Result<Vec<ColumnDescriptor>, DatasetError> {
    if !path.exists() {
        return Err(DatasetError::NotFound(path.display().to_string()));
    }
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(normalise_column_name)
        .collect();
    let name_idx = headers
        .iter()
        .position(|h| h == "Column_Name")
        .ok_or(DatasetError::MissingSchemaColumn("Column_Name"))?;
    let description_idx = headers
        .iter()
        .position(|h| h == "Description")
        .ok_or(DatasetError::MissingSchemaColumn("Description"))?;
    let example_idx = headers.iter().position(|h| h == "Example");

    let mut descriptors = Vec::new();
    for record in reader.records() {
        let record = record?;
        let raw_name = record.get(name_idx).unwrap_or_default();
        if raw_name.trim().is_empty() {
            continue;
        }
        let description = record.get(description_idx).unwrap_or_default().trim();
        let example = example_idx
            .and_then(|i| record.get(i))
            .map(str::trim)
            .filter(|e| *e != "nan")
            .unwrap_or_default();
        descriptors.push(ColumnDescriptor::new(
            &normalise_column_name(raw_name),
            description,
            example,
        ));
    }

    info!(
        columns = descriptors.len(),
        path = %path.display(),
        "Loaded schema descriptions"
    );
    Ok(descriptors)
}
