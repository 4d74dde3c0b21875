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

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Could not find a valid statement in the response")]
    StatementNotFound,
}

const LEADING_KEYWORD: &str = "SELECT";
const MIN_STATEMENT_LEN: usize = 10;
const CLAUSE_KEYWORDS: [&str; 7] = [
    "SELECT", "FROM", "WHERE", "GROUP", "ORDER", "LIMIT", "HAVING",
];
const FILLER_PREFIXES: [&str; 5] = ["THE", "HERE", "NOTE", "IMPORTANT", "REMEMBER"];

lazy_static! {
    static ref MARKDOWN_JSON_REGEX: Regex =
        Regex::new(r"(?s)```(?:json)?\s*(\{.*\})\s*```").unwrap();
    static ref FENCED_BLOCK_REGEX: Regex =
        Regex::new(r"(?s)```[a-zA-Z]*[ \t]*\r?\n?(.*?)```").unwrap();
    static ref TERMINATED_SPAN_REGEX: Regex = Regex::new(r"(?si)\b(select\s.*?);").unwrap();
    static ref PARAGRAPH_SPAN_REGEX: Regex =
        Regex::new(r"(?si)\b(select\s.*?)(?:\n\s*\n|\n[A-Z][a-z]+:|\z)").unwrap();
    static ref WHITESPACE_RUN_REGEX: Regex = Regex::new(r"\s+").unwrap();
}

pub fn extract_json_object(text: &str) -> Option<String> {
    if let Some(captures) = MARKDOWN_JSON_REGEX.captures(text) {
        if let Some(json_match) = captures.get(1) {
            return Some(json_match.as_str().to_string());
        }
    }
    balanced_region(text, '{', '}')
}

pub fn extract_json_array(text: &str) -> Option<String> {
    balanced_region(text, '[', ']')
}

// First balanced open..close region, ignoring delimiters inside string
// literals.
fn balanced_region(text: &str, open: char, close: char) -> Option<String> {
    let start = text.find(open)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        if c == '"' {
            in_string = true;
        } else if c == open {
            depth += 1;
        } else if c == close {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return Some(text[start..start + offset + c.len_utf8()].to_string());
            }
        }
    }
    None
}

type Strategy = fn(&str) -> Option<String>;

const STATEMENT_STRATEGIES: [Strategy; 4] = [
    fenced_block,
    terminated_span,
    paragraph_span,
    line_reconstruction,
];

pub fn extract_statement(text: &str) -> Result<String, ExtractionError> {
    for strategy in STATEMENT_STRATEGIES {
        if let Some(candidate) = strategy(text) {
            let cleaned = tidy_statement(&candidate);
            if is_minimally_valid(&cleaned) {
                return Ok(cleaned);
            }
        }
    }
    Err(ExtractionError::StatementNotFound)
}

fn fenced_block(text: &str) -> Option<String> {
    FENCED_BLOCK_REGEX
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().trim().to_string())
}

fn terminated_span(text: &str) -> Option<String> {
    TERMINATED_SPAN_REGEX
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().trim().to_string())
}

fn paragraph_span(text: &str) -> Option<String> {
    PARAGRAPH_SPAN_REGEX
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().trim().to_string())
}

fn line_reconstruction(text: &str) -> Option<String> {
    let mut captured: Vec<String> = Vec::new();
    let mut in_statement = false;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            if in_statement {
                break;
            }
            continue;
        }
        let upper = line.to_uppercase();
        if upper.starts_with(LEADING_KEYWORD) {
            in_statement = true;
            captured = vec![line.to_string()];
        } else if in_statement {
            if CLAUSE_KEYWORDS.iter().any(|kw| upper.starts_with(kw)) {
                captured.push(line.to_string());
            } else if let Some(idx) = line.find(';') {
                captured.push(line[..idx].trim().to_string());
                break;
            } else if is_filler_line(&upper) {
                break;
            } else {
                captured.push(line.to_string());
            }
        }
    }
    if captured.is_empty() {
        None
    } else {
        Some(captured.join(" "))
    }
}

fn is_filler_line(upper: &str) -> bool {
    FILLER_PREFIXES.iter().any(|word| {
        upper
            .strip_prefix(word)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(' ') || rest.starts_with(':'))
    })
}

fn tidy_statement(candidate: &str) -> String {
    let without_fences = candidate.replace("```sql", "").replace("```", "");
    let collapsed = WHITESPACE_RUN_REGEX.replace_all(without_fences.trim(), " ");
    collapsed.trim_end_matches(';').trim().to_string()
}

fn is_minimally_valid(statement: &str) -> bool {
    statement.len() >= MIN_STATEMENT_LEN
        && statement.to_uppercase().starts_with(LEADING_KEYWORD)
}
