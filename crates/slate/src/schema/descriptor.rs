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

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub example: String,
}

impl ColumnDescriptor {
    pub fn new(name: &str, description: &str, example: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            example: example.to_string(),
        }
    }

    pub fn searchable_text(&self) -> String {
        let mut text = format!("{}. {}", self.name, self.description);
        if !self.example.is_empty() && self.example != "-" {
            text.push_str(&format!(" Example: {}", self.example));
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn searchable_text_includes_example_when_present() {
        let descriptor = ColumnDescriptor::new("Drugname", "Prescribed drug", "Latanoprost");
        assert_eq!(
            descriptor.searchable_text(),
            "Drugname. Prescribed drug Example: Latanoprost"
        );
    }

    #[test]
    fn searchable_text_skips_placeholder_example() {
        let descriptor = ColumnDescriptor::new("Drugname", "Prescribed drug", "-");
        assert_eq!(descriptor.searchable_text(), "Drugname. Prescribed drug");
    }
}
