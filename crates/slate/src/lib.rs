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

pub mod bootstrap;
pub mod config;
pub mod dataset;
pub mod extract;
pub mod llm;
pub mod schema;
pub mod workflow;

pub use bootstrap::{build_engine, BootstrapError};
pub use config::SlateConfig;
pub use dataset::executor::{ExecutionError, ResultSet, TabularExecutor};
pub use llm::contracts::{CapabilityError, CapabilityResult};
pub use llm::core::TextGenerator;
pub use schema::{ColumnDescriptor, RankedColumn, SchemaStore};
pub use workflow::engine::{WorkflowEngine, WorkflowError};
pub use workflow::state::{SessionOutcome, SessionRecord, WorkflowPhase};
