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

use crate::workflow::state::{PhaseOutcome, WorkflowPhase};

pub fn next_phase(phase: WorkflowPhase, outcome: PhaseOutcome) -> WorkflowPhase {
    match (phase, outcome) {
        (WorkflowPhase::Plan, _) => WorkflowPhase::Retrieve,
        (WorkflowPhase::Retrieve, _) => WorkflowPhase::Generate,
        (WorkflowPhase::Generate, _) => WorkflowPhase::Validate,
        (WorkflowPhase::Validate, PhaseOutcome::Retry) => WorkflowPhase::Generate,
        (WorkflowPhase::Validate, _) | (WorkflowPhase::Terminated, _) => WorkflowPhase::Terminated,
    }
}
