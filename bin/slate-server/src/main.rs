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

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use slate::{build_engine, SlateConfig, WorkflowEngine};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Clone)]
struct AppState {
    engine: Arc<WorkflowEngine>,
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    query: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    rows: usize,
    columns: usize,
    capability_available: bool,
}

#[derive(Debug, Serialize)]
struct SchemaColumn {
    name: String,
    description: String,
    example: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    dotenvy::dotenv().ok();

    let config_path = std::env::var("SLATE_CONFIG").unwrap_or_else(|_| "slate.toml".to_string());
    let config = SlateConfig::load(Some(Path::new(&config_path)))?;
    let bind_addr = config.server.bind_addr.clone();

    info!("Initialising the query workflow engine");
    let engine = Arc::new(build_engine(&config).await?);
    let state = AppState { engine };

    let app = Router::new()
        .route("/health", get(health))
        .route("/api/query", post(process_query))
        .route("/api/schema/columns", get(schema_columns))
        .with_state(state);

    info!(addr = %bind_addr, "Slate server listening");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let capability_available = state.engine.generator_health().await;
    Json(HealthResponse {
        status: "ok",
        rows: state.engine.executor().row_count(),
        columns: state.engine.schema().len(),
        capability_available,
    })
}

async fn process_query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<slate::SessionOutcome>, (StatusCode, String)> {
    if request.query.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "query must not be empty".to_string()));
    }

    match state.engine.run(&request.query).await {
        Ok(outcome) => Ok(Json(outcome)),
        Err(e) => {
            error!(error = %e, "Query processing failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error processing query: {e}"),
            ))
        }
    }
}

async fn schema_columns(State(state): State<AppState>) -> Json<serde_json::Value> {
    let columns: Vec<SchemaColumn> = state
        .engine
        .schema()
        .descriptors()
        .iter()
        .map(|descriptor| SchemaColumn {
            name: descriptor.name.clone(),
            description: descriptor.description.clone(),
            example: descriptor.example.clone(),
        })
        .collect();
    Json(serde_json::json!({ "columns": columns }))
}
