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

use slate::{build_engine, SlateConfig};
use std::io::{self, Write};
use std::path::Path;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    dotenvy::dotenv().ok();
    info!("Environment variables loaded");

    let config_path = std::env::var("SLATE_CONFIG").unwrap_or_else(|_| "slate.toml".to_string());
    let config = SlateConfig::load(Some(Path::new(&config_path)))?;

    info!("Loading dataset and building the workflow engine");
    let engine = build_engine(&config).await?;

    println!("\nClinic Query Interactive Demo");
    println!("═══════════════════════════════════════════════════════════════");
    println!("Ask natural-language questions about the loaded patient dataset.");
    println!();
    println!("Examples:");
    println!("   \"Count patients with Diabetic Retinopathy\"");
    println!("   \"What drug is patient E5F99 taking?\"");
    println!("   \"Show patients from the retina clinic\"");
    println!();
    println!("Each question is planned, matched against the schema, translated");
    println!("to SQL, executed and summarised. Failed statements are repaired");
    println!("automatically for a bounded number of attempts.");
    println!();
    println!("Tips:");
    println!("   - Use exact patient identifiers where you know them.");
    println!("   - Type 'exit' to quit.");
    println!("═══════════════════════════════════════════════════════════════");

    loop {
        print!("\nEnter your question: ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        if input.eq_ignore_ascii_case("exit") {
            println!("Goodbye!");
            break;
        }

        println!("{}", "─".repeat(80));

        match engine.run(input).await {
            Ok(outcome) => {
                if !outcome.plan.is_empty() {
                    println!("Plan:");
                    println!("{}", outcome.plan.rendered_steps());
                }
                if !outcome.generated_query.is_empty() {
                    println!("\nSQL: {}", outcome.generated_query);
                }
                if outcome.error.is_empty() {
                    println!(
                        "\nRows returned: {} ({} columns)",
                        outcome.result_rows.row_count(),
                        outcome.result_rows.column_count()
                    );
                    println!("\n{}", outcome.explanation);
                } else {
                    println!("\nThe question could not be answered: {}", outcome.error);
                    println!("This might be due to:");
                    println!("   - Columns the dataset does not carry");
                    println!("   - Model output that never became a valid statement");
                    println!("   - The language model being unreachable");
                }
            }
            Err(e) => {
                println!("Fatal error while processing the question: {e}");
            }
        }

        println!("{}", "─".repeat(80));
    }

    Ok(())
}
