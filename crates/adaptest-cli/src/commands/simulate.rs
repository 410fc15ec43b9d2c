//! The `adaptest simulate` command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use adaptest_bank::load_config_from;
use adaptest_core::simulation::{simulate_batch, ResponseModel, SimulationSummary};

use super::{build_orchestrator, load_repository};

fn parse_thetas(raw: &str) -> Result<Vec<f64>> {
    let thetas = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>()
                .ok()
                .filter(|t| t.is_finite())
                .with_context(|| format!("invalid true theta: {s:?}"))
        })
        .collect::<Result<Vec<_>>>()?;
    anyhow::ensure!(!thetas.is_empty(), "no true thetas given");
    Ok(thetas)
}

pub async fn execute(
    bank: Option<PathBuf>,
    true_theta: String,
    parallelism: Option<usize>,
    seed: u64,
    threshold: bool,
    json: bool,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let thetas = parse_thetas(&true_theta)?;
    let repository = load_repository(bank, &config)?;
    let (orchestrator, _store) = build_orchestrator(repository, &config)?;
    let parallelism = parallelism.unwrap_or(config.parallelism);
    let model = if threshold {
        ResponseModel::default()
    } else {
        ResponseModel::Bernoulli { seed }
    };

    eprintln!(
        "Simulating {} session(s), parallelism {parallelism}",
        thetas.len()
    );
    let summary = simulate_batch(
        Arc::new(orchestrator),
        model,
        &thetas,
        parallelism,
    )
    .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &SimulationSummary) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec!["True θ", "Estimated θ", "SE", "Score", "Items", "Stop"]);

    for run in &summary.runs {
        table.add_row(vec![
            Cell::new(format!("{:.2}", run.true_theta)),
            Cell::new(format!("{:.3}", run.estimated_theta)),
            Cell::new(format!("{:.3}", run.se)),
            Cell::new(format!("{:.1}", run.score)),
            Cell::new(run.items_administered),
            Cell::new(run.stop_reason),
        ]);
    }

    println!("{table}");
    println!(
        "bias: {:.4}  rmse: {:.4}  mean items: {:.1}  mean se: {:.3} ({}ms)",
        summary.bias, summary.rmse, summary.mean_items, summary.mean_se, summary.duration_ms
    );
}
