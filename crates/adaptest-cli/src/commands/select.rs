//! The `adaptest select` command.

use std::path::PathBuf;

use anyhow::Result;

use adaptest_bank::load_config_from;
use adaptest_core::engine::EngineRouter;
use adaptest_core::model::SelectionMethod;
use adaptest_core::parser::load_item_bank;
use adaptest_core::selection::Selection;

use super::{bank_path, load_responses};

pub fn execute(
    bank: Option<PathBuf>,
    theta: f64,
    used: Option<String>,
    responses_path: Option<PathBuf>,
    method: Option<String>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let mut config = load_config_from(config_path.as_deref())?;
    if let Some(method) = method {
        config.cat.selection_method = method.parse::<SelectionMethod>().map_err(anyhow::Error::msg)?;
    }
    anyhow::ensure!(theta.is_finite(), "theta must be a finite number");

    let bank = load_item_bank(&bank_path(bank, &config)?)?;
    let used: Vec<String> = used
        .map(|s| {
            s.split(',')
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .collect()
        })
        .unwrap_or_default();
    let history = match responses_path {
        Some(path) => load_responses(&path)?,
        None => Vec::new(),
    };

    let router = EngineRouter::from_config(&config.cat, config.enable_fallback)?;
    let theta = config.cat.theta_bounds.clamp(theta);
    let routed = router.select_next_item(&bank, theta, &used, &history)?;

    match routed.value {
        Selection::Selected(selection) => {
            println!("item: {}", selection.item.id);
            println!(
                "params: a={} b={} g={} u={}",
                selection.item.params.a,
                selection.item.params.b,
                selection.item.params.g,
                selection.item.params.u
            );
            println!("probability: {:.4}", selection.probability);
            println!("information: {:.4}", selection.fisher_information);
            println!("expected information: {:.4}", selection.expected_fisher_information);
            println!("method: {}", selection.method);
            println!("available: {}", selection.available_items);
            println!("engine: {}", routed.strategy);
        }
        Selection::Exhausted => println!("No items available"),
    }
    Ok(())
}
