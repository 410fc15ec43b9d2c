//! The `adaptest estimate` command.

use std::path::PathBuf;

use anyhow::Result;

use adaptest_bank::load_config_from;
use adaptest_core::engine::EngineRouter;
use adaptest_core::model::EstimationMethod;

use super::load_responses;

pub fn execute(
    responses_path: PathBuf,
    method: String,
    json: bool,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let method: EstimationMethod = method.parse().map_err(anyhow::Error::msg)?;
    let history = load_responses(&responses_path)?;

    let router = EngineRouter::from_config(&config.cat, config.enable_fallback)?;
    let routed = router.estimate_ability(&history, method)?;
    let estimate = routed.value;

    if json {
        let out = serde_json::json!({
            "theta": estimate.theta,
            "se": estimate.se,
            "method": estimate.method,
            "n_responses": estimate.n_responses,
            "degenerate": estimate.degenerate,
            "strategy": routed.strategy,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("theta: {:.4}", estimate.theta);
    println!("se: {:.4}", estimate.se);
    println!("method: {}", estimate.method);
    println!("responses: {}", estimate.n_responses);
    println!("engine: {}", routed.strategy);
    if estimate.degenerate {
        eprintln!("warning: likelihood underflowed; estimate is the prior");
    }
    Ok(())
}
