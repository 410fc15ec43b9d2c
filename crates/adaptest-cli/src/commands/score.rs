//! The `adaptest score` command.

use std::path::PathBuf;

use anyhow::Result;

use adaptest_bank::load_config_from;
use adaptest_core::scoring::ScoreScale;

pub fn execute(theta: f64, scale: Option<String>, config_path: Option<PathBuf>) -> Result<()> {
    let mut config = load_config_from(config_path.as_deref())?;
    if let Some(scale) = scale {
        config.cat.score_scale = scale.parse::<ScoreScale>().map_err(anyhow::Error::msg)?;
    }
    anyhow::ensure!(theta.is_finite(), "theta must be a finite number");

    let theta = config.cat.theta_bounds.clamp(theta);
    let score = config.cat.scorer().score(theta);

    println!("theta: {theta:.3}");
    println!("score: {score:.2}");
    println!("scale: {}", config.cat.score_scale);
    Ok(())
}
