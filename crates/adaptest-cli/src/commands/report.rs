//! The `adaptest report` command.

use std::path::PathBuf;

use anyhow::Result;

use adaptest_core::report::SessionReport;

pub fn execute(input: PathBuf, format: String) -> Result<()> {
    let report = SessionReport::load_json(&input)?;

    match format.as_str() {
        "markdown" | "md" => println!("{}", report.to_markdown()),
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        "text" => {
            let state = &report.session;
            println!("session: {}", state.session_id);
            println!("completed: {}", state.completed);
            if let Some(reason) = state.stop_reason {
                println!("stop reason: {reason}");
            }
            if let Some(score) = state.final_score {
                println!("score: {score:.1}");
            }
            println!("theta: {:.3}", state.theta);
            println!("se: {:.3}", state.se);
            println!(
                "items: {} ({} correct)",
                report.summary.items_administered, report.summary.correct
            );
        }
        other => anyhow::bail!("unknown format: {other} (expected text, markdown or json)"),
    }
    Ok(())
}
