//! The `adaptest validate` command.

use std::path::PathBuf;

use anyhow::Result;

use adaptest_core::config::ThetaBounds;
use adaptest_core::parser::{load_bank_directory, parse_item_bank, validate_item_bank};

pub fn execute(bank_path: PathBuf) -> Result<()> {
    let files = if bank_path.is_dir() {
        load_bank_directory(&bank_path)?
    } else {
        vec![parse_item_bank(&bank_path)?]
    };

    let bounds = ThetaBounds::default();
    let mut total_warnings = 0;

    for file in &files {
        println!("Item bank: {} ({} items)", file.name, file.items.len());

        let warnings = validate_item_bank(file, &bounds);
        for w in &warnings {
            let prefix = w
                .item_id
                .as_ref()
                .map(|id| format!("  [{id}]"))
                .unwrap_or_else(|| "  ".to_string());
            println!("{prefix} WARNING: {}", w.message);
        }
        total_warnings += warnings.len();
    }

    if total_warnings == 0 {
        println!("All item banks valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
