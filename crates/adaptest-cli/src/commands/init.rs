//! The `adaptest init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    if Path::new("adaptest.toml").exists() {
        println!("adaptest.toml already exists, skipping.");
    } else {
        std::fs::write("adaptest.toml", SAMPLE_CONFIG)?;
        println!("Created adaptest.toml");
    }

    std::fs::create_dir_all("item-banks")?;
    let example_path = Path::new("item-banks/example.toml");
    if example_path.exists() {
        println!("item-banks/example.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_ITEM_BANK)?;
        println!("Created item-banks/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Replace item-banks/example.toml with your calibrated items");
    println!("  2. Run: adaptest validate --bank item-banks/example.toml");
    println!("  3. Run: adaptest run");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# adaptest configuration

item_bank = "item-banks/example.toml"
enable_fallback = true
parallelism = 4
output_dir = "./adaptest-results"

[cat]
max_items = 30
min_items = 10
target_se = 0.25
base_score = 100.0
theta_multiplier = 15.0
score_scale = "linear"
selection_method = "efi"

[cat.theta_bounds]
min = -6.0
max = 6.0

[cat.grid]
min = -4.0
max = 4.0
step = 0.1
"#;

const EXAMPLE_ITEM_BANK: &str = r#"[bank]
id = "example"
name = "Example Item Bank"
description = "A small calibrated bank to get started"

[[items]]
id = "EX01"
a = 1.2
b = -2.0
g = 0.2

[[items]]
id = "EX02"
a = 1.0
b = -1.5
g = 0.2

[[items]]
id = "EX03"
a = 1.4
b = -1.0
g = 0.2

[[items]]
id = "EX04"
a = 0.9
b = -0.5
g = 0.25

[[items]]
id = "EX05"
a = 1.6
b = 0.0
g = 0.2

[[items]]
id = "EX06"
a = 1.1
b = 0.5
g = 0.2

[[items]]
id = "EX07"
a = 1.3
b = 1.0
g = 0.15

[[items]]
id = "EX08"
a = 1.0
b = 1.5
g = 0.2

[[items]]
id = "EX09"
a = 1.5
b = 2.0
g = 0.2
u = 0.98

[[items]]
id = "EX10"
a = 0.8
b = 2.5
g = 0.25
"#;
