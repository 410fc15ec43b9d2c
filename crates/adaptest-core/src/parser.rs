//! Item bank file parser.
//!
//! Item banks are stored as TOML (`[bank]` header plus `[[items]]`) or JSON
//! (a bare array of items, or an object with `bank` and `items`). The format
//! is chosen by file extension.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::bank::ItemBank;
use crate::config::ThetaBounds;
use crate::model::{Item, ItemParams};

/// A parsed, not yet validated item bank file.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemBankFile {
    pub id: String,
    pub name: String,
    pub description: String,
    pub items: Vec<Item>,
}

#[derive(Debug, Default, Deserialize)]
struct BankHeader {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct RawBankFile {
    #[serde(default)]
    bank: BankHeader,
    #[serde(default)]
    items: Vec<RawItem>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawJsonBank {
    List(Vec<RawItem>),
    File(RawBankFile),
}

#[derive(Debug, Deserialize)]
struct RawItem {
    id: String,
    a: f64,
    b: f64,
    #[serde(default)]
    g: f64,
    #[serde(default = "default_upper")]
    u: f64,
}

fn default_upper() -> f64 {
    1.0
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "items".to_string())
}

fn build(raw: RawBankFile, source_path: &Path) -> ItemBankFile {
    let id = raw.bank.id.unwrap_or_else(|| file_stem(source_path));
    let name = raw.bank.name.unwrap_or_else(|| id.clone());
    let items = raw
        .items
        .into_iter()
        .map(|i| {
            Item::new(
                i.id,
                ItemParams {
                    a: i.a,
                    b: i.b,
                    g: i.g,
                    u: i.u,
                },
            )
        })
        .collect();
    ItemBankFile {
        id,
        name,
        description: raw.bank.description,
        items,
    }
}

fn is_bank_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == "toml" || ext == "json")
}

/// Parse a single TOML or JSON item bank file.
pub fn parse_item_bank(path: &Path) -> Result<ItemBankFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read item bank file: {}", path.display()))?;

    parse_item_bank_str(&content, path)
}

/// Parse item bank content; `source_path` selects the format and names errors.
pub fn parse_item_bank_str(content: &str, source_path: &Path) -> Result<ItemBankFile> {
    let is_json = source_path.extension().is_some_and(|ext| ext == "json");
    let raw = if is_json {
        let parsed: RawJsonBank = serde_json::from_str(content)
            .with_context(|| format!("failed to parse JSON: {}", source_path.display()))?;
        match parsed {
            RawJsonBank::List(items) => RawBankFile {
                bank: BankHeader::default(),
                items,
            },
            RawJsonBank::File(file) => file,
        }
    } else {
        toml::from_str(content)
            .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?
    };

    Ok(build(raw, source_path))
}

/// Recursively load all item bank files from a directory.
///
/// Files that fail to parse are skipped with a warning.
pub fn load_bank_directory(dir: &Path) -> Result<Vec<ItemBankFile>> {
    let mut banks = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.path());

    for entry in entries {
        let path = entry.path();

        if path.is_dir() {
            banks.extend(load_bank_directory(&path)?);
        } else if is_bank_file(&path) {
            match parse_item_bank(&path) {
                Ok(bank) => banks.push(bank),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(banks)
}

/// Load a file or a directory of files into one validated [`ItemBank`].
pub fn load_item_bank(path: &Path) -> Result<ItemBank> {
    let files = if path.is_dir() {
        load_bank_directory(path)?
    } else {
        vec![parse_item_bank(path)?]
    };

    let items: Vec<Item> = files.into_iter().flat_map(|f| f.items).collect();
    anyhow::ensure!(!items.is_empty(), "no items found in {}", path.display());

    let bank = ItemBank::new(items)
        .with_context(|| format!("invalid item bank: {}", path.display()))?;
    tracing::debug!(path = %path.display(), items = bank.len(), "loaded item bank");
    Ok(bank)
}

/// A warning from item bank validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationWarning {
    /// The item ID (if applicable).
    pub item_id: Option<String>,
    /// Warning message.
    pub message: String,
}

impl ValidationWarning {
    fn item(item_id: &str, message: impl Into<String>) -> Self {
        Self {
            item_id: Some(item_id.to_string()),
            message: message.into(),
        }
    }
}

/// Check an item bank file for common problems.
pub fn validate_item_bank(file: &ItemBankFile, bounds: &ThetaBounds) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    if file.items.is_empty() {
        warnings.push(ValidationWarning {
            item_id: None,
            message: "item bank has no items".into(),
        });
    }

    let mut seen_ids = HashSet::new();
    for item in &file.items {
        if !seen_ids.insert(&item.id) {
            warnings.push(ValidationWarning::item(
                &item.id,
                format!("duplicate item ID: {}", item.id),
            ));
        }
    }

    for item in &file.items {
        let p = &item.params;
        if !(p.a.is_finite() && p.b.is_finite() && p.g.is_finite() && p.u.is_finite()) {
            warnings.push(ValidationWarning::item(&item.id, "parameters must be finite"));
            continue;
        }
        if p.a <= 0.0 {
            warnings.push(ValidationWarning::item(
                &item.id,
                format!("discrimination a={} is not positive", p.a),
            ));
        }
        if !(0.0..1.0).contains(&p.g) {
            warnings.push(ValidationWarning::item(
                &item.id,
                format!("guessing g={} is outside [0, 1)", p.g),
            ));
        }
        if p.u <= p.g || p.u > 1.0 {
            warnings.push(ValidationWarning::item(
                &item.id,
                format!("upper asymptote u={} must be in (g, 1]", p.u),
            ));
        }
        if !bounds.contains(p.b) {
            warnings.push(ValidationWarning::item(
                &item.id,
                format!(
                    "difficulty b={} is outside theta bounds [{}, {}]",
                    p.b, bounds.min, bounds.max
                ),
            ));
        }
    }

    warnings
}
