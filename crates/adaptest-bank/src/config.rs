//! Application configuration: file loading and environment overrides.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use adaptest_core::config::CatConfig;

/// Top-level adaptest configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptestConfig {
    /// Engine settings.
    #[serde(default)]
    pub cat: CatConfig,
    /// Item bank file or directory. `${VAR}` references are expanded.
    #[serde(default)]
    pub item_bank: Option<String>,
    /// Route to the simplified engine when the primary is unavailable.
    #[serde(default = "default_true")]
    pub enable_fallback: bool,
    /// Max concurrent simulated sessions.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Output directory for session reports.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_true() -> bool {
    true
}
fn default_parallelism() -> usize {
    4
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./adaptest-results")
}

impl Default for AdaptestConfig {
    fn default() -> Self {
        Self {
            cat: CatConfig::default(),
            item_bank: None,
            enable_fallback: true,
            parallelism: default_parallelism(),
            output_dir: default_output_dir(),
        }
    }
}

impl AdaptestConfig {
    /// The configured item bank path with `${VAR}` references resolved.
    pub fn item_bank_path(&self) -> Option<PathBuf> {
        self.item_bank
            .as_deref()
            .map(resolve_env_vars)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
///
/// Each reference is expanded once; substituted values are not rescanned.
fn resolve_env_vars(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else {
            break;
        };
        result.push_str(&rest[..start]);
        let var_name = &rest[start + 2..start + end];
        result.push_str(&std::env::var(var_name).unwrap_or_default());
        rest = &rest[start + end + 1..];
    }
    result.push_str(rest);
    result
}

fn parse_override<T: FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid value for {name}: {value:?} ({e})"))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("invalid value for {name}: {value:?} (expected true or false)"),
    }
}

/// Apply `CAT_*` and `ADAPTEST_*` overrides using `lookup` to read variables.
pub fn apply_env_overrides(
    config: &mut AdaptestConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    let cat = &mut config.cat;
    if let Some(v) = lookup("CAT_MAX_ITEMS") {
        cat.max_items = parse_override("CAT_MAX_ITEMS", &v)?;
    }
    if let Some(v) = lookup("CAT_MIN_ITEMS") {
        cat.min_items = parse_override("CAT_MIN_ITEMS", &v)?;
    }
    if let Some(v) = lookup("CAT_TARGET_SE") {
        cat.target_se = parse_override("CAT_TARGET_SE", &v)?;
    }
    if let Some(v) = lookup("CAT_THETA_MIN") {
        cat.theta_bounds.min = parse_override("CAT_THETA_MIN", &v)?;
    }
    if let Some(v) = lookup("CAT_THETA_MAX") {
        cat.theta_bounds.max = parse_override("CAT_THETA_MAX", &v)?;
    }
    if let Some(v) = lookup("CAT_BASE_SCORE") {
        cat.base_score = parse_override("CAT_BASE_SCORE", &v)?;
    }
    if let Some(v) = lookup("CAT_THETA_MULTIPLIER") {
        cat.theta_multiplier = parse_override("CAT_THETA_MULTIPLIER", &v)?;
    }
    if let Some(v) = lookup("CAT_ENABLE_FALLBACK") {
        config.enable_fallback = parse_bool("CAT_ENABLE_FALLBACK", &v)?;
    }
    if let Some(v) = lookup("ADAPTEST_ITEM_BANK") {
        config.item_bank = Some(v);
    }
    Ok(())
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `adaptest.toml` in the current directory
/// 2. `~/.config/adaptest/config.toml`
///
/// Environment variables override file values; see [`apply_env_overrides`].
pub fn load_config() -> Result<AdaptestConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<AdaptestConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("adaptest.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match &config_path {
        Some(path) => parse_config_file(path)?,
        None => AdaptestConfig::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    config
        .cat
        .validate()
        .context("configuration is invalid")?;

    tracing::debug!(
        path = ?config_path,
        max_items = config.cat.max_items,
        target_se = config.cat.target_se,
        "configuration loaded"
    );
    Ok(config)
}

fn parse_config_file(path: &Path) -> Result<AdaptestConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    toml::from_str::<AdaptestConfig>(&content)
        .with_context(|| format!("failed to parse config: {}", path.display()))
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("adaptest"))
}
