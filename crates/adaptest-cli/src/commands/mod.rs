//! Subcommand implementations and the helpers they share.

pub mod estimate;
pub mod init;
pub mod report;
pub mod run;
pub mod score;
pub mod select;
pub mod simulate;
pub mod validate;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use adaptest_bank::{AdaptestConfig, MemoryItemRepository, MemorySessionStore};
use adaptest_core::engine::EngineRouter;
use adaptest_core::model::ObservedResponse;
use adaptest_core::session::SessionOrchestrator;

/// The item bank path from `--bank`, falling back to the config.
pub fn bank_path(bank: Option<PathBuf>, config: &AdaptestConfig) -> Result<PathBuf> {
    bank.or_else(|| config.item_bank_path()).context(
        "no item bank given; pass --bank or set item_bank in adaptest.toml (or ADAPTEST_ITEM_BANK)",
    )
}

pub fn load_repository(bank: Option<PathBuf>, config: &AdaptestConfig) -> Result<MemoryItemRepository> {
    MemoryItemRepository::from_path(&bank_path(bank, config)?)
}

/// Read a JSON array of `{a, b, g, u?, answer}` objects and check that
/// every entry describes a usable 3PL curve.
pub fn load_responses(path: &Path) -> Result<Vec<ObservedResponse>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read responses from {}", path.display()))?;
    let history: Vec<ObservedResponse> = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse responses JSON: {}", path.display()))?;
    for (i, response) in history.iter().enumerate() {
        response
            .params
            .validate(&format!("response #{}", i + 1))
            .with_context(|| format!("invalid responses in {}", path.display()))?;
    }
    Ok(history)
}

/// An orchestrator over an in-memory store, plus the store itself.
pub fn build_orchestrator(
    repository: MemoryItemRepository,
    config: &AdaptestConfig,
) -> Result<(SessionOrchestrator, Arc<MemorySessionStore>)> {
    let store = Arc::new(MemorySessionStore::new());
    let router = EngineRouter::from_config(&config.cat, config.enable_fallback)?;
    tracing::debug!(fallback = router.has_fallback(), "engine router ready");
    let orchestrator =
        SessionOrchestrator::new(Arc::new(repository), store.clone(), router, &config.cat);
    Ok((orchestrator, store))
}
