//! adaptest-bank: collaborators for the adaptest session orchestrator.
//!
//! Provides in-memory implementations of `ItemRepository` and `SessionStore`,
//! file and environment configuration loading, and a scripted engine for
//! exercising the primary/fallback router.

pub mod config;
pub mod error;
pub mod memory;
pub mod scripted;

pub use config::{load_config, load_config_from, AdaptestConfig};
pub use error::BankError;
pub use memory::{MemoryItemRepository, MemorySessionStore};
pub use scripted::ScriptedEngine;
