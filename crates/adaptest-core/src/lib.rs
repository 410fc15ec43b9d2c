//! adaptest-core: IRT estimation, item selection, and session orchestration.
//!
//! This crate defines the data model, the 3PL response model, the posterior
//! estimator, item selection, the stopping rule, and the session state machine
//! that the rest of adaptest builds on.

pub mod bank;
pub mod config;
pub mod engine;
pub mod error;
pub mod irt;
pub mod model;
pub mod parser;
pub mod posterior;
pub mod report;
pub mod scoring;
pub mod selection;
pub mod session;
pub mod simulation;
pub mod stopping;
pub mod traits;

pub use error::{CatError, ErrorKind};
