//! Core data model types for adaptest.
//!
//! These are the types shared by the estimator, the item selector, and the
//! session orchestrator: calibrated items, answered responses, and the
//! per-session state.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CatError;

/// 3PL parameters of a calibrated item.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ItemParams {
    /// Discrimination.
    pub a: f64,
    /// Difficulty.
    pub b: f64,
    /// Pseudo-guessing lower asymptote.
    #[serde(default)]
    pub g: f64,
    /// Upper asymptote.
    #[serde(default = "default_upper")]
    pub u: f64,
}

fn default_upper() -> f64 {
    1.0
}

impl ItemParams {
    /// Parameters with the default upper asymptote of 1.0.
    pub fn new(a: f64, b: f64, g: f64) -> Self {
        Self { a, b, g, u: 1.0 }
    }

    pub fn with_upper(mut self, u: f64) -> Self {
        self.u = u;
        self
    }

    /// Check that the parameters describe a usable 3PL curve.
    pub fn validate(&self, item_id: &str) -> Result<(), CatError> {
        let invalid = |reason: String| CatError::InvalidParameters {
            item_id: item_id.to_string(),
            reason,
        };
        if ![self.a, self.b, self.g, self.u].iter().all(|v| v.is_finite()) {
            return Err(invalid("parameters must be finite".into()));
        }
        if !(0.0..1.0).contains(&self.g) {
            return Err(invalid(format!("g must be in [0, 1), got {}", self.g)));
        }
        if self.u <= self.g || self.u > 1.0 {
            return Err(invalid(format!(
                "u must be in (g, 1], got u={} with g={}",
                self.u, self.g
            )));
        }
        Ok(())
    }
}

/// A calibrated item in the bank. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Unique identifier.
    pub id: String,
    /// 3PL parameters.
    #[serde(flatten)]
    pub params: ItemParams,
}

impl Item {
    pub fn new(id: impl Into<String>, params: ItemParams) -> Self {
        Self {
            id: id.into(),
            params,
        }
    }
}

/// A binary item outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Answer {
    Incorrect,
    Correct,
}

impl Answer {
    pub fn is_correct(self) -> bool {
        self == Answer::Correct
    }
}

impl TryFrom<u8> for Answer {
    type Error = CatError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Answer::Incorrect),
            1 => Ok(Answer::Correct),
            other => Err(CatError::InvalidAnswer(other)),
        }
    }
}

impl From<Answer> for u8 {
    fn from(answer: Answer) -> Self {
        match answer {
            Answer::Incorrect => 0,
            Answer::Correct => 1,
        }
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u8::from(*self))
    }
}

/// An item's parameters paired with the observed answer.
///
/// This is the only input the estimator needs; it deliberately carries no
/// session identity so estimation stays a pure function of the history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservedResponse {
    #[serde(flatten)]
    pub params: ItemParams,
    pub answer: Answer,
}

impl ObservedResponse {
    pub fn new(params: ItemParams, answer: Answer) -> Self {
        Self { params, answer }
    }
}

/// A stored response within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// The answered item.
    pub item_id: String,
    /// Snapshot of the item parameters at answer time.
    pub params: ItemParams,
    /// Observed outcome.
    pub answer: Answer,
    /// Theta before this response was scored.
    pub theta_before: f64,
    /// Theta after re-estimation.
    pub theta_after: f64,
    /// Standard error after re-estimation.
    pub se_after: f64,
    /// 1-based administration order.
    pub order: u32,
    /// Probability of a correct answer at `theta_before`.
    pub probability: f64,
    /// Fisher information of the item at `theta_before`.
    pub information: f64,
    /// When the answer was recorded.
    pub answered_at: DateTime<Utc>,
}

impl Response {
    pub fn observed(&self) -> ObservedResponse {
        ObservedResponse::new(self.params, self.answer)
    }
}

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The standard error dropped below the target.
    SeThreshold,
    /// The maximum test length was reached.
    MaxItems,
    /// Every item in the bank has been administered.
    NoItemsAvailable,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::SeThreshold => write!(f, "SE threshold"),
            StopReason::MaxItems => write!(f, "max items"),
            StopReason::NoItemsAvailable => write!(f, "no items available"),
        }
    }
}

/// Point estimator applied to the posterior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimationMethod {
    /// Posterior mode, used for live re-estimation.
    Map,
    /// Posterior mean, used for final scoring.
    Eap,
}

impl fmt::Display for EstimationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EstimationMethod::Map => write!(f, "MAP"),
            EstimationMethod::Eap => write!(f, "EAP"),
        }
    }
}

impl FromStr for EstimationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "map" => Ok(EstimationMethod::Map),
            "eap" => Ok(EstimationMethod::Eap),
            other => Err(format!("unknown estimation method: {other}")),
        }
    }
}

/// Item selection criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMethod {
    /// Expected Fisher information over the posterior.
    #[default]
    Efi,
    /// Fisher information at the point estimate.
    Mi,
}

impl fmt::Display for SelectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionMethod::Efi => write!(f, "EFI"),
            SelectionMethod::Mi => write!(f, "MI"),
        }
    }
}

impl FromStr for SelectionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "efi" => Ok(SelectionMethod::Efi),
            "mi" | "fisher" => Ok(SelectionMethod::Mi),
            other => Err(format!("unknown selection method: {other}")),
        }
    }
}

/// Which engine served a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStrategy {
    Primary,
    Fallback,
}

impl fmt::Display for EngineStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineStrategy::Primary => write!(f, "primary"),
            EngineStrategy::Fallback => write!(f, "fallback"),
        }
    }
}

/// Mutable state of one test session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Opaque unique identifier.
    pub session_id: String,
    /// Current ability estimate.
    pub theta: f64,
    /// Current standard error.
    pub se: f64,
    /// Administered item ids in administration order.
    pub used_items: Vec<String>,
    /// Item presented to the examinee and not yet answered.
    #[serde(default)]
    pub pending_item: Option<String>,
    /// Whether the session reached its terminal state.
    pub completed: bool,
    /// Set exactly once, when the session becomes terminal.
    #[serde(default)]
    pub stop_reason: Option<StopReason>,
    /// Reported score, set on completion.
    #[serde(default)]
    pub final_score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    /// A fresh session at the prior: theta 0, SE 1.
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            theta: 0.0,
            se: 1.0,
            used_items: Vec::new(),
            pending_item: None,
            completed: false,
            stop_reason: None,
            final_score: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 1-based number of the item currently presented.
    pub fn item_number(&self) -> usize {
        self.used_items.len()
    }
}

/// Everything persisted for a session, committed as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub state: SessionState,
    /// Responses ordered by `order`.
    pub responses: Vec<Response>,
}

impl SessionRecord {
    pub fn new(state: SessionState) -> Self {
        Self {
            state,
            responses: Vec::new(),
        }
    }

    /// The response history in administration order, as estimator input.
    pub fn observed(&self) -> Vec<ObservedResponse> {
        self.responses.iter().map(Response::observed).collect()
    }
}
