//! CAT engine strategies and the primary/fallback router.
//!
//! An engine is a synchronous, stateless bundle of estimator, selector,
//! stopping rule and scorer. Engines never see session identity; everything
//! they need is passed in per call.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::bank::ItemBank;
use crate::config::CatConfig;
use crate::error::CatError;
use crate::model::{EngineStrategy, EstimationMethod, ObservedResponse, SelectionMethod};
use crate::posterior::{AbilityEstimate, MapError, PosteriorEstimator};
use crate::scoring::Scorer;
use crate::selection::{ItemSelector, Selection};
use crate::stopping::{StopDecision, StoppingRule};

/// Final EAP estimate and its reported score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FinalScore {
    pub theta: f64,
    pub se: f64,
    pub score: f64,
    pub n_responses: usize,
}

/// The operations a CAT engine exposes.
pub trait CatEngine: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Capability check consulted by [`EngineRouter`] before every call.
    fn is_available(&self) -> bool {
        true
    }

    /// First item of a test: theta 0, nothing used, no history.
    fn select_first_item(&self, bank: &ItemBank) -> Result<Selection, CatError>;

    fn estimate_ability(
        &self,
        history: &[ObservedResponse],
        method: EstimationMethod,
    ) -> Result<AbilityEstimate, CatError>;

    fn select_next_item(
        &self,
        bank: &ItemBank,
        theta: f64,
        used: &[String],
        history: &[ObservedResponse],
    ) -> Result<Selection, CatError>;

    fn should_stop(
        &self,
        history: &[ObservedResponse],
        se: f64,
        used: &[String],
        bank: &ItemBank,
    ) -> Result<StopDecision, CatError>;

    /// EAP estimate of the full history mapped onto the score scale.
    fn finalize_score(&self, history: &[ObservedResponse]) -> Result<FinalScore, CatError>;
}

/// Shared implementation behind the built-in engines.
#[derive(Debug, Clone)]
struct EngineCore {
    estimator: PosteriorEstimator,
    selector: ItemSelector,
    stopping: StoppingRule,
    scorer: Scorer,
}

impl EngineCore {
    fn new(
        config: &CatConfig,
        selection: SelectionMethod,
        map_error: MapError,
    ) -> Result<Self, CatError> {
        config.validate()?;
        let grid = config.grid.build()?;
        Ok(Self {
            estimator: PosteriorEstimator::new(grid, config.theta_bounds).with_map_error(map_error),
            selector: ItemSelector::new(selection),
            stopping: config.stopping_rule(),
            scorer: config.scorer(),
        })
    }

    fn select(
        &self,
        bank: &ItemBank,
        theta: f64,
        used: &[String],
        history: &[ObservedResponse],
    ) -> Selection {
        let posterior = self.estimator.posterior(history);
        self.selector.select(bank, used, theta, &posterior)
    }

    fn select_first_item(&self, bank: &ItemBank) -> Selection {
        self.select(bank, 0.0, &[], &[])
    }

    fn estimate(&self, history: &[ObservedResponse], method: EstimationMethod) -> AbilityEstimate {
        self.estimator.estimate(history, method)
    }

    fn should_stop(
        &self,
        history: &[ObservedResponse],
        se: f64,
        used: &[String],
        bank: &ItemBank,
    ) -> StopDecision {
        self.stopping
            .evaluate(history.len(), se, bank.available_count(used))
    }

    fn finalize(&self, history: &[ObservedResponse]) -> FinalScore {
        let estimate = self.estimator.estimate(history, EstimationMethod::Eap);
        FinalScore {
            theta: estimate.theta,
            se: estimate.se,
            score: self.scorer.score(estimate.theta),
            n_responses: estimate.n_responses,
        }
    }
}

/// The primary engine: EFI selection (by default) and posterior-SD errors.
#[derive(Debug, Clone)]
pub struct PosteriorEngine {
    core: EngineCore,
}

impl PosteriorEngine {
    pub fn new(config: &CatConfig) -> Result<Self, CatError> {
        Ok(Self {
            core: EngineCore::new(config, config.selection_method, MapError::PosteriorSd)?,
        })
    }
}

impl CatEngine for PosteriorEngine {
    fn name(&self) -> &str {
        "posterior"
    }

    fn select_first_item(&self, bank: &ItemBank) -> Result<Selection, CatError> {
        Ok(self.core.select_first_item(bank))
    }

    fn estimate_ability(
        &self,
        history: &[ObservedResponse],
        method: EstimationMethod,
    ) -> Result<AbilityEstimate, CatError> {
        Ok(self.core.estimate(history, method))
    }

    fn select_next_item(
        &self,
        bank: &ItemBank,
        theta: f64,
        used: &[String],
        history: &[ObservedResponse],
    ) -> Result<Selection, CatError> {
        Ok(self.core.select(bank, theta, used, history))
    }

    fn should_stop(
        &self,
        history: &[ObservedResponse],
        se: f64,
        used: &[String],
        bank: &ItemBank,
    ) -> Result<StopDecision, CatError> {
        Ok(self.core.should_stop(history, se, used, bank))
    }

    fn finalize_score(&self, history: &[ObservedResponse]) -> Result<FinalScore, CatError> {
        Ok(self.core.finalize(history))
    }
}

/// The fallback engine: MI selection and test-information errors for MAP.
#[derive(Debug, Clone)]
pub struct SimplifiedEngine {
    core: EngineCore,
}

impl SimplifiedEngine {
    pub fn new(config: &CatConfig) -> Result<Self, CatError> {
        Ok(Self {
            core: EngineCore::new(config, SelectionMethod::Mi, MapError::TestInformation)?,
        })
    }
}

impl CatEngine for SimplifiedEngine {
    fn name(&self) -> &str {
        "simplified"
    }

    fn select_first_item(&self, bank: &ItemBank) -> Result<Selection, CatError> {
        Ok(self.core.select_first_item(bank))
    }

    fn estimate_ability(
        &self,
        history: &[ObservedResponse],
        method: EstimationMethod,
    ) -> Result<AbilityEstimate, CatError> {
        Ok(self.core.estimate(history, method))
    }

    fn select_next_item(
        &self,
        bank: &ItemBank,
        theta: f64,
        used: &[String],
        history: &[ObservedResponse],
    ) -> Result<Selection, CatError> {
        Ok(self.core.select(bank, theta, used, history))
    }

    fn should_stop(
        &self,
        history: &[ObservedResponse],
        se: f64,
        used: &[String],
        bank: &ItemBank,
    ) -> Result<StopDecision, CatError> {
        Ok(self.core.should_stop(history, se, used, bank))
    }

    fn finalize_score(&self, history: &[ObservedResponse]) -> Result<FinalScore, CatError> {
        Ok(self.core.finalize(history))
    }
}

/// A result tagged with the engine strategy that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Routed<T> {
    pub value: T,
    pub strategy: EngineStrategy,
}

/// Routes each call to the primary engine, or to the fallback when the
/// primary is unavailable or fails with a recoverable error.
#[derive(Clone)]
pub struct EngineRouter {
    primary: Arc<dyn CatEngine>,
    fallback: Option<Arc<dyn CatEngine>>,
}

impl std::fmt::Debug for EngineRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRouter")
            .field("primary", &self.primary.name())
            .field("fallback", &self.fallback.as_ref().map(|e| e.name()))
            .finish()
    }
}

impl EngineRouter {
    pub fn new(primary: Arc<dyn CatEngine>) -> Self {
        Self {
            primary,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn CatEngine>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// [`PosteriorEngine`] as primary, optionally backed by [`SimplifiedEngine`].
    pub fn from_config(config: &CatConfig, enable_fallback: bool) -> Result<Self, CatError> {
        let router = Self::new(Arc::new(PosteriorEngine::new(config)?));
        if enable_fallback {
            Ok(router.with_fallback(Arc::new(SimplifiedEngine::new(config)?)))
        } else {
            Ok(router)
        }
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    fn route<T>(
        &self,
        op: &'static str,
        call: impl Fn(&dyn CatEngine) -> Result<T, CatError>,
    ) -> Result<Routed<T>, CatError> {
        let start = Instant::now();

        if self.primary.is_available() {
            match call(self.primary.as_ref()) {
                Ok(value) => {
                    tracing::debug!(
                        op,
                        engine = self.primary.name(),
                        elapsed_us = start.elapsed().as_micros() as u64,
                        "engine call"
                    );
                    return Ok(Routed {
                        value,
                        strategy: EngineStrategy::Primary,
                    });
                }
                Err(e) if e.is_recoverable() && self.fallback.is_some() => {
                    tracing::warn!(op, engine = self.primary.name(), "primary engine failed: {e}");
                }
                Err(e) => return Err(e),
            }
        }

        let Some(fallback) = &self.fallback else {
            return Err(CatError::EngineUnavailable(format!(
                "{} engine is unavailable and no fallback is configured",
                self.primary.name()
            )));
        };
        if !fallback.is_available() {
            return Err(CatError::EngineUnavailable(format!(
                "both {} and {} engines are unavailable",
                self.primary.name(),
                fallback.name()
            )));
        }

        tracing::warn!(op, engine = fallback.name(), "using fallback engine");
        let value = call(fallback.as_ref())?;
        tracing::debug!(
            op,
            engine = fallback.name(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "engine call"
        );
        Ok(Routed {
            value,
            strategy: EngineStrategy::Fallback,
        })
    }

    pub fn select_first_item(&self, bank: &ItemBank) -> Result<Routed<Selection>, CatError> {
        self.route("select_first_item", |engine| engine.select_first_item(bank))
    }

    pub fn estimate_ability(
        &self,
        history: &[ObservedResponse],
        method: EstimationMethod,
    ) -> Result<Routed<AbilityEstimate>, CatError> {
        self.route("estimate_ability", |engine| {
            engine.estimate_ability(history, method)
        })
    }

    pub fn select_next_item(
        &self,
        bank: &ItemBank,
        theta: f64,
        used: &[String],
        history: &[ObservedResponse],
    ) -> Result<Routed<Selection>, CatError> {
        self.route("select_next_item", |engine| {
            engine.select_next_item(bank, theta, used, history)
        })
    }

    pub fn should_stop(
        &self,
        history: &[ObservedResponse],
        se: f64,
        used: &[String],
        bank: &ItemBank,
    ) -> Result<Routed<StopDecision>, CatError> {
        self.route("should_stop", |engine| {
            engine.should_stop(history, se, used, bank)
        })
    }

    pub fn finalize_score(&self, history: &[ObservedResponse]) -> Result<Routed<FinalScore>, CatError> {
        self.route("finalize_score", |engine| engine.finalize_score(history))
    }
}
