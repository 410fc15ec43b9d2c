//! Scripted engine for testing routing and fallback.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use adaptest_core::bank::ItemBank;
use adaptest_core::engine::{CatEngine, FinalScore};
use adaptest_core::model::{EstimationMethod, ObservedResponse};
use adaptest_core::posterior::AbilityEstimate;
use adaptest_core::selection::Selection;
use adaptest_core::stopping::StopDecision;
use adaptest_core::CatError;

/// Wraps a real engine and lets tests take it offline or make it fail.
///
/// While offline the engine reports itself unavailable; while failing every
/// call returns [`CatError::EngineUnavailable`]. Calls that reach the inner
/// engine are counted.
pub struct ScriptedEngine {
    name: String,
    inner: Arc<dyn CatEngine>,
    online: AtomicBool,
    failing: AtomicBool,
    call_count: AtomicU32,
}

impl ScriptedEngine {
    pub fn new(name: &str, inner: Arc<dyn CatEngine>) -> Self {
        Self {
            name: name.to_string(),
            inner,
            online: AtomicBool::new(true),
            failing: AtomicBool::new(false),
            call_count: AtomicU32::new(0),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of calls forwarded to the inner engine.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    fn forward<T>(
        &self,
        call: impl FnOnce(&dyn CatEngine) -> Result<T, CatError>,
    ) -> Result<T, CatError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CatError::EngineUnavailable(format!(
                "{} engine is failing",
                self.name
            )));
        }
        self.call_count.fetch_add(1, Ordering::Relaxed);
        call(self.inner.as_ref())
    }
}

impl CatEngine for ScriptedEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn select_first_item(&self, bank: &ItemBank) -> Result<Selection, CatError> {
        self.forward(|engine| engine.select_first_item(bank))
    }

    fn estimate_ability(
        &self,
        history: &[ObservedResponse],
        method: EstimationMethod,
    ) -> Result<AbilityEstimate, CatError> {
        self.forward(|engine| engine.estimate_ability(history, method))
    }

    fn select_next_item(
        &self,
        bank: &ItemBank,
        theta: f64,
        used: &[String],
        history: &[ObservedResponse],
    ) -> Result<Selection, CatError> {
        self.forward(|engine| engine.select_next_item(bank, theta, used, history))
    }

    fn should_stop(
        &self,
        history: &[ObservedResponse],
        se: f64,
        used: &[String],
        bank: &ItemBank,
    ) -> Result<StopDecision, CatError> {
        self.forward(|engine| engine.should_stop(history, se, used, bank))
    }

    fn finalize_score(&self, history: &[ObservedResponse]) -> Result<FinalScore, CatError> {
        self.forward(|engine| engine.finalize_score(history))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adaptest_core::config::CatConfig;
    use adaptest_core::engine::PosteriorEngine;

    fn scripted() -> ScriptedEngine {
        let inner = PosteriorEngine::new(&CatConfig::default()).unwrap();
        ScriptedEngine::new("scripted", Arc::new(inner))
    }

    #[test]
    fn forwards_and_counts() {
        let engine = scripted();
        let est = engine.estimate_ability(&[], EstimationMethod::Eap).unwrap();
        assert_eq!((est.theta, est.se), (0.0, 1.0));
        assert_eq!(engine.call_count(), 1);
    }

    #[test]
    fn failing_engine_returns_recoverable_error() {
        let engine = scripted();
        engine.set_failing(true);
        let err = engine.finalize_score(&[]).unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(engine.call_count(), 0);
    }

    #[test]
    fn availability_toggle() {
        let engine = scripted();
        assert!(engine.is_available());
        engine.set_online(false);
        assert!(!engine.is_available());
    }
}
