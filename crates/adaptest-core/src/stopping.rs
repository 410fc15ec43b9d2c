//! Stopping rule.
//!
//! A single-shot predicate evaluated once per submitted response, on the
//! already-updated theta/SE. Conditions are checked in a fixed order:
//! max items, then SE threshold, then item exhaustion.

use serde::{Deserialize, Serialize};

use crate::model::StopReason;

/// Outcome of a stopping check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopDecision {
    pub should_stop: bool,
    pub reason: Option<StopReason>,
}

impl StopDecision {
    pub fn proceed() -> Self {
        Self {
            should_stop: false,
            reason: None,
        }
    }

    pub fn stop(reason: StopReason) -> Self {
        Self {
            should_stop: true,
            reason: Some(reason),
        }
    }
}

/// Termination thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoppingRule {
    /// Stop once the SE falls strictly below this value.
    pub target_se: f64,
    /// The SE rule only applies after this many responses.
    pub min_items: usize,
    /// Hard cap on test length.
    pub max_items: usize,
}

impl Default for StoppingRule {
    fn default() -> Self {
        Self {
            target_se: 0.25,
            min_items: 10,
            max_items: 30,
        }
    }
}

impl StoppingRule {
    /// Evaluate the rule.
    ///
    /// `administered` is the number of answered items, `available` the
    /// number of bank items not yet used.
    pub fn evaluate(&self, administered: usize, se: f64, available: usize) -> StopDecision {
        if administered >= self.max_items {
            return StopDecision::stop(StopReason::MaxItems);
        }
        if administered >= self.min_items && se < self.target_se {
            return StopDecision::stop(StopReason::SeThreshold);
        }
        if available == 0 {
            return StopDecision::stop(StopReason::NoItemsAvailable);
        }
        StopDecision::proceed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continues_below_limits() {
        let rule = StoppingRule::default();
        assert_eq!(rule.evaluate(3, 0.8, 40), StopDecision::proceed());
    }

    #[test]
    fn max_items_regardless_of_se() {
        let rule = StoppingRule::default();
        for se in [0.1, 0.3, 1.0] {
            let decision = rule.evaluate(30, se, 40);
            assert!(decision.should_stop);
            assert_eq!(decision.reason, Some(StopReason::MaxItems));
        }
    }

    #[test]
    fn se_threshold_before_max_items() {
        let rule = StoppingRule::default();
        let decision = rule.evaluate(12, 0.24, 40);
        assert_eq!(decision.reason, Some(StopReason::SeThreshold));
    }

    #[test]
    fn se_threshold_is_strict() {
        let rule = StoppingRule::default();
        assert!(!rule.evaluate(12, 0.25, 40).should_stop);
    }

    #[test]
    fn se_threshold_waits_for_min_items() {
        let rule = StoppingRule::default();
        assert!(!rule.evaluate(9, 0.1, 40).should_stop);
        let rule = StoppingRule {
            min_items: 0,
            ..StoppingRule::default()
        };
        assert_eq!(
            rule.evaluate(2, 0.1, 40).reason,
            Some(StopReason::SeThreshold)
        );
    }

    #[test]
    fn exhaustion_is_checked_last() {
        let rule = StoppingRule::default();
        assert_eq!(
            rule.evaluate(5, 0.9, 0).reason,
            Some(StopReason::NoItemsAvailable)
        );
        assert_eq!(rule.evaluate(30, 0.9, 0).reason, Some(StopReason::MaxItems));
        assert_eq!(
            rule.evaluate(15, 0.2, 0).reason,
            Some(StopReason::SeThreshold)
        );
    }
}
