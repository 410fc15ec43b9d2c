//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::CatError;
use crate::model::SelectionMethod;
use crate::posterior::ThetaGrid;
use crate::scoring::{ScoreScale, Scorer};
use crate::stopping::StoppingRule;

/// Absolute bounds applied to every reported theta.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThetaBounds {
    pub min: f64,
    pub max: f64,
}

impl Default for ThetaBounds {
    fn default() -> Self {
        Self {
            min: -6.0,
            max: 6.0,
        }
    }
}

impl ThetaBounds {
    pub fn clamp(&self, theta: f64) -> f64 {
        theta.clamp(self.min, self.max)
    }

    pub fn contains(&self, theta: f64) -> bool {
        (self.min..=self.max).contains(&theta)
    }
}

/// Discretisation of the theta axis used for posterior computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            min: -4.0,
            max: 4.0,
            step: 0.1,
        }
    }
}

impl GridConfig {
    pub fn build(&self) -> Result<ThetaGrid, CatError> {
        ThetaGrid::new(self.min, self.max, self.step)
    }
}

/// Limits how far a single live MAP update may move theta.
///
/// Disabled by default. When enabled, the first `early_items` responses may
/// move theta by at most `early_max_change`, later ones by `later_max_change`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeControl {
    pub enabled: bool,
    pub early_items: usize,
    pub early_max_change: f64,
    pub later_max_change: f64,
}

impl Default for ChangeControl {
    fn default() -> Self {
        Self {
            enabled: false,
            early_items: 5,
            early_max_change: 1.0,
            later_max_change: 0.25,
        }
    }
}

impl ChangeControl {
    /// Constrain `proposed` relative to `previous` after `n_responses` answers.
    pub fn apply(&self, previous: f64, proposed: f64, n_responses: usize) -> f64 {
        if !self.enabled {
            return proposed;
        }
        let limit = if n_responses <= self.early_items {
            self.early_max_change
        } else {
            self.later_max_change
        };
        let change = proposed - previous;
        if change.abs() > limit {
            previous + limit.copysign(change)
        } else {
            proposed
        }
    }
}

/// Configuration for the CAT engine and session orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatConfig {
    /// Hard cap on test length.
    pub max_items: usize,
    /// Minimum responses before the SE rule may stop the test.
    pub min_items: usize,
    /// Stop once the SE falls below this value.
    pub target_se: f64,
    /// Bounds applied to every reported theta.
    pub theta_bounds: ThetaBounds,
    /// Upper end of the reported score scale.
    pub base_score: f64,
    /// Score points per theta unit.
    pub theta_multiplier: f64,
    /// Reported score scale.
    pub score_scale: ScoreScale,
    /// Posterior grid.
    pub grid: GridConfig,
    /// Criterion used by the primary engine.
    pub selection_method: SelectionMethod,
    /// Optional damping of live theta updates.
    pub change_control: ChangeControl,
}

impl Default for CatConfig {
    fn default() -> Self {
        Self {
            max_items: 30,
            min_items: 10,
            target_se: 0.25,
            theta_bounds: ThetaBounds::default(),
            base_score: 100.0,
            theta_multiplier: 15.0,
            score_scale: ScoreScale::Linear,
            grid: GridConfig::default(),
            selection_method: SelectionMethod::Efi,
            change_control: ChangeControl::default(),
        }
    }
}

impl CatConfig {
    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), CatError> {
        let invalid = |msg: String| Err(CatError::InvalidConfig(msg));
        if self.max_items == 0 {
            return invalid("max_items must be at least 1".into());
        }
        if self.min_items > self.max_items {
            return invalid(format!(
                "min_items ({}) exceeds max_items ({})",
                self.min_items, self.max_items
            ));
        }
        if !(self.target_se.is_finite() && self.target_se > 0.0) {
            return invalid(format!("target_se must be positive, got {}", self.target_se));
        }
        if !(self.theta_bounds.min < self.theta_bounds.max) {
            return invalid(format!(
                "theta_bounds min ({}) must be below max ({})",
                self.theta_bounds.min, self.theta_bounds.max
            ));
        }
        if !(self.base_score.is_finite() && self.base_score > 0.0) {
            return invalid(format!("base_score must be positive, got {}", self.base_score));
        }
        if !self.theta_multiplier.is_finite() {
            return invalid("theta_multiplier must be finite".into());
        }
        self.grid.build()?;
        Ok(())
    }

    pub fn stopping_rule(&self) -> StoppingRule {
        StoppingRule {
            target_se: self.target_se,
            min_items: self.min_items,
            max_items: self.max_items,
        }
    }

    pub fn scorer(&self) -> Scorer {
        Scorer::new(self.base_score, self.theta_multiplier, self.score_scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = CatConfig::default();
        assert_eq!(config.max_items, 30);
        assert_eq!(config.min_items, 10);
        assert_eq!(config.target_se, 0.25);
        assert_eq!(config.theta_bounds, ThetaBounds { min: -6.0, max: 6.0 });
        assert_eq!(config.base_score, 100.0);
        assert_eq!(config.theta_multiplier, 15.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: CatConfig = toml::from_str(
            r#"
max_items = 20
selection_method = "mi"

[change_control]
enabled = true
"#,
        )
        .unwrap();
        assert_eq!(config.max_items, 20);
        assert_eq!(config.min_items, 10);
        assert_eq!(config.selection_method, SelectionMethod::Mi);
        assert!(config.change_control.enabled);
        assert_eq!(config.change_control.later_max_change, 0.25);
    }

    #[test]
    fn rejects_inconsistent_limits() {
        let config = CatConfig {
            min_items: 40,
            ..CatConfig::default()
        };
        assert!(matches!(config.validate(), Err(CatError::InvalidConfig(_))));

        let config = CatConfig {
            theta_bounds: ThetaBounds { min: 2.0, max: -2.0 },
            ..CatConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_oversized_or_degenerate_grids() {
        let tiny_step = CatConfig {
            grid: GridConfig {
                step: 1e-10,
                ..GridConfig::default()
            },
            ..CatConfig::default()
        };
        assert!(matches!(tiny_step.validate(), Err(CatError::InvalidConfig(_))));

        let single_node = CatConfig {
            grid: GridConfig {
                min: -1.0,
                max: 1.0,
                step: 5.0,
            },
            ..CatConfig::default()
        };
        assert!(single_node.validate().is_err());
    }

    #[test]
    fn change_control_limits_steps() {
        let cc = ChangeControl {
            enabled: true,
            ..ChangeControl::default()
        };
        assert_eq!(cc.apply(0.0, 2.5, 1), 1.0);
        assert_eq!(cc.apply(0.0, -2.5, 5), -1.0);
        assert_eq!(cc.apply(1.0, 2.0, 6), 1.25);
        assert_eq!(cc.apply(1.0, 1.1, 6), 1.1);
        assert_eq!(ChangeControl::default().apply(0.0, 3.0, 1), 3.0);
    }
}
