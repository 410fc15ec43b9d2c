//! Grid posterior over theta.
//!
//! The posterior is rebuilt from the full response history on every call.
//! Nothing is carried over between calls, so two calls with the same history
//! and grid always agree bit for bit.

use serde::{Deserialize, Serialize};

use crate::config::ThetaBounds;
use crate::error::CatError;
use crate::irt::{probability, test_information};
use crate::model::{EstimationMethod, ObservedResponse};

/// Floor on test information when deriving the fallback SE.
pub const MIN_TEST_INFORMATION: f64 = 0.1;

/// Upper bound on grid size.
pub const MAX_GRID_NODES: usize = 10_001;

/// A grid needs interior mass for the posterior SD to mean anything.
pub const MIN_GRID_NODES: usize = 3;

const GRID_EPSILON: f64 = 1e-9;

/// Ordered theta nodes over a closed interval.
#[derive(Debug, Clone, PartialEq)]
pub struct ThetaGrid {
    nodes: Vec<f64>,
}

impl ThetaGrid {
    /// Nodes `min, min + step, ...` up to `max`, which is always the last
    /// node. When `step` does not divide the range the final interval is
    /// shorter than `step`.
    ///
    /// Nodes are computed as `min + i·step` and rounded to 1e-9 so that a
    /// step of 0.1 lands on the decimal values rather than accumulating drift.
    pub fn new(min: f64, max: f64, step: f64) -> Result<Self, CatError> {
        if !(min.is_finite() && max.is_finite() && step.is_finite()) {
            return Err(CatError::InvalidConfig("grid bounds must be finite".into()));
        }
        if step <= 0.0 || min >= max {
            return Err(CatError::InvalidConfig(format!(
                "grid needs min < max and step > 0, got [{min}, {max}] step {step}"
            )));
        }
        let intervals = ((max - min) / step + GRID_EPSILON).floor();
        if intervals + 1.0 > MAX_GRID_NODES as f64 {
            return Err(CatError::InvalidConfig(format!(
                "grid [{min}, {max}] step {step} exceeds {MAX_GRID_NODES} nodes"
            )));
        }

        let mut nodes: Vec<f64> = (0..=intervals as usize)
            .map(|i| ((min + i as f64 * step) * 1e9).round() / 1e9)
            .filter(|&theta| theta <= max)
            .collect();
        if nodes.last().is_some_and(|&last| max - last > GRID_EPSILON) {
            nodes.push(max);
        }
        if nodes.len() < MIN_GRID_NODES {
            return Err(CatError::InvalidConfig(format!(
                "grid [{min}, {max}] step {step} has fewer than {MIN_GRID_NODES} nodes"
            )));
        }
        Ok(Self { nodes })
    }

    pub fn nodes(&self) -> &[f64] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn min(&self) -> f64 {
        self.nodes.first().copied().unwrap_or(0.0)
    }

    pub fn max(&self) -> f64 {
        self.nodes.last().copied().unwrap_or(0.0)
    }
}

impl Default for ThetaGrid {
    /// [-4, 4] in steps of 0.1: 81 nodes.
    fn default() -> Self {
        let nodes = (0..=80).map(|i| (i as f64 - 40.0) / 10.0).collect();
        Self { nodes }
    }
}

/// Normalised standard normal prior evaluated on the grid.
fn normal_prior(grid: &ThetaGrid) -> Vec<f64> {
    let density: Vec<f64> = grid
        .nodes()
        .iter()
        .map(|&theta| (-0.5 * theta * theta).exp())
        .collect();
    let total: f64 = density.iter().sum();
    density.into_iter().map(|d| d / total).collect()
}

/// A discrete posterior over a [`ThetaGrid`].
#[derive(Debug, Clone)]
pub struct Posterior<'g> {
    grid: &'g ThetaGrid,
    weights: Vec<f64>,
    degenerate: bool,
}

impl<'g> Posterior<'g> {
    /// The N(0, 1) prior alone.
    pub fn prior(grid: &'g ThetaGrid) -> Self {
        Self {
            grid,
            weights: normal_prior(grid),
            degenerate: false,
        }
    }

    /// Posterior given a response history.
    ///
    /// If the likelihood underflows to zero at every node the prior is
    /// returned and [`Posterior::is_degenerate`] reports `true`.
    pub fn compute(grid: &'g ThetaGrid, history: &[ObservedResponse]) -> Self {
        let prior = normal_prior(grid);
        let mut weights: Vec<f64> = grid
            .nodes()
            .iter()
            .zip(&prior)
            .map(|(&theta, &prior_weight)| {
                let likelihood: f64 = history
                    .iter()
                    .map(|r| {
                        let p = probability(theta, &r.params);
                        if r.answer.is_correct() {
                            p
                        } else {
                            1.0 - p
                        }
                    })
                    .product();
                likelihood * prior_weight
            })
            .collect();

        let total: f64 = weights.iter().sum();
        if !(total > 0.0 && total.is_finite()) {
            tracing::debug!(
                responses = history.len(),
                "likelihood vanished on the grid, falling back to the prior"
            );
            return Self {
                grid,
                weights: prior,
                degenerate: true,
            };
        }
        for w in &mut weights {
            *w /= total;
        }
        Self {
            grid,
            weights,
            degenerate: false,
        }
    }

    pub fn grid(&self) -> &ThetaGrid {
        self.grid
    }

    /// Normalised weights, one per grid node.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Whether the likelihood collapsed and the prior was used instead.
    pub fn is_degenerate(&self) -> bool {
        self.degenerate
    }

    /// Posterior mode. Ties go to the lowest theta.
    pub fn map(&self) -> f64 {
        let mut best_idx = 0;
        let mut best = f64::NEG_INFINITY;
        for (i, &w) in self.weights.iter().enumerate() {
            if w > best {
                best = w;
                best_idx = i;
            }
        }
        self.grid.nodes()[best_idx]
    }

    /// Posterior mean.
    pub fn eap(&self) -> f64 {
        self.expectation(|theta| theta)
    }

    /// Posterior standard deviation.
    pub fn sd(&self) -> f64 {
        let mean = self.eap();
        self.expectation(|theta| (theta - mean).powi(2)).sqrt()
    }

    /// `Σ f(θᵢ)·πᵢ` over the grid.
    pub fn expectation(&self, f: impl Fn(f64) -> f64) -> f64 {
        self.grid
            .nodes()
            .iter()
            .zip(&self.weights)
            .map(|(&theta, &w)| f(theta) * w)
            .sum()
    }
}

/// How the standard error of a MAP estimate is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapError {
    /// Posterior standard deviation.
    #[default]
    PosteriorSd,
    /// `1 / sqrt(max(0.1, test information at θ_MAP))`.
    TestInformation,
}

/// A point estimate of ability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AbilityEstimate {
    pub theta: f64,
    pub se: f64,
    pub method: EstimationMethod,
    /// Number of responses the estimate is based on.
    pub n_responses: usize,
    /// Whether the posterior fell back to the prior.
    #[serde(default)]
    pub degenerate: bool,
}

/// Builds posteriors and derives point estimates from them.
#[derive(Debug, Clone)]
pub struct PosteriorEstimator {
    grid: ThetaGrid,
    bounds: ThetaBounds,
    map_error: MapError,
}

impl Default for PosteriorEstimator {
    fn default() -> Self {
        Self::new(ThetaGrid::default(), ThetaBounds::default())
    }
}

impl PosteriorEstimator {
    pub fn new(grid: ThetaGrid, bounds: ThetaBounds) -> Self {
        Self {
            grid,
            bounds,
            map_error: MapError::PosteriorSd,
        }
    }

    pub fn with_map_error(mut self, map_error: MapError) -> Self {
        self.map_error = map_error;
        self
    }

    pub fn grid(&self) -> &ThetaGrid {
        &self.grid
    }

    pub fn posterior(&self, history: &[ObservedResponse]) -> Posterior<'_> {
        Posterior::compute(&self.grid, history)
    }

    /// Estimate theta and SE from the full history.
    ///
    /// With no responses this is the prior itself: theta 0, SE 1.
    pub fn estimate(&self, history: &[ObservedResponse], method: EstimationMethod) -> AbilityEstimate {
        if history.is_empty() {
            return AbilityEstimate {
                theta: 0.0,
                se: 1.0,
                method,
                n_responses: 0,
                degenerate: false,
            };
        }

        let posterior = self.posterior(history);
        let (theta, se) = match method {
            EstimationMethod::Map => {
                let theta = posterior.map();
                let se = match self.map_error {
                    MapError::PosteriorSd => posterior.sd(),
                    MapError::TestInformation => {
                        1.0 / test_information(theta, history)
                            .max(MIN_TEST_INFORMATION)
                            .sqrt()
                    }
                };
                (theta, se)
            }
            EstimationMethod::Eap => (posterior.eap(), posterior.sd()),
        };

        AbilityEstimate {
            theta: self.bounds.clamp(theta),
            se,
            method,
            n_responses: history.len(),
            degenerate: posterior.is_degenerate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Answer, ItemParams};

    fn scenario() -> Vec<ObservedResponse> {
        vec![
            ObservedResponse::new(ItemParams::new(1.5, -1.0, 0.2), Answer::Correct),
            ObservedResponse::new(ItemParams::new(2.0, 0.5, 0.25), Answer::Incorrect),
            ObservedResponse::new(ItemParams::new(1.2, 1.5, 0.15), Answer::Correct),
        ]
    }

    #[test]
    fn default_grid_has_81_nodes() {
        let grid = ThetaGrid::default();
        assert_eq!(grid.len(), 81);
        assert_eq!(grid.min(), -4.0);
        assert_eq!(grid.max(), 4.0);
        assert_eq!(grid.nodes()[40], 0.0);
        assert_eq!(ThetaGrid::new(-4.0, 4.0, 0.1).unwrap(), grid);
    }

    #[test]
    fn grid_rejects_bad_bounds() {
        assert!(ThetaGrid::new(1.0, -1.0, 0.1).is_err());
        assert!(ThetaGrid::new(-1.0, 1.0, 0.0).is_err());
        assert!(ThetaGrid::new(f64::NEG_INFINITY, 1.0, 0.1).is_err());
    }

    #[test]
    fn grid_ends_at_max_when_step_does_not_divide() {
        let grid = ThetaGrid::new(-4.0, 4.0, 0.3).unwrap();
        assert_eq!(grid.min(), -4.0);
        assert_eq!(grid.max(), 4.0);
        assert_eq!(grid.len(), 28);
        assert!(grid.nodes().windows(2).all(|w| w[0] < w[1]));
        assert!((grid.nodes()[26] - 3.8).abs() < 1e-9);
    }

    #[test]
    fn grid_size_is_bounded() {
        let err = ThetaGrid::new(-4.0, 4.0, 1e-10).unwrap_err();
        assert!(matches!(err, CatError::InvalidConfig(_)));
        assert!(ThetaGrid::new(-1.0, 1.0, 5.0).is_err());
        assert!(ThetaGrid::new(-1.0, 1.0, 2.0).is_err());
        assert_eq!(ThetaGrid::new(-1.0, 1.0, 1.5).unwrap().nodes(), &[-1.0, 0.5, 1.0]);
        assert_eq!(ThetaGrid::new(-5.0, 5.0, 0.001).unwrap().len(), MAX_GRID_NODES);
    }

    #[test]
    fn prior_is_normalised() {
        let grid = ThetaGrid::default();
        let prior = Posterior::prior(&grid);
        let total: f64 = prior.weights().iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert_eq!(prior.map(), 0.0);
        assert!(prior.eap().abs() < 1e-12);
    }

    #[test]
    fn posterior_is_normalised() {
        let grid = ThetaGrid::default();
        let posterior = Posterior::compute(&grid, &scenario());
        let total: f64 = posterior.weights().iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!(!posterior.is_degenerate());
    }

    #[test]
    fn empty_history_is_the_prior_estimate() {
        let estimator = PosteriorEstimator::default();
        for method in [EstimationMethod::Map, EstimationMethod::Eap] {
            let est = estimator.estimate(&[], method);
            assert_eq!(est.theta, 0.0);
            assert_eq!(est.se, 1.0);
            assert_eq!(est.n_responses, 0);
        }
    }

    #[test]
    fn three_response_scenario() {
        let estimator = PosteriorEstimator::default();
        for method in [EstimationMethod::Map, EstimationMethod::Eap] {
            let est = estimator.estimate(&scenario(), method);
            assert!(est.theta.is_finite());
            assert!((-4.0..=4.0).contains(&est.theta), "theta {}", est.theta);
            assert!(est.se > 0.0 && est.se <= 1.5, "se {}", est.se);
            assert_eq!(est.method, method);
        }
    }

    #[test]
    fn estimation_is_idempotent() {
        let estimator = PosteriorEstimator::default();
        let history = scenario();
        let first = estimator.estimate(&history, EstimationMethod::Map);
        let second = estimator.estimate(&history, EstimationMethod::Map);
        assert_eq!(first, second);
        let first = estimator.estimate(&history, EstimationMethod::Eap);
        let second = estimator.estimate(&history, EstimationMethod::Eap);
        assert_eq!(first, second);
    }

    #[test]
    fn estimates_stay_on_the_grid_for_extreme_patterns() {
        let estimator = PosteriorEstimator::default();
        let all_correct: Vec<_> = (0..25)
            .map(|i| {
                ObservedResponse::new(ItemParams::new(2.0, -2.0 + i as f64 * 0.2, 0.2), Answer::Correct)
            })
            .collect();
        let all_wrong: Vec<_> = all_correct
            .iter()
            .map(|r| ObservedResponse::new(r.params, Answer::Incorrect))
            .collect();
        for history in [&all_correct, &all_wrong] {
            for method in [EstimationMethod::Map, EstimationMethod::Eap] {
                let est = estimator.estimate(history, method);
                assert!((-4.0..=4.0).contains(&est.theta));
            }
        }
        let high = estimator.estimate(&all_correct, EstimationMethod::Map);
        let low = estimator.estimate(&all_wrong, EstimationMethod::Map);
        assert!(high.theta > 2.0 && low.theta < -2.0);
    }

    #[test]
    fn correct_answers_raise_theta() {
        let estimator = PosteriorEstimator::default();
        let item = ItemParams::new(1.5, 0.0, 0.2);
        let up = estimator.estimate(
            &[ObservedResponse::new(item, Answer::Correct)],
            EstimationMethod::Eap,
        );
        let down = estimator.estimate(
            &[ObservedResponse::new(item, Answer::Incorrect)],
            EstimationMethod::Eap,
        );
        assert!(up.theta > 0.0);
        assert!(down.theta < 0.0);
        assert!(up.se < 1.0);
    }

    #[test]
    fn degenerate_likelihood_falls_back_to_prior() {
        // p saturates at exactly 1 on every node, so an incorrect answer has
        // zero likelihood everywhere.
        let grid = ThetaGrid::default();
        let item = ItemParams::new(100.0, -10.0, 0.0);
        let history = [ObservedResponse::new(item, Answer::Incorrect)];
        let posterior = Posterior::compute(&grid, &history);
        assert!(posterior.is_degenerate());
        assert_eq!(posterior.weights(), Posterior::prior(&grid).weights());

        let est = PosteriorEstimator::default().estimate(&history, EstimationMethod::Map);
        assert!(est.degenerate);
        assert_eq!(est.theta, 0.0);
    }

    #[test]
    fn map_ties_resolve_to_lowest_theta() {
        // Two equal modes
        let grid = ThetaGrid::new(-1.0, 1.0, 1.0).unwrap();
        let posterior = Posterior {
            grid: &grid,
            weights: vec![0.4, 0.2, 0.4],
            degenerate: false,
        };
        assert_eq!(posterior.map(), -1.0);
    }

    #[test]
    fn fallback_se_uses_test_information() {
        let estimator = PosteriorEstimator::default().with_map_error(MapError::TestInformation);
        let history = scenario();
        let est = estimator.estimate(&history, EstimationMethod::Map);
        let info = test_information(est.theta, &history).max(MIN_TEST_INFORMATION);
        assert!((est.se - 1.0 / info.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn narrow_bounds_clamp_estimates() {
        let estimator = PosteriorEstimator::new(
            ThetaGrid::default(),
            ThetaBounds { min: -1.0, max: 1.0 },
        );
        let history: Vec<_> = (0..10)
            .map(|_| ObservedResponse::new(ItemParams::new(1.0, 2.0, 0.0), Answer::Correct))
            .collect();
        let est = estimator.estimate(&history, EstimationMethod::Eap);
        assert_eq!(est.theta, 1.0);
    }
}
