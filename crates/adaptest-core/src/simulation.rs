//! Simulated examinees.
//!
//! Drives full sessions through a [`SessionOrchestrator`] with a known true
//! theta and reports how well the engine recovers it.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use tokio::sync::Semaphore;

use crate::error::CatError;
use crate::irt::probability;
use crate::model::{Answer, Item, StopReason};
use crate::session::{SessionOrchestrator, SubmitOutcome};

/// Produces answers for one simulated examinee.
pub trait Responder: Send {
    fn answer(&mut self, true_theta: f64, item: &Item) -> Answer;
}

/// Answers correctly exactly when the model probability at the true theta is
/// at least `threshold`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdResponder {
    pub threshold: f64,
}

impl Default for ThresholdResponder {
    fn default() -> Self {
        Self { threshold: 0.5 }
    }
}

impl Responder for ThresholdResponder {
    fn answer(&mut self, true_theta: f64, item: &Item) -> Answer {
        if probability(true_theta, &item.params) >= self.threshold {
            Answer::Correct
        } else {
            Answer::Incorrect
        }
    }
}

/// Draws each answer from Bernoulli(p) at the true theta.
#[derive(Debug, Clone)]
pub struct BernoulliResponder {
    rng: Pcg64,
}

impl BernoulliResponder {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Pcg64::seed_from_u64(seed),
        }
    }
}

impl Responder for BernoulliResponder {
    fn answer(&mut self, true_theta: f64, item: &Item) -> Answer {
        let p = probability(true_theta, &item.params);
        if self.rng.random::<f64>() < p {
            Answer::Correct
        } else {
            Answer::Incorrect
        }
    }
}

/// How simulated examinees answer. Each session gets its own responder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum ResponseModel {
    /// Deterministic: correct iff `p >= threshold`.
    Threshold { threshold: f64 },
    /// Stochastic, reproducible per seed.
    Bernoulli { seed: u64 },
}

impl Default for ResponseModel {
    fn default() -> Self {
        ResponseModel::Threshold { threshold: 0.5 }
    }
}

impl ResponseModel {
    /// Responder for the `index`-th session of a batch.
    ///
    /// Bernoulli sessions derive their stream from the seed and the index,
    /// so a batch is reproducible regardless of scheduling.
    pub fn responder(&self, index: usize) -> Box<dyn Responder> {
        match *self {
            ResponseModel::Threshold { threshold } => Box::new(ThresholdResponder { threshold }),
            ResponseModel::Bernoulli { seed } => Box::new(BernoulliResponder::seeded(
                seed.wrapping_add(index as u64 * 1000),
            )),
        }
    }
}

/// Outcome of one simulated session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRun {
    pub session_id: String,
    pub true_theta: f64,
    pub estimated_theta: f64,
    pub se: f64,
    pub score: f64,
    pub items_administered: usize,
    pub stop_reason: StopReason,
}

impl SimulationRun {
    pub fn error(&self) -> f64 {
        self.estimated_theta - self.true_theta
    }
}

/// Recovery statistics over a batch of simulated sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSummary {
    /// Runs ordered by true theta.
    pub runs: Vec<SimulationRun>,
    pub bias: f64,
    pub rmse: f64,
    pub mean_items: f64,
    pub mean_se: f64,
    pub duration_ms: u64,
}

impl SimulationSummary {
    pub fn from_runs(mut runs: Vec<SimulationRun>, duration_ms: u64) -> Self {
        runs.sort_by(|a, b| a.true_theta.total_cmp(&b.true_theta));
        let n = runs.len() as f64;
        let (bias, rmse, mean_items, mean_se) = if runs.is_empty() {
            (0.0, 0.0, 0.0, 0.0)
        } else {
            let bias = runs.iter().map(SimulationRun::error).sum::<f64>() / n;
            let mse = runs.iter().map(|r| r.error().powi(2)).sum::<f64>() / n;
            let items = runs.iter().map(|r| r.items_administered as f64).sum::<f64>() / n;
            let se = runs.iter().map(|r| r.se).sum::<f64>() / n;
            (bias, mse.sqrt(), items, se)
        };
        Self {
            runs,
            bias,
            rmse,
            mean_items,
            mean_se,
            duration_ms,
        }
    }
}

/// Run one simulated session to completion.
pub async fn simulate_session(
    orchestrator: &SessionOrchestrator,
    responder: &mut dyn Responder,
    true_theta: f64,
) -> Result<SimulationRun, CatError> {
    let start = orchestrator.start().await?;
    let session_id = start.session_id;
    let mut outcome = start.outcome;

    loop {
        match outcome {
            SubmitOutcome::Next(next) => {
                let answer = responder.answer(true_theta, &next.item);
                outcome = orchestrator
                    .submit(&session_id, &next.item.id, answer.into())
                    .await?;
            }
            SubmitOutcome::Finalized(summary) => {
                return Ok(SimulationRun {
                    session_id,
                    true_theta,
                    estimated_theta: summary.theta,
                    se: summary.se,
                    score: summary.score,
                    items_administered: summary.items_administered,
                    stop_reason: summary.stop_reason,
                });
            }
        }
    }
}

/// Simulate one session per true theta, at most `parallelism` at a time.
pub async fn simulate_batch(
    orchestrator: Arc<SessionOrchestrator>,
    model: ResponseModel,
    true_thetas: &[f64],
    parallelism: usize,
) -> Result<SimulationSummary> {
    let started = Instant::now();
    let semaphore = Arc::new(Semaphore::new(parallelism.max(1)));
    let mut futures = FuturesUnordered::new();

    for (index, &true_theta) in true_thetas.iter().enumerate() {
        let orchestrator = Arc::clone(&orchestrator);
        let mut responder = model.responder(index);
        let semaphore = Arc::clone(&semaphore);
        futures.push(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|_| anyhow::anyhow!("semaphore closed"))?;
            let run = simulate_session(&orchestrator, responder.as_mut(), true_theta).await?;
            Ok::<_, anyhow::Error>(run)
        });
    }

    let mut runs = Vec::with_capacity(true_thetas.len());
    while let Some(result) = futures.next().await {
        runs.push(result?);
    }

    let summary = SimulationSummary::from_runs(runs, started.elapsed().as_millis() as u64);
    tracing::info!(
        sessions = summary.runs.len(),
        bias = summary.bias,
        rmse = summary.rmse,
        mean_items = summary.mean_items,
        "simulation complete"
    );
    Ok(summary)
}
