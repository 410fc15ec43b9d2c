//! Session orchestrator.
//!
//! Sequences the engine operations into a test session:
//! start → (submit → estimate → stop? → select)* → finalize.
//!
//! Submissions for one session are serialised by a per-session lock whose
//! map entry lives only while a submission holds or awaits it.
//! Every transition is computed on an owned copy of the stored record and
//! written back with a single [`SessionStore::commit`], so a failure at any
//! step leaves the stored session exactly as it was.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::bank::ItemBank;
use crate::config::{CatConfig, ChangeControl};
use crate::engine::{EngineRouter, Routed};
use crate::error::CatError;
use crate::irt::{item_information, probability};
use crate::model::{
    Answer, EngineStrategy, EstimationMethod, Item, ObservedResponse, Response, SessionRecord,
    SessionState, StopReason,
};
use crate::selection::Selection;
use crate::traits::{ItemRepository, SessionStore};

/// The next item presented to the examinee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextItem {
    pub item: Item,
    /// 1-based position of this item in the test.
    pub item_number: usize,
    /// Probability of a correct answer at the current theta.
    pub probability: f64,
    pub fisher_information: f64,
    pub expected_fisher_information: f64,
    /// Current (MAP) theta and SE.
    pub theta: f64,
    pub se: f64,
    pub strategy: EngineStrategy,
}

/// Final result of a completed session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    /// EAP theta and posterior SD.
    pub theta: f64,
    pub se: f64,
    pub score: f64,
    pub stop_reason: StopReason,
    pub items_administered: usize,
    pub strategy: EngineStrategy,
}

/// What happens after a start or a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmitOutcome {
    Next(NextItem),
    Finalized(SessionSummary),
}

impl SubmitOutcome {
    pub fn is_finalized(&self) -> bool {
        matches!(self, SubmitOutcome::Finalized(_))
    }
}

/// A newly created session and its first step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStart {
    pub session_id: String,
    pub outcome: SubmitOutcome,
}

/// Drives sessions through the engine and persists every transition.
pub struct SessionOrchestrator {
    items: Arc<dyn ItemRepository>,
    store: Arc<dyn SessionStore>,
    router: EngineRouter,
    change_control: ChangeControl,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionOrchestrator {
    pub fn new(
        items: Arc<dyn ItemRepository>,
        store: Arc<dyn SessionStore>,
        router: EngineRouter,
        config: &CatConfig,
    ) -> Self {
        Self {
            items,
            store,
            router,
            change_control: config.change_control,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Create a session at the prior and present its first item.
    ///
    /// An empty bank yields a session that is finalized immediately.
    pub async fn start(&self) -> Result<SessionStart, CatError> {
        let started = Instant::now();
        let bank = self.items.bank().await?;
        let session_id = format!("CAT_{}", Uuid::new_v4().simple());
        let mut record = SessionRecord::new(SessionState::new(&session_id));

        let routed = self.router.select_first_item(&bank)?;
        let outcome = self.advance(&mut record, routed, &[])?;
        self.store.create(record).await?;

        tracing::info!(
            session_id = %session_id,
            bank_size = bank.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "session started"
        );
        Ok(SessionStart {
            session_id,
            outcome,
        })
    }

    /// Record an answer to the pending item and move the session on.
    ///
    /// Rejected without any change to the session if the answer is not 0 or
    /// 1, the session is missing or completed, the item is unknown, or the
    /// item is not the one the session is waiting for.
    pub async fn submit(
        &self,
        session_id: &str,
        item_id: &str,
        answer: u8,
    ) -> Result<SubmitOutcome, CatError> {
        let started = Instant::now();
        let answer = Answer::try_from(answer)?;

        let lock = self.session_lock(session_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.submit_locked(session_id, item_id, answer).await
        };
        self.release_lock(session_id, lock).await;
        let outcome = result?;

        tracing::debug!(
            session_id,
            item_id,
            answer = %answer,
            finalized = outcome.is_finalized(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "response submitted"
        );
        Ok(outcome)
    }

    async fn submit_locked(
        &self,
        session_id: &str,
        item_id: &str,
        answer: Answer,
    ) -> Result<SubmitOutcome, CatError> {
        let mut record = self
            .store
            .load(session_id)
            .await?
            .ok_or_else(|| CatError::SessionNotFound(session_id.to_string()))?;
        if record.state.completed {
            return Err(CatError::SessionCompleted(session_id.to_string()));
        }
        let item = self
            .items
            .item(item_id)
            .await?
            .ok_or_else(|| CatError::UnknownItem(item_id.to_string()))?;
        match record.state.pending_item.as_deref() {
            Some(expected) if expected == item_id => {}
            expected => {
                return Err(CatError::ItemMismatch {
                    expected: expected.unwrap_or("none").to_string(),
                    actual: item_id.to_string(),
                })
            }
        }

        let bank = self.items.bank().await?;
        let outcome = self.apply_answer(&mut record, &bank, item, answer)?;
        self.store.commit(record).await?;
        Ok(outcome)
    }

    /// Current state of a session.
    pub async fn state(&self, session_id: &str) -> Result<SessionState, CatError> {
        self.store
            .load(session_id)
            .await?
            .map(|record| record.state)
            .ok_or_else(|| CatError::SessionNotFound(session_id.to_string()))
    }

    /// Responses of a session in administration order.
    pub async fn history(&self, session_id: &str) -> Result<Vec<Response>, CatError> {
        if self.store.load(session_id).await?.is_none() {
            return Err(CatError::SessionNotFound(session_id.to_string()));
        }
        self.store.responses(session_id).await
    }

    /// Full stored record, for reporting.
    pub async fn record(&self, session_id: &str) -> Result<SessionRecord, CatError> {
        self.store
            .load(session_id)
            .await?
            .ok_or_else(|| CatError::SessionNotFound(session_id.to_string()))
    }

    async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(session_id.to_string()).or_default())
    }

    /// Drop the map entry once no other submission holds or awaits it.
    ///
    /// Clones are only handed out under the map lock, so a count of two
    /// (the map and `lock`) cannot grow while we hold it.
    async fn release_lock(&self, session_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        if Arc::strong_count(&lock) == 2 {
            locks.remove(session_id);
        }
    }

    fn apply_answer(
        &self,
        record: &mut SessionRecord,
        bank: &ItemBank,
        item: Item,
        answer: Answer,
    ) -> Result<SubmitOutcome, CatError> {
        let theta_before = record.state.theta;
        let mut history = record.observed();
        history.push(ObservedResponse::new(item.params, answer));

        let estimate = self
            .router
            .estimate_ability(&history, EstimationMethod::Map)?
            .value;
        let theta = self
            .change_control
            .apply(theta_before, estimate.theta, history.len());
        let se = estimate.se;

        let now = Utc::now();
        record.responses.push(Response {
            item_id: item.id.clone(),
            params: item.params,
            answer,
            theta_before,
            theta_after: theta,
            se_after: se,
            order: history.len() as u32,
            probability: probability(theta_before, &item.params),
            information: item_information(theta_before, &item.params),
            answered_at: now,
        });
        record.state.theta = theta;
        record.state.se = se;
        record.state.pending_item = None;
        record.state.updated_at = now;

        tracing::debug!(
            session_id = %record.state.session_id,
            item = %item.id,
            theta_before,
            theta,
            se,
            degenerate = estimate.degenerate,
            "theta updated"
        );

        let decision = self
            .router
            .should_stop(&history, se, &record.state.used_items, bank)?
            .value;
        if let Some(reason) = decision.reason.filter(|_| decision.should_stop) {
            return self.finalize(record, &history, reason);
        }

        let routed = self
            .router
            .select_next_item(bank, theta, &record.state.used_items, &history)?;
        self.advance(record, routed, &history)
    }

    /// Present the selected item, or finalize if nothing is left.
    fn advance(
        &self,
        record: &mut SessionRecord,
        routed: Routed<Selection>,
        history: &[ObservedResponse],
    ) -> Result<SubmitOutcome, CatError> {
        let selection = match routed.value {
            Selection::Selected(selection) => selection,
            Selection::Exhausted => {
                return self.finalize(record, history, StopReason::NoItemsAvailable)
            }
        };

        let state = &mut record.state;
        state.used_items.push(selection.item.id.clone());
        state.pending_item = Some(selection.item.id.clone());
        state.updated_at = Utc::now();

        Ok(SubmitOutcome::Next(NextItem {
            item_number: state.item_number(),
            item: selection.item,
            probability: selection.probability,
            fisher_information: selection.fisher_information,
            expected_fisher_information: selection.expected_fisher_information,
            theta: state.theta,
            se: state.se,
            strategy: routed.strategy,
        }))
    }

    fn finalize(
        &self,
        record: &mut SessionRecord,
        history: &[ObservedResponse],
        reason: StopReason,
    ) -> Result<SubmitOutcome, CatError> {
        let routed = self.router.finalize_score(history)?;
        let final_score = routed.value;

        let state = &mut record.state;
        state.theta = final_score.theta;
        state.se = final_score.se;
        state.final_score = Some(final_score.score);
        state.completed = true;
        state.stop_reason = Some(reason);
        state.pending_item = None;
        state.updated_at = Utc::now();

        tracing::info!(
            session_id = %state.session_id,
            reason = %reason,
            items = history.len(),
            theta = final_score.theta,
            se = final_score.se,
            score = final_score.score,
            "session finalized"
        );

        Ok(SubmitOutcome::Finalized(SessionSummary {
            session_id: state.session_id.clone(),
            theta: final_score.theta,
            se: final_score.se,
            score: final_score.score,
            stop_reason: reason,
            items_administered: history.len(),
            strategy: routed.strategy,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::model::ItemParams;

    struct TestItems(Arc<ItemBank>);

    #[async_trait]
    impl ItemRepository for TestItems {
        async fn item(&self, id: &str) -> Result<Option<Item>, CatError> {
            Ok(self.0.get(id).cloned())
        }

        async fn bank(&self) -> Result<Arc<ItemBank>, CatError> {
            Ok(Arc::clone(&self.0))
        }
    }

    #[derive(Default)]
    struct TestStore {
        records: Mutex<HashMap<String, SessionRecord>>,
        fail_commits: AtomicBool,
    }

    #[async_trait]
    impl SessionStore for TestStore {
        async fn create(&self, record: SessionRecord) -> Result<(), CatError> {
            self.records
                .lock()
                .await
                .insert(record.state.session_id.clone(), record);
            Ok(())
        }

        async fn load(&self, session_id: &str) -> Result<Option<SessionRecord>, CatError> {
            Ok(self.records.lock().await.get(session_id).cloned())
        }

        async fn commit(&self, record: SessionRecord) -> Result<(), CatError> {
            if self.fail_commits.load(Ordering::SeqCst) {
                return Err(CatError::Store("commit refused".into()));
            }
            self.records
                .lock()
                .await
                .insert(record.state.session_id.clone(), record);
            Ok(())
        }

        async fn responses(&self, session_id: &str) -> Result<Vec<Response>, CatError> {
            Ok(self
                .records
                .lock()
                .await
                .get(session_id)
                .map(|r| r.responses.clone())
                .unwrap_or_default())
        }
    }

    fn bank(n: usize) -> ItemBank {
        ItemBank::new(
            (0..n)
                .map(|i| {
                    Item::new(
                        format!("I{i:03}"),
                        ItemParams::new(1.2, -2.5 + 5.0 * i as f64 / n as f64, 0.15),
                    )
                })
                .collect(),
        )
        .unwrap()
    }

    fn orchestrator(n: usize, config: CatConfig) -> (SessionOrchestrator, Arc<TestStore>) {
        let store = Arc::new(TestStore::default());
        let router = EngineRouter::from_config(&config, false).unwrap();
        let orch = SessionOrchestrator::new(
            Arc::new(TestItems(Arc::new(bank(n)))),
            store.clone(),
            router,
            &config,
        );
        (orch, store)
    }

    fn next(outcome: &SubmitOutcome) -> &NextItem {
        match outcome {
            SubmitOutcome::Next(next) => next,
            SubmitOutcome::Finalized(summary) => panic!("unexpected finalization: {summary:?}"),
        }
    }

    #[tokio::test]
    async fn start_presents_first_item() {
        let (orch, _) = orchestrator(20, CatConfig::default());
        let start = orch.start().await.unwrap();
        assert!(start.session_id.starts_with("CAT_"));
        let first = next(&start.outcome);
        assert_eq!(first.item_number, 1);
        assert_eq!((first.theta, first.se), (0.0, 1.0));

        let state = orch.state(&start.session_id).await.unwrap();
        assert_eq!(state.used_items, vec![first.item.id.clone()]);
        assert_eq!(state.pending_item.as_deref(), Some(first.item.id.as_str()));
    }

    #[tokio::test]
    async fn submit_updates_theta_and_history() {
        let (orch, _) = orchestrator(20, CatConfig::default());
        let start = orch.start().await.unwrap();
        let first = next(&start.outcome).item.id.clone();

        let outcome = orch.submit(&start.session_id, &first, 1).await.unwrap();
        let second = next(&outcome);
        assert_eq!(second.item_number, 2);
        assert!(second.theta > 0.0);
        assert_ne!(second.item.id, first);

        let history = orch.history(&start.session_id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].order, 1);
        assert_eq!(history[0].theta_before, 0.0);
        assert_eq!(history[0].theta_after, second.theta);
        assert_eq!(history[0].se_after, second.se);
    }

    #[tokio::test]
    async fn rejects_bad_input_without_mutation() {
        let (orch, _) = orchestrator(20, CatConfig::default());
        let start = orch.start().await.unwrap();
        let first = next(&start.outcome).item.id.clone();
        let before = orch.record(&start.session_id).await.unwrap();

        let err = orch.submit(&start.session_id, &first, 2).await.unwrap_err();
        assert!(matches!(err, CatError::InvalidAnswer(2)));

        let err = orch.submit(&start.session_id, "nope", 1).await.unwrap_err();
        assert!(matches!(err, CatError::UnknownItem(_)));

        let other = if first == "I000" { "I001" } else { "I000" };
        let err = orch.submit(&start.session_id, other, 1).await.unwrap_err();
        assert!(matches!(err, CatError::ItemMismatch { .. }));

        let err = orch.submit("CAT_missing", &first, 1).await.unwrap_err();
        assert!(matches!(err, CatError::SessionNotFound(_)));

        assert_eq!(orch.record(&start.session_id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn failed_commit_leaves_session_untouched() {
        let (orch, store) = orchestrator(20, CatConfig::default());
        let start = orch.start().await.unwrap();
        let first = next(&start.outcome).item.id.clone();
        let before = orch.record(&start.session_id).await.unwrap();

        store.fail_commits.store(true, Ordering::SeqCst);
        let err = orch.submit(&start.session_id, &first, 1).await.unwrap_err();
        assert!(matches!(err, CatError::Store(_)));
        assert_eq!(orch.record(&start.session_id).await.unwrap(), before);

        store.fail_commits.store(false, Ordering::SeqCst);
        assert!(orch.submit(&start.session_id, &first, 1).await.is_ok());
    }

    #[tokio::test]
    async fn runs_to_max_items_and_stays_terminal() {
        let config = CatConfig {
            max_items: 5,
            min_items: 5,
            target_se: 0.01,
            ..CatConfig::default()
        };
        let (orch, _) = orchestrator(20, config);
        let start = orch.start().await.unwrap();
        let mut outcome = start.outcome;
        let mut answered = 0;
        let mut last_item = String::new();
        while let SubmitOutcome::Next(item) = &outcome {
            last_item = item.item.id.clone();
            outcome = orch
                .submit(&start.session_id, &last_item, (answered % 2) as u8)
                .await
                .unwrap();
            answered += 1;
        }

        let SubmitOutcome::Finalized(summary) = outcome else {
            unreachable!()
        };
        assert_eq!(answered, 5);
        assert_eq!(summary.stop_reason, StopReason::MaxItems);
        assert_eq!(summary.items_administered, 5);

        let state = orch.state(&start.session_id).await.unwrap();
        assert!(state.completed);
        assert_eq!(state.final_score, Some(summary.score));
        assert_eq!(state.theta, summary.theta);

        let err = orch.submit(&start.session_id, &last_item, 1).await.unwrap_err();
        assert!(matches!(err, CatError::SessionCompleted(_)));
    }

    #[tokio::test]
    async fn empty_bank_finalizes_at_start() {
        let (orch, _) = orchestrator(0, CatConfig::default());
        let start = orch.start().await.unwrap();
        let SubmitOutcome::Finalized(summary) = start.outcome else {
            panic!("expected immediate finalization");
        };
        assert_eq!(summary.stop_reason, StopReason::NoItemsAvailable);
        assert_eq!(summary.score, 50.0);
        assert!(orch.state(&start.session_id).await.unwrap().completed);
    }

    #[tokio::test]
    async fn change_control_limits_live_updates() {
        let config = CatConfig {
            change_control: ChangeControl {
                enabled: true,
                early_max_change: 0.2,
                ..ChangeControl::default()
            },
            ..CatConfig::default()
        };
        let (orch, _) = orchestrator(20, config);
        let start = orch.start().await.unwrap();
        let first = next(&start.outcome).item.id.clone();
        let outcome = orch.submit(&start.session_id, &first, 1).await.unwrap();
        assert!((next(&outcome).theta - 0.2).abs() < 1e-12);
    }

    #[tokio::test]
    async fn lock_entries_do_not_outlive_submissions() {
        let config = CatConfig {
            max_items: 2,
            min_items: 1,
            ..CatConfig::default()
        };
        let (orch, _) = orchestrator(20, config);

        for i in 0..1000 {
            let err = orch
                .submit(&format!("CAT_missing_{i}"), "I000", 1)
                .await
                .unwrap_err();
            assert!(matches!(err, CatError::SessionNotFound(_)));
        }
        assert!(orch.locks.lock().await.is_empty());

        // An abandoned, still open session.
        let open = orch.start().await.unwrap();
        let open_first = next(&open.outcome).item.id.clone();
        orch.submit(&open.session_id, &open_first, 1).await.unwrap();
        assert!(orch.locks.lock().await.is_empty());

        let done = orch.start().await.unwrap();
        let mut outcome = done.outcome;
        let mut last = String::new();
        while let SubmitOutcome::Next(item) = &outcome {
            last = item.item.id.clone();
            outcome = orch.submit(&done.session_id, &last, 0).await.unwrap();
        }
        let err = orch.submit(&done.session_id, &last, 1).await.unwrap_err();
        assert!(matches!(err, CatError::SessionCompleted(_)));
        assert!(orch.locks.lock().await.is_empty());
    }
}
