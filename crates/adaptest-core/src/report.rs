//! Session reports with JSON persistence.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{Response, SessionRecord, SessionState};

/// A complete record of one test session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    /// Unique report identifier.
    pub id: Uuid,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    /// Final session state.
    pub session: SessionState,
    /// Responses in administration order.
    pub responses: Vec<Response>,
    /// Summary statistics.
    pub summary: ReportSummary,
}

/// Aggregate figures over a session's responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub items_administered: usize,
    pub correct: usize,
    pub proportion_correct: f64,
    /// Mean item information at the theta each item was administered at.
    pub mean_information: f64,
    /// Wall-clock time from session creation to the last update.
    pub duration_ms: u64,
}

impl ReportSummary {
    pub fn from_responses(responses: &[Response], state: &SessionState) -> Self {
        let n = responses.len();
        let correct = responses.iter().filter(|r| r.answer.is_correct()).count();
        let (proportion_correct, mean_information) = if n == 0 {
            (0.0, 0.0)
        } else {
            let info: f64 = responses.iter().map(|r| r.information).sum();
            (correct as f64 / n as f64, info / n as f64)
        };
        let duration_ms = (state.updated_at - state.created_at)
            .num_milliseconds()
            .max(0) as u64;
        Self {
            items_administered: n,
            correct,
            proportion_correct,
            mean_information,
            duration_ms,
        }
    }
}

impl SessionReport {
    pub fn from_record(record: &SessionRecord) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            session: record.state.clone(),
            responses: record.responses.clone(),
            summary: ReportSummary::from_responses(&record.responses, &record.state),
        }
    }

    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: SessionReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }

    /// Format the report as markdown.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        let state = &self.session;

        md.push_str(&format!("## Session {}\n\n", state.session_id));
        match (state.stop_reason, state.final_score) {
            (Some(reason), Some(score)) => md.push_str(&format!(
                "**Result:** score {:.1} (theta {:.3}, SE {:.3}), stopped on {}\n\n",
                score, state.theta, state.se, reason
            )),
            _ => md.push_str(&format!(
                "**In progress:** theta {:.3}, SE {:.3}\n\n",
                state.theta, state.se
            )),
        }
        md.push_str(&format!(
            "**Summary:** {} items, {} correct ({:.1}%), mean information {:.3}\n\n",
            self.summary.items_administered,
            self.summary.correct,
            self.summary.proportion_correct * 100.0,
            self.summary.mean_information
        ));

        if !self.responses.is_empty() {
            md.push_str("| # | Item | Answer | P(correct) | Info | Theta | SE |\n");
            md.push_str("|---|------|--------|------------|------|-------|----|\n");
            for r in &self.responses {
                md.push_str(&format!(
                    "| {} | {} | {} | {:.3} | {:.3} | {:.3} | {:.3} |\n",
                    r.order,
                    r.item_id,
                    r.answer,
                    r.probability,
                    r.information,
                    r.theta_after,
                    r.se_after
                ));
            }
        }

        md
    }
}
