//! The `adaptest run` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use adaptest_bank::load_config_from;
use adaptest_core::model::Response;
use adaptest_core::report::SessionReport;
use adaptest_core::session::{NextItem, SessionSummary, SubmitOutcome};

use super::{build_orchestrator, load_repository};

/// Where answers come from: a scripted list or the terminal.
enum AnswerSource {
    Scripted(std::vec::IntoIter<u8>),
    Stdin(Lines<BufReader<Stdin>>),
}

impl AnswerSource {
    fn scripted(raw: &str) -> Result<Self> {
        let answers = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<u8>()
                    .with_context(|| format!("invalid answer: {s:?} (expected 0 or 1)"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::Scripted(answers.into_iter()))
    }

    fn stdin() -> Self {
        Self::Stdin(BufReader::new(tokio::io::stdin()).lines())
    }

    async fn next(&mut self, item: &NextItem) -> Result<Option<u8>> {
        match self {
            Self::Scripted(answers) => Ok(answers.next()),
            Self::Stdin(lines) => loop {
                eprint!(
                    "Q{} [{}] a={} b={} g={}  answer (0/1): ",
                    item.item_number, item.item.id, item.item.params.a, item.item.params.b,
                    item.item.params.g
                );
                let Some(line) = lines.next_line().await? else {
                    return Ok(None);
                };
                match line.trim() {
                    "0" => return Ok(Some(0)),
                    "1" => return Ok(Some(1)),
                    other => eprintln!("  please answer 0 or 1 (got {other:?})"),
                }
            },
        }
    }
}

#[derive(Serialize)]
struct RunOutput<'a> {
    summary: &'a SessionSummary,
    report_path: &'a PathBuf,
}

pub async fn execute(
    bank: Option<PathBuf>,
    answers: Option<String>,
    output: Option<PathBuf>,
    json: bool,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let repository = load_repository(bank, &config)?;
    let bank_size = repository.len();
    let (orchestrator, _store) = build_orchestrator(repository, &config)?;

    let mut source = match answers {
        Some(raw) => AnswerSource::scripted(&raw)?,
        None => AnswerSource::stdin(),
    };

    let start = orchestrator.start().await?;
    let session_id = start.session_id;
    tracing::info!(session_id = %session_id, items = bank_size, "session started");

    let mut outcome = start.outcome;
    let summary = loop {
        match outcome {
            SubmitOutcome::Next(next) => {
                let Some(answer) = source.next(&next).await? else {
                    anyhow::bail!(
                        "ran out of answers after {} item(s); session {session_id} left open",
                        next.item_number - 1
                    );
                };
                outcome = orchestrator.submit(&session_id, &next.item.id, answer).await?;
            }
            SubmitOutcome::Finalized(summary) => break summary,
        }
    };

    let record = orchestrator.record(&session_id).await?;
    let report = SessionReport::from_record(&record);
    let output_dir = output.unwrap_or_else(|| config.output_dir.clone());
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;
    let report_path = output_dir.join(format!("{session_id}.json"));
    report.save_json(&report_path)?;

    if json {
        let out = RunOutput {
            summary: &summary,
            report_path: &report_path,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    print_transcript(&record.responses);
    println!(
        "Result: theta {:.3}  se {:.3}  score {:.1}  ({} items, stopped on {}, {} engine)",
        summary.theta,
        summary.se,
        summary.score,
        summary.items_administered,
        summary.stop_reason,
        summary.strategy
    );
    eprintln!("Report saved to {}", report_path.display());
    Ok(())
}

fn print_transcript(responses: &[Response]) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec!["#", "Item", "Answer", "P(correct)", "θ before", "θ after", "SE"]);

    for r in responses {
        table.add_row(vec![
            Cell::new(r.order),
            Cell::new(&r.item_id),
            Cell::new(r.answer),
            Cell::new(format!("{:.3}", r.probability)),
            Cell::new(format!("{:.3}", r.theta_before)),
            Cell::new(format!("{:.3}", r.theta_after)),
            Cell::new(format!("{:.3}", r.se_after)),
        ]);
    }

    println!("{table}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_answers_parse() {
        let AnswerSource::Scripted(answers) = AnswerSource::scripted("1, 0,1,").unwrap() else {
            panic!("expected scripted answers");
        };
        assert_eq!(answers.collect::<Vec<_>>(), vec![1, 0, 1]);
        assert!(AnswerSource::scripted("1,x").is_err());
    }
}
