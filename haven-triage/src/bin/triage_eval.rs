//! Triage Evaluation Utility
//!
//! Replays a labeled message corpus through the full screening pipeline and
//! reports a per-class confusion matrix with precision and recall. Run this
//! against the regression corpus before deploying a term table or pattern
//! library change.
//!
//! Exits non-zero when any crisis-labeled case is classified below CRISIS:
//! crisis recall on the regression corpus is a hard gate, not a statistic.
//!
//! **Usage:**
//! ```bash
//! triage-eval --corpus testdata/eval_sample.jsonl [--content-dir <DIR>] \
//!     [--set caution_threshold=0.2] [--verbose]
//! ```

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Deserialize;
use tracing::info;

use haven_audit::AuditLedger;
use haven_common::config::{apply_param_overrides, resolve_content_dir};
use haven_common::events::EventBus;
use haven_common::redact::Pseudonymizer;
use haven_common::types::{Message, RiskLevel};
use haven_common::PARAMS;
use haven_triage::{ContentSet, EscalationManager, TriageEngine};

/// Screening evaluation utility
#[derive(Parser, Debug)]
#[clap(name = "triage-eval")]
#[clap(about = "Replay a labeled corpus through the screening pipeline and report accuracy")]
struct Args {
    /// Labeled corpus in JSON Lines form: {"text": "...", "expected": "safe|caution|crisis"}
    #[clap(long, value_name = "FILE")]
    corpus: PathBuf,

    /// Directory holding terms.toml and clinical.toml
    #[clap(long, value_name = "DIR", env = "HAVEN_CONTENT_DIR")]
    content_dir: Option<String>,

    /// Override a screening parameter, e.g. --set caution_threshold=0.2
    #[clap(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    /// List every misclassified case
    #[clap(long)]
    verbose: bool,
}

/// One labeled corpus case
#[derive(Debug, Deserialize)]
struct CorpusCase {
    text: String,
    expected: RiskLevel,
}

/// (expected, classified) -> count
type Confusion = BTreeMap<(RiskLevel, RiskLevel), usize>;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    info!("Starting triage-eval v{}", env!("CARGO_PKG_VERSION"));

    apply_param_overrides().context("applying config file parameter overrides")?;
    for pair in &args.overrides {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("--set {pair:?} is not KEY=VALUE"))?;
        PARAMS.set_by_key(key, value).map_err(anyhow::Error::msg)?;
        info!("Parameter override: {} = {}", key, value);
    }

    let content_dir = resolve_content_dir(args.content_dir.as_deref(), "HAVEN_CONTENT_DIR")?;
    info!("Content directory: {}", content_dir.display());
    let content = ContentSet::load(&content_dir)
        .with_context(|| format!("loading screening content from {}", content_dir.display()))?;

    let ledger = Arc::new(AuditLedger::new());
    let events = EventBus::new(1024);
    let escalation = Arc::new(EscalationManager::new(Arc::clone(&ledger), events.clone()));
    let engine = TriageEngine::new(
        &content,
        Arc::clone(&ledger),
        events,
        escalation,
        Pseudonymizer::ephemeral(),
    )
    .await?;

    let file = File::open(&args.corpus)
        .with_context(|| format!("opening corpus {}", args.corpus.display()))?;
    let reader = BufReader::new(file);

    let mut confusion: Confusion = BTreeMap::new();
    let mut misclassified: Vec<(RiskLevel, RiskLevel, String)> = Vec::new();
    let mut total = 0usize;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let case: CorpusCase = serde_json::from_str(&line)
            .with_context(|| format!("corpus line {}", line_no + 1))?;

        // Fresh session per case keeps duplicate-crisis merging out of the
        // evaluation
        let message = Message::new(case.text.clone(), "eval-student", uuid::Uuid::new_v4());
        let result = engine.scan_message(&message).await?;

        *confusion
            .entry((case.expected, result.risk_level))
            .or_insert(0) += 1;
        total += 1;
        if result.risk_level != case.expected {
            misclassified.push((case.expected, result.risk_level, case.text));
        }
    }

    if total == 0 {
        bail!("corpus {} contained no cases", args.corpus.display());
    }

    let (term_version, pattern_version) = engine.content_versions();
    println!();
    println!(
        "corpus: {} cases  content: terms {} / clinical {}",
        total, term_version, pattern_version
    );
    println!();
    println!(
        "{:<10} {:>6} {:>6} {:>6} {:>10} {:>10}",
        "class", "tp", "fp", "fn", "precision", "recall"
    );
    for level in [RiskLevel::Safe, RiskLevel::Caution, RiskLevel::Crisis] {
        let (tp, fp, fn_) = class_counts(&confusion, level);
        println!(
            "{:<10} {:>6} {:>6} {:>6} {:>10} {:>10}",
            level.as_str(),
            tp,
            fp,
            fn_,
            format_ratio(tp, tp + fp),
            format_ratio(tp, tp + fn_)
        );
    }

    if !misclassified.is_empty() {
        println!();
        println!("misclassified: {}", misclassified.len());
        if args.verbose {
            for (expected, got, text) in &misclassified {
                println!(
                    "  expected {:<8} got {:<8} {:?}",
                    expected.as_str(),
                    got.as_str(),
                    text
                );
            }
        } else {
            info!("run with --verbose to list misclassified cases");
        }
    }

    let checked = ledger.verify().await?;
    info!(entries = checked, "audit chain verified after replay");

    let missed_crisis = misclassified
        .iter()
        .filter(|(expected, got, _)| *expected == RiskLevel::Crisis && *got != RiskLevel::Crisis)
        .count();
    if missed_crisis > 0 {
        bail!("{missed_crisis} crisis case(s) were not classified as crisis");
    }

    Ok(())
}

/// True positives, false positives and false negatives for one class
fn class_counts(confusion: &Confusion, level: RiskLevel) -> (usize, usize, usize) {
    let mut tp = 0;
    let mut fp = 0;
    let mut fn_ = 0;
    for (&(expected, got), &count) in confusion {
        if got == level {
            if expected == level {
                tp += count;
            } else {
                fp += count;
            }
        } else if expected == level {
            fn_ += count;
        }
    }
    (tp, fp, fn_)
}

fn format_ratio(numerator: usize, denominator: usize) -> String {
    if denominator == 0 {
        "n/a".to_string()
    } else {
        format!("{:.3}", numerator as f64 / denominator as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_counts() {
        let mut confusion: Confusion = BTreeMap::new();
        confusion.insert((RiskLevel::Crisis, RiskLevel::Crisis), 4);
        confusion.insert((RiskLevel::Caution, RiskLevel::Crisis), 1);
        confusion.insert((RiskLevel::Crisis, RiskLevel::Caution), 2);
        confusion.insert((RiskLevel::Safe, RiskLevel::Safe), 10);

        let (tp, fp, fn_) = class_counts(&confusion, RiskLevel::Crisis);
        assert_eq!((tp, fp, fn_), (4, 1, 2));

        let (tp, fp, fn_) = class_counts(&confusion, RiskLevel::Safe);
        assert_eq!((tp, fp, fn_), (10, 0, 0));

        let (tp, fp, fn_) = class_counts(&confusion, RiskLevel::Caution);
        assert_eq!((tp, fp, fn_), (0, 2, 1));
    }

    #[test]
    fn test_format_ratio_handles_zero_denominator() {
        assert_eq!(format_ratio(3, 4), "0.750");
        assert_eq!(format_ratio(0, 0), "n/a");
    }
}
