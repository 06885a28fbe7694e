//! verdict-assess — batch fraud assessment over the full engine.
//!
//! Reads feature records as JSON lines, runs each through the rule and
//! ensemble validators, and writes one verdict object per line to stdout.
//! Engine state can be restored from and saved to snapshots, so trained
//! models and calibrated thresholds survive between runs.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use serde_json::json;
use tracing::{info, warn};

use verdict_core::{load_dotenv, EngineConfig, FeatureRecord};
use verdict_engine::{Engine, EngineSnapshot, PredictorRegistry};

// ── CLI ─────────────────────────────────────────────────────────────

/// Batch fraud-risk assessment over JSON-line feature records.
#[derive(Parser, Debug)]
#[command(name = "verdict-assess", version, about)]
struct Cli {
    /// Feature records, one JSON object per line.
    input: PathBuf,

    /// Directory of YAML rule documents.
    #[arg(long, env = "VERDICT_RULES_DIR", default_value = "data/rules")]
    rules_dir: PathBuf,

    /// Restore engine state from this snapshot instead of starting fresh.
    #[arg(long, env = "VERDICT_SNAPSHOT")]
    snapshot: Option<PathBuf>,

    /// Write a snapshot here after the run.
    #[arg(long)]
    save_snapshot: Option<PathBuf>,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    load_dotenv();

    let cli = Cli::parse();
    let config = EngineConfig::from_env();
    config.log_summary();

    let engine = match &cli.snapshot {
        Some(path) => {
            let snapshot = EngineSnapshot::load(path)
                .with_context(|| format!("loading snapshot {}", path.display()))?;
            let engine =
                Engine::from_snapshot(config, snapshot, &PredictorRegistry::with_defaults())?;
            info!(path = %path.display(), "engine restored from snapshot");
            engine
        }
        None => {
            let (engine, report) = Engine::from_rules_dir(config, &cli.rules_dir)
                .with_context(|| format!("loading rules from {}", cli.rules_dir.display()))?;
            for skip in &report.skipped {
                warn!(source = %skip.source, reason = %skip.reason, "rule document skipped");
            }
            engine
        }
    };

    let input =
        File::open(&cli.input).with_context(|| format!("opening {}", cli.input.display()))?;
    let mut assessed = 0usize;
    let mut flagged = 0usize;
    for (idx, line) in BufReader::new(input).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: FeatureRecord = serde_json::from_str(&line)
            .with_context(|| format!("parsing record on line {}", idx + 1))?;

        match engine.assess(&record, &[]).await {
            Ok(verdict) => {
                assessed += 1;
                if verdict.requires_review {
                    flagged += 1;
                }
                let out = json!({
                    "item_id": record.item_id,
                    "value": verdict.value,
                    "agreement": verdict.agreement,
                    "confidence": verdict.confidence,
                    "requires_review": verdict.requires_review,
                });
                println!("{out}");
            }
            Err(e) => warn!(item_id = %record.item_id, error = %e, "no verdict for record"),
        }
    }

    info!(assessed, flagged, "batch complete");

    if let Some(path) = &cli.save_snapshot {
        engine.snapshot().save(path)?;
        info!(path = %path.display(), "snapshot written");
    }

    Ok(())
}
