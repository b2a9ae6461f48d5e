//! export_violations - dump recent violation records to a JSON file

use anyhow::{anyhow, Result};
use clap::Parser;
use serde::Serialize;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::SystemTime;

use helmet_witness::frame::epoch_secs;
use helmet_witness::storage::StoredViolation;
use helmet_witness::{SqliteViolationStore, ViolationStore};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the violations database.
    #[arg(long, env = "HELMET_DB_PATH", default_value = "helmet.db")]
    db_path: String,
    /// Maximum number of records to export, newest first.
    #[arg(long, default_value_t = 100)]
    limit: usize,
    /// Output file path for the export.
    #[arg(long, default_value = "violations_export.json")]
    output: String,
    /// Evidence directory; when given, each record is checked for its image.
    #[arg(long, env = "HELMET_EVIDENCE_DIR")]
    evidence_dir: Option<PathBuf>,
    /// UI mode for stderr progress.
    #[arg(long, value_enum, default_value_t = ui::UiMode::Auto, value_name = "MODE")]
    ui: ui::UiMode,
}

#[derive(Serialize)]
struct ExportedViolation {
    #[serde(flatten)]
    stored: StoredViolation,
    #[serde(skip_serializing_if = "Option::is_none")]
    evidence_present: Option<bool>,
}

#[derive(Serialize)]
struct ExportBundle {
    exported_at: u64,
    total_records: u64,
    violations: Vec<ExportedViolation>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    if args.limit == 0 {
        return Err(anyhow!("--limit must be greater than zero"));
    }
    let ui = ui::Ui::new(
        args.ui,
        std::io::stderr().is_terminal(),
        std::io::stdout().is_terminal(),
    );

    let mut store = {
        let _stage = ui.stage("Open violations database");
        SqliteViolationStore::open(&args.db_path)?
    };
    let (total_records, recent) = {
        let _stage = ui.stage("Read violation records");
        (store.count()?, store.list_recent(args.limit)?)
    };

    let mut violations = Vec::with_capacity(recent.len());
    {
        let mut stage = ui.counted("Check evidence images", recent.len() as u64);
        for stored in recent {
            let evidence_present = args
                .evidence_dir
                .as_ref()
                .map(|dir| dir.join(&stored.record.violation_image).is_file());
            violations.push(ExportedViolation {
                stored,
                evidence_present,
            });
            stage.tick();
        }
    }

    let missing = violations
        .iter()
        .filter(|v| v.evidence_present == Some(false))
        .count();
    let bundle = ExportBundle {
        exported_at: epoch_secs(SystemTime::now()),
        total_records,
        violations,
    };
    let json = serde_json::to_vec_pretty(&bundle)?;
    {
        let _stage = ui.stage("Write export");
        std::fs::write(&args.output, json)
            .map_err(|e| anyhow!("failed to write {}: {}", args.output, e))?;
    }
    println!(
        "{} of {} violation records written to {}",
        bundle.violations.len(),
        total_records,
        args.output
    );
    if missing > 0 {
        eprintln!("warning: {} records have no evidence image on disk", missing);
    }
    Ok(())
}
