//! Post-run processing utilities.
//!
//! Builds the report, notifies, auto-saves and exports after a run ends, whether it
//! completed or aborted. None of these steps can fail the run.

use crate::cli::Cli;
use crate::model::{ExecutionRecord, RunStatistics};
use crate::notify::Notifier;
use crate::storage;
use crate::text_summary::{build_text_summary, TextSummary};
use std::path::PathBuf;
use tracing::warn;

/// Result of post-run processing, ready for presentation layers.
pub(crate) struct ProcessedRun {
    pub summary: TextSummary,
    pub record: ExecutionRecord,
    pub auto_saved_path: Option<PathBuf>,
    pub export_messages: Vec<String>,
}

/// Report, notify, persist and export a finished run. `fatal` is the abort reason, if any.
pub(crate) async fn process_run_completion(
    args: &Cli,
    notifier: Option<&Notifier>,
    stats: &RunStatistics,
    elapsed_secs: f64,
    fatal: Option<&str>,
) -> ProcessedRun {
    let summary = build_text_summary(stats, elapsed_secs, fatal);
    if let Some(notifier) = notifier {
        notifier
            .send_best_effort(&summary.render(), summary.is_error)
            .await;
    }

    let record = ExecutionRecord::from_stats(&args.country, stats, elapsed_secs);
    let auto_saved_path = if args.auto_save {
        match storage::data_dir(args.data_dir.as_deref())
            .and_then(|dir| storage::save_execution(&dir, &record))
        {
            Ok(p) => Some(p),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "could not save execution record");
                None
            }
        }
    } else {
        None
    };

    let mut export_messages = Vec::new();
    if let Some(export_path) = args.export_json.as_deref() {
        match storage::export_json(export_path, stats) {
            Ok(_) => export_messages.push(format!("Exported JSON: {}", export_path.display())),
            Err(e) => export_messages.push(format!("Export JSON failed: {e:#}")),
        }
    }

    ProcessedRun {
        summary,
        record,
        auto_saved_path,
        export_messages,
    }
}
