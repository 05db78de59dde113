//! Text summary builder for CLI output and notifications.
//!
//! Pure formatting over [`RunStatistics`]; delivery is up to the caller.

use crate::model::RunStatistics;

const FAILURE_SAMPLES: usize = 5;
const ERROR_PREVIEW_CHARS: usize = 50;
const FATAL_PREVIEW_CHARS: usize = 200;

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
    /// The run aborted; notifications use the error colour.
    pub is_error: bool,
}

impl TextSummary {
    pub fn render(&self) -> String {
        self.lines.join("\n")
    }
}

/// Build the end-of-run report. `fatal` is the abort reason when the run did not complete.
pub(crate) fn build_text_summary(
    stats: &RunStatistics,
    elapsed_secs: f64,
    fatal: Option<&str>,
) -> TextSummary {
    let minutes = elapsed_secs / 60.0;
    let mut lines = Vec::new();

    match fatal {
        None => {
            lines.push("Run completed".to_string());
            lines.push(String::new());
            lines.push(format!("Processed:   {}", stats.processed_count));
            lines.push(format!("Successful:  {}", stats.success_count));
            lines.push(format!("Failed:      {}", stats.failed_count));
            lines.push(format!("Closed tabs: {}", stats.closed_extra_tabs));
            lines.push(format!("Cycles:      {}", stats.cycles));
            lines.push(format!("Elapsed:     {minutes:.2} min"));
            lines.push(format!(
                "Page size engaged: {}",
                if stats.found_pagination_control { "yes" } else { "no" }
            ));
        }
        Some(reason) => {
            lines.push("Run aborted".to_string());
            lines.push(String::new());
            lines.push(format!("Error: {}", preview(reason, FATAL_PREVIEW_CHARS)));
            lines.push(format!(
                "Progress before abort: {} successful, {} failed",
                stats.success_count, stats.failed_count
            ));
            lines.push(format!("Elapsed:     {minutes:.2} min"));
        }
    }

    if !stats.failed_items.is_empty() {
        lines.push(String::new());
        lines.push("Failed items:".to_string());
        for item in stats.failed_items.iter().take(FAILURE_SAMPLES) {
            lines.push(format!(
                "- {} [{}]: {}",
                item.id,
                item.step,
                preview(&item.error_message, ERROR_PREVIEW_CHARS)
            ));
        }
        if stats.failed_items.len() > FAILURE_SAMPLES {
            lines.push(format!(
                "- ... and {} more",
                stats.failed_items.len() - FAILURE_SAMPLES
            ));
        }
    }

    TextSummary {
        lines,
        is_error: fatal.is_some(),
    }
}

/// Truncate on a char boundary, marking the cut.
fn preview(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
