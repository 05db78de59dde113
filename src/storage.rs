//! Local JSON store for execution records, plus exports.

use crate::model::ExecutionRecord;
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::{Date, OffsetDateTime};
use tracing::debug;

const APP_DIR: &str = "novelty-bot";
const RUNS_DIR: &str = "runs";

/// Base directory for stored runs: the override if given, else the platform data dir.
pub fn data_dir(override_dir: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = override_dir {
        return Ok(dir.to_path_buf());
    }
    let base = dirs::data_local_dir().context("no local data directory on this platform")?;
    Ok(base.join(APP_DIR))
}

fn file_name(record: &ExecutionRecord) -> String {
    let country: String = record
        .source_country
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!(
        "{}-{}.json",
        record.execution_date.replace(':', "-").replace('T', "_"),
        country
    )
}

pub fn save_execution(base: &Path, record: &ExecutionRecord) -> Result<PathBuf> {
    let dir = base.join(RUNS_DIR);
    std::fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    let path = dir.join(file_name(record));
    let data = serde_json::to_vec_pretty(record)?;
    std::fs::write(&path, data).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

pub fn export_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_vec_pretty(value)?;
    std::fs::write(path, data).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Stored records for `country` (any when `None`) whose execution date falls in the inclusive
/// `since..=until` range, newest first. Unreadable files are skipped.
pub fn load_history(
    base: &Path,
    country: Option<&str>,
    since: Option<Date>,
    until: Option<Date>,
) -> Result<Vec<ExecutionRecord>> {
    let dir = base.join(RUNS_DIR);
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut out: Vec<(OffsetDateTime, ExecutionRecord)> = Vec::new();
    for entry in std::fs::read_dir(&dir).with_context(|| format!("read {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let record: ExecutionRecord = match std::fs::read(&path)
            .map_err(anyhow::Error::from)
            .and_then(|b| serde_json::from_slice(&b).map_err(anyhow::Error::from))
        {
            Ok(r) => r,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "skipping unreadable record");
                continue;
            }
        };
        let Ok(at) = OffsetDateTime::parse(&record.execution_date, &Rfc3339) else {
            debug!(path = %path.display(), "skipping record with bad date");
            continue;
        };
        if country.is_some_and(|c| !record.source_country.eq_ignore_ascii_case(c)) {
            continue;
        }
        let day = at.date();
        if since.is_some_and(|d| day < d) || until.is_some_and(|d| day > d) {
            continue;
        }
        out.push((at, record));
    }

    out.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(out.into_iter().map(|(_, r)| r).collect())
}
