use crate::model::IncidentRecord;
use crate::ui::{UiAutomation, UiError};
use tracing::debug;

/// Rows that can be acted on right now, in document order.
///
/// An empty result is the normal "no work left" signal. Handles are only good for the
/// current cycle, so callers re-run discovery instead of caching the result.
pub async fn discover_actionable_incidents<U>(ui: &mut U) -> Result<Vec<IncidentRecord>, UiError>
where
    U: UiAutomation + ?Sized,
{
    let rows = ui.find_actionable_rows().await?;
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        if !row.visible {
            debug!(position = row.position, "skipping hidden row");
            continue;
        }
        let cell = row
            .first_cell
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        let keyed = cell.is_some();
        let id = cell.unwrap_or_else(|| format!("Row {}", row.position + 1));
        records.push(IncidentRecord {
            id,
            keyed,
            action: row.action,
        });
    }
    Ok(records)
}
