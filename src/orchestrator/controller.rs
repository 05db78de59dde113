//! Run lifecycle controller.
//!
//! Re-discovers work before every attempt, processes only the first actionable row, and
//! stops on an empty discovery or at the iteration bound. Emits events for presentation layers.

use crate::engine::{discover_actionable_incidents, process_one, IncidentOutcome};
use crate::model::{RunConfig, RunEvent, RunStatistics};
use crate::ui::{ChromeOptions, ChromeUi, UiAutomation, UiError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

/// The browser became unusable. Carries whatever progress was made before that.
#[derive(Debug, Error)]
#[error("run aborted: {source}")]
pub(crate) struct RunAborted {
    pub stats: RunStatistics,
    #[source]
    pub source: UiError,
}

impl RunAborted {
    /// Abort before any incident was touched.
    pub fn before_start(source: UiError) -> Self {
        Self {
            stats: RunStatistics::started_now(),
            source,
        }
    }
}

/// Process incidents until none are left or `cfg.max_iterations` cycles have run.
pub(crate) async fn run_controller<U>(
    ui: &mut U,
    cfg: &RunConfig,
    event_tx: UnboundedSender<RunEvent>,
) -> Result<RunStatistics, RunAborted>
where
    U: UiAutomation + ?Sized,
{
    let mut stats = RunStatistics::started_now();

    match ui.engage_page_size(cfg.page_size).await {
        Ok(engaged) => {
            stats.found_pagination_control = engaged;
            if !engaged {
                warn!(page_size = cfg.page_size, "page size control not found");
            }
            let _ = event_tx.send(RunEvent::PageSizeEngaged { engaged });
        }
        Err(e) if e.is_fatal() => return Err(RunAborted { stats, source: e }),
        Err(e) => {
            warn!(error = %e, "could not engage page size");
            let _ = event_tx.send(RunEvent::PageSizeEngaged { engaged: false });
        }
    }

    let mut drained = false;
    while stats.cycles < cfg.max_iterations {
        stats.cycles += 1;
        let cycle = stats.cycles;

        let records = match discover_actionable_incidents(ui).await {
            Ok(records) => records,
            Err(e) if e.is_fatal() => return Err(RunAborted { stats, source: e }),
            Err(e) => {
                warn!(cycle, error = %e, "discovery failed");
                pause(cfg.cycle_pause).await;
                continue;
            }
        };
        let _ = event_tx.send(RunEvent::CycleStarted {
            cycle,
            discovered: records.len(),
        });

        // Acting on a row reshapes the table, so only the first handle is trusted.
        let Some(record) = records.into_iter().next() else {
            info!(cycle, "no actionable novelties left");
            drained = true;
            break;
        };

        let _ = event_tx.send(RunEvent::IncidentStarted {
            id: record.id.clone(),
        });
        let outcome = match process_one(ui, cfg, &record).await {
            Ok(outcome) => outcome,
            Err(e) => return Err(RunAborted { stats, source: e }),
        };
        stats.processed_count += 1;
        match outcome {
            IncidentOutcome::Submitted(sub) => {
                stats.record_success(sub.closed_tabs);
                let _ = event_tx.send(RunEvent::IncidentFinished {
                    id: sub.id,
                    ok: true,
                    error: None,
                });
            }
            IncidentOutcome::Failed { id, error } => {
                let message = error.to_string();
                if record.keyed {
                    stats.record_failure(&id, error.step(), message.clone());
                } else {
                    stats.record_positional_failure(&id, error.step(), message.clone());
                }
                let _ = event_tx.send(RunEvent::IncidentFinished {
                    id,
                    ok: false,
                    error: Some(message),
                });
            }
        }

        pause(cfg.cycle_pause).await;
    }

    if !drained {
        warn!(
            max_iterations = cfg.max_iterations,
            "iteration bound reached with work possibly remaining"
        );
    }
    info!(
        cycles = stats.cycles,
        succeeded = stats.success_count,
        failed = stats.failed_count,
        "run finished"
    );
    let _ = event_tx.send(RunEvent::RunCompleted {
        stats: Box::new(stats.clone()),
    });
    Ok(stats)
}

/// Attach to or launch the browser, open the novelties listing and run the controller on it.
pub(crate) async fn run_session(
    opts: &ChromeOptions,
    cfg: &RunConfig,
    event_tx: UnboundedSender<RunEvent>,
) -> Result<RunStatistics, RunAborted> {
    let mut ui = ChromeUi::start(opts)
        .await
        .map_err(|e| RunAborted::before_start(UiError::SessionLost(format!("{e:#}"))))?;

    if let Err(e) = ui.open(&cfg.novelties_url).await {
        ui.shutdown().await;
        return Err(RunAborted::before_start(e));
    }
    let _ = event_tx.send(RunEvent::Info(format!("Opened {}", cfg.novelties_url)));

    let res = run_controller(&mut ui, cfg, event_tx).await;
    ui.shutdown().await;
    res
}

async fn pause(d: Duration) {
    if !d.is_zero() {
        tokio::time::sleep(d).await;
    }
}
