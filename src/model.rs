use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::ui::ElementRef;

pub const UNKNOWN_NAME: &str = "unknown name";
pub const UNKNOWN_ADDRESS: &str = "unknown address";
pub const PHONE_NOT_PROVIDED: &str = "not provided";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub run_id: String,
    pub country: String,
    pub novelties_url: String,
    /// Hard cap on discovery cycles for one run.
    pub max_iterations: u32,
    pub page_size: u32,
    #[serde(with = "humantime_serde")]
    pub confirm_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub settle_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub verify_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub op_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub cycle_pause: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            run_id: String::new(),
            country: "chile".into(),
            novelties_url: "https://app.dropi.cl/dashboard/novelties".into(),
            max_iterations: 1000,
            page_size: 1000,
            confirm_timeout: Duration::from_secs(10),
            settle_delay: Duration::from_secs(2),
            verify_timeout: Duration::from_secs(10),
            op_timeout: Duration::from_secs(15),
            cycle_pause: Duration::from_secs(2),
        }
    }
}

/// Handle to one actionable row, valid only for the discovery cycle that produced it.
#[derive(Debug, Clone)]
pub struct IncidentRecord {
    pub id: String,
    /// `id` came from the row itself rather than its position, so it names one incident.
    pub keyed: bool,
    pub action: ElementRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub name: String,
    pub address: String,
    pub phone: String,
    #[serde(default)]
    pub automatic_message: Option<String>,
}

impl Default for CustomerInfo {
    fn default() -> Self {
        Self {
            name: UNKNOWN_NAME.into(),
            address: UNKNOWN_ADDRESS.into(),
            phone: PHONE_NOT_PROVIDED.into(),
            automatic_message: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressComponents {
    pub street: String,
    pub house_number: String,
    pub district: String,
    pub region: String,
}

impl Default for AddressComponents {
    fn default() -> Self {
        Self {
            street: String::new(),
            house_number: "1".into(),
            district: String::new(),
            region: String::new(),
        }
    }
}

/// Stages of a single incident, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    Open,
    AwaitConfirm,
    Confirm,
    Extract,
    Classify,
    Fill,
    Submit,
    Verify,
    Cleanup,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Step::Open => "open",
            Step::AwaitConfirm => "await-confirm",
            Step::Confirm => "confirm",
            Step::Extract => "extract",
            Step::Classify => "classify",
            Step::Fill => "fill",
            Step::Submit => "submit",
            Step::Verify => "verify",
            Step::Cleanup => "cleanup",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItem {
    pub id: String,
    pub error_message: String,
    pub step: Step,
    /// Times this id failed during the run; repeats never add a second entry.
    pub attempts: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStatistics {
    #[serde(default)]
    pub started_at: String,
    pub cycles: u32,
    pub processed_count: u32,
    pub success_count: u32,
    pub failed_count: u32,
    pub failed_items: Vec<FailedItem>,
    pub closed_extra_tabs: u32,
    pub found_pagination_control: bool,
}

impl RunStatistics {
    pub fn started_now() -> Self {
        Self {
            started_at: now_rfc3339(),
            ..Default::default()
        }
    }

    pub fn record_success(&mut self, closed_tabs: u32) {
        self.success_count += 1;
        self.closed_extra_tabs += closed_tabs;
    }

    pub fn record_failure(&mut self, id: &str, step: Step, error_message: String) {
        match self.failed_items.iter_mut().find(|f| f.id == id) {
            Some(existing) => {
                existing.attempts += 1;
                existing.step = step;
                existing.error_message = error_message;
            }
            None => self.push_failure(id, step, error_message),
        }
        self.failed_count = self.failed_items.len() as u32;
    }

    /// Failure of a row known only by position. The same `Row N` label can name a
    /// different incident every cycle, so each one gets its own entry.
    pub fn record_positional_failure(&mut self, id: &str, step: Step, error_message: String) {
        self.push_failure(id, step, error_message);
        self.failed_count = self.failed_items.len() as u32;
    }

    fn push_failure(&mut self, id: &str, step: Step, error_message: String) {
        self.failed_items.push(FailedItem {
            id: id.to_string(),
            error_message,
            step,
            attempts: 1,
        });
    }
}

/// Structured progress events emitted by the controller and consumed by CLI layers.
#[derive(Debug, Clone, Serialize)]
pub enum RunEvent {
    PageSizeEngaged {
        engaged: bool,
    },
    CycleStarted {
        cycle: u32,
        discovered: usize,
    },
    IncidentStarted {
        id: String,
    },
    IncidentFinished {
        id: String,
        ok: bool,
        error: Option<String>,
    },
    Info(String),
    RunCompleted {
        // Boxed so the enum stays small.
        stats: Box<RunStatistics>,
    },
}

impl RunEvent {
    /// Render a human-readable line for text mode.
    pub fn to_message(&self) -> Option<String> {
        match self {
            RunEvent::PageSizeEngaged { engaged: true } => Some("Page size engaged".into()),
            RunEvent::PageSizeEngaged { engaged: false } => {
                Some("Page size control not found, continuing with default".into())
            }
            RunEvent::CycleStarted { cycle, discovered } => {
                Some(format!("== cycle {cycle}: {discovered} actionable =="))
            }
            RunEvent::IncidentStarted { id } => Some(format!("Processing {id}")),
            RunEvent::IncidentFinished { id, ok: true, .. } => Some(format!("{id}: saved")),
            RunEvent::IncidentFinished { id, error, .. } => Some(format!(
                "{id}: failed ({})",
                error.as_deref().unwrap_or("unknown error")
            )),
            RunEvent::Info(msg) => Some(msg.clone()),
            RunEvent::RunCompleted { .. } => None,
        }
    }
}

/// Row persisted once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_date: String,
    pub source_country: String,
    pub total_processed: u32,
    pub successful: u32,
    pub failed: u32,
    pub execution_time_seconds: f64,
}

impl ExecutionRecord {
    pub fn from_stats(country: &str, stats: &RunStatistics, elapsed_secs: f64) -> Self {
        Self {
            execution_date: now_rfc3339(),
            source_country: country.to_string(),
            total_processed: stats.processed_count,
            successful: stats.success_count,
            failed: stats.failed_count,
            execution_time_seconds: elapsed_secs,
        }
    }
}

/// JSON-mode output for one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub country: String,
    pub execution_time_seconds: f64,
    /// The execution record as persisted by `--auto-save`.
    pub record: ExecutionRecord,
    /// Abort reason when the browser session was lost mid-run.
    pub aborted: Option<String>,
    pub stats: RunStatistics,
    pub saved_path: Option<String>,
}

pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "now".into())
}
