//! Incident engine: pure parsing and classification plus the per-incident state machine.

mod address;
pub mod classifier;
mod discovery;
mod extract;
mod incident;

pub use address::parse_address;
pub use discovery::discover_actionable_incidents;
pub use incident::{process_one, IncidentOutcome};
