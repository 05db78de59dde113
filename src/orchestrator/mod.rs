//! Application-level orchestration utilities.
//!
//! This module owns the run loop over discovered incidents and post-run processing such as
//! reporting, notification, auto-save and exports. CLI layers call into this module to keep
//! responsibilities separated.

mod controller;
mod post_process;

pub(crate) use controller::run_session;
pub(crate) use post_process::process_run_completion;
