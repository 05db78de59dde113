//! Browser-facing capability consumed by the engine.
//!
//! The engine only states intent ("click the control labelled Yes", "find the field
//! labelled Comuna"); the lookup strategies live behind [`UiAutomation`].

mod chrome;
#[cfg(test)]
pub(crate) mod fake;

pub use chrome::{ChromeOptions, ChromeUi};

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Buttons that accept the "process this novelty?" prompt.
pub const CONFIRM_LABELS: &[&str] = &["Yes", "Sim", "Sí"];
/// Buttons that save the remediation form, strongest match first.
pub const SAVE_LABELS: &[&str] = &["SAVE SOLUCION", "SAVE", "GUARDAR", "ENVIAR"];
/// Buttons on the post-save acknowledgement popup.
pub const ACK_LABELS: &[&str] = &["OK", "Aceptar", "Aceitar"];

#[derive(Debug, Error)]
pub enum UiError {
    #[error("element not found: {0}")]
    ElementNotFound(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("script failed: {0}")]
    Script(String),
    /// The browser or its session is gone; nothing else can run.
    #[error("browser session lost: {0}")]
    SessionLost(String),
}

impl UiError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, UiError::SessionLost(_))
    }
}

/// Opaque reference to an element on the working page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(String);

impl ElementRef {
    pub fn new(selector: impl Into<String>) -> Self {
        Self(selector.into())
    }

    pub fn selector(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A table row exposing an enabled action button, as rendered right now.
#[derive(Debug, Clone)]
pub struct RowHandle {
    /// Zero-based position in document order.
    pub position: usize,
    pub first_cell: Option<String>,
    /// Whether the action button was rendered visibly when the row was scanned.
    pub visible: bool,
    pub action: ElementRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    ModalPresent,
    ModalDismissed,
    ControlLabeled(&'static [&'static str]),
    RowsPresent,
}

#[async_trait]
pub trait UiAutomation: Send {
    async fn find_actionable_rows(&mut self) -> Result<Vec<RowHandle>, UiError>;

    async fn is_visible(&mut self, el: &ElementRef) -> Result<bool, UiError>;

    async fn click(&mut self, el: &ElementRef) -> Result<(), UiError>;

    async fn set_value(&mut self, el: &ElementRef, value: &str) -> Result<(), UiError>;

    /// Returns `true` as soon as any condition holds, `false` once `timeout` elapses.
    async fn wait_for_any(
        &mut self,
        conditions: &[Condition],
        timeout: Duration,
    ) -> Result<bool, UiError>;

    /// First visible button whose text contains one of `labels`, in label order.
    async fn find_control(&mut self, labels: &[&str]) -> Result<Option<ElementRef>, UiError>;

    /// First visible input matching one of `labels` by id, name, placeholder or nearby text.
    async fn find_field(&mut self, labels: &[&str]) -> Result<Option<ElementRef>, UiError>;

    async fn current_surface_text(&mut self) -> Result<String, UiError>;

    /// Close every browser surface except the working page and return how many were closed.
    async fn close_extra_surfaces(&mut self) -> Result<u32, UiError>;

    /// Switch the listing to `size` rows per page. `Ok(false)` when no such control exists.
    async fn engage_page_size(&mut self, size: u32) -> Result<bool, UiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_session_loss_is_fatal() {
        assert!(UiError::SessionLost("closed".into()).is_fatal());
        assert!(!UiError::ElementNotFound("#x".into()).is_fatal());
        assert!(!UiError::Timeout(Duration::from_secs(1)).is_fatal());
        assert!(!UiError::Script("boom".into()).is_fatal());
    }
}
