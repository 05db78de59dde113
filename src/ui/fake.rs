//! Scripted in-memory stand-in for the browser, used by engine and controller tests.

use super::{
    Condition, ElementRef, RowHandle, UiAutomation, UiError, ACK_LABELS, CONFIRM_LABELS,
    SAVE_LABELS,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;

type RowScript = Box<dyn FnMut(u32) -> Vec<RowHandle> + Send>;

pub(crate) struct FakeUi {
    rows: Vec<RowHandle>,
    row_script: Option<RowScript>,
    pub discovery_calls: u32,
    /// Discovery calls (1-based) that fail with a non-fatal script error.
    pub failing_discoveries: HashSet<u32>,
    pub visibility_checks: u32,
    pub hidden: HashSet<ElementRef>,
    /// Handles that no longer resolve when clicked.
    pub stale: HashSet<ElementRef>,
    pub prompt_appears: bool,
    pub dismiss_on_save: bool,
    pub ack_on_save: bool,
    pub controls: HashSet<&'static str>,
    pub fields: HashSet<&'static str>,
    pub surface_text: String,
    pub extra_surfaces: u32,
    pub page_size_control: bool,
    pub session_lost: bool,
    /// Lose the session once this many discovery calls have completed.
    pub lose_session_after: Option<u32>,
    pub values: Vec<(String, String)>,
    pub clicks: Vec<String>,
    prompt_open: bool,
    modal_open: bool,
    ack_visible: bool,
}

impl FakeUi {
    /// A page where every step of the happy path succeeds, with no rows yet.
    pub fn new() -> Self {
        Self {
            rows: Vec::new(),
            row_script: None,
            discovery_calls: 0,
            failing_discoveries: HashSet::new(),
            visibility_checks: 0,
            hidden: HashSet::new(),
            stale: HashSet::new(),
            prompt_appears: true,
            dismiss_on_save: true,
            ack_on_save: false,
            controls: ["Yes", "SAVE SOLUCION", "OK"].into_iter().collect(),
            fields: ["Calle", "Numero", "Comuna", "Region", "Nombre", "Celular"]
                .into_iter()
                .collect(),
            surface_text: String::new(),
            extra_surfaces: 0,
            page_size_control: true,
            session_lost: false,
            lose_session_after: None,
            values: Vec::new(),
            clicks: Vec::new(),
            prompt_open: false,
            modal_open: false,
            ack_visible: false,
        }
    }

    pub fn row(position: usize, first_cell: Option<&str>) -> RowHandle {
        RowHandle {
            position,
            first_cell: first_cell.map(str::to_string),
            visible: true,
            action: ElementRef::new(format!("row-{}", position + 1)),
        }
    }

    pub fn with_rows(mut self, rows: Vec<RowHandle>) -> Self {
        self.rows = rows;
        self
    }

    /// Rows returned per discovery call; the closure gets the 1-based call number.
    pub fn with_row_script(
        mut self,
        script: impl FnMut(u32) -> Vec<RowHandle> + Send + 'static,
    ) -> Self {
        self.row_script = Some(Box::new(script));
        self
    }

    pub fn value_of(&self, field: &str) -> Option<&str> {
        let key = format!("field:{field}");
        self.values
            .iter()
            .rev()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    fn check_session(&self) -> Result<(), UiError> {
        if self.session_lost {
            return Err(UiError::SessionLost("browser closed".into()));
        }
        Ok(())
    }

    fn control_visible(&self, label: &str) -> bool {
        if !self.controls.contains(label) {
            return false;
        }
        if CONFIRM_LABELS.contains(&label) {
            self.prompt_open
        } else if SAVE_LABELS.contains(&label) {
            self.modal_open
        } else if ACK_LABELS.contains(&label) {
            self.ack_visible
        } else {
            true
        }
    }

    fn holds(&self, condition: &Condition) -> bool {
        match condition {
            Condition::ModalPresent => self.prompt_open || self.modal_open,
            Condition::ModalDismissed => !(self.prompt_open || self.modal_open),
            Condition::ControlLabeled(labels) => labels.iter().any(|l| self.control_visible(l)),
            Condition::RowsPresent => !self.rows.is_empty(),
        }
    }
}

#[async_trait]
impl UiAutomation for FakeUi {
    async fn find_actionable_rows(&mut self) -> Result<Vec<RowHandle>, UiError> {
        self.check_session()?;
        self.discovery_calls += 1;
        let call = self.discovery_calls;
        if self.lose_session_after.is_some_and(|n| call > n) {
            self.session_lost = true;
            self.check_session()?;
        }
        if self.failing_discoveries.contains(&call) {
            return Err(UiError::Script("table re-rendering".into()));
        }
        let mut rows = match self.row_script.as_mut() {
            Some(script) => script(call),
            None => self.rows.clone(),
        };
        for row in &mut rows {
            row.visible = row.visible && !self.hidden.contains(&row.action);
        }
        Ok(rows)
    }

    async fn is_visible(&mut self, el: &ElementRef) -> Result<bool, UiError> {
        self.check_session()?;
        self.visibility_checks += 1;
        Ok(!self.hidden.contains(el))
    }

    async fn click(&mut self, el: &ElementRef) -> Result<(), UiError> {
        self.check_session()?;
        if self.stale.contains(el) {
            return Err(UiError::ElementNotFound(el.to_string()));
        }
        let selector = el.selector();
        self.clicks.push(selector.to_string());
        if selector.starts_with("row-") {
            self.prompt_open = self.prompt_appears;
        } else if let Some(label) = selector.strip_prefix("ctl:") {
            if CONFIRM_LABELS.contains(&label) {
                self.prompt_open = false;
                self.modal_open = true;
            } else if SAVE_LABELS.contains(&label) {
                if self.dismiss_on_save {
                    self.modal_open = false;
                }
                self.ack_visible = self.ack_on_save;
            } else if ACK_LABELS.contains(&label) {
                self.ack_visible = false;
            }
        }
        Ok(())
    }

    async fn set_value(&mut self, el: &ElementRef, value: &str) -> Result<(), UiError> {
        self.check_session()?;
        self.values.push((el.selector().to_string(), value.to_string()));
        Ok(())
    }

    async fn wait_for_any(
        &mut self,
        conditions: &[Condition],
        _timeout: Duration,
    ) -> Result<bool, UiError> {
        self.check_session()?;
        Ok(conditions.iter().any(|c| self.holds(c)))
    }

    async fn find_control(&mut self, labels: &[&str]) -> Result<Option<ElementRef>, UiError> {
        self.check_session()?;
        Ok(labels
            .iter()
            .find(|l| self.control_visible(l))
            .map(|l| ElementRef::new(format!("ctl:{l}"))))
    }

    async fn find_field(&mut self, labels: &[&str]) -> Result<Option<ElementRef>, UiError> {
        self.check_session()?;
        Ok(labels
            .iter()
            .find(|l| self.fields.contains(*l))
            .map(|l| ElementRef::new(format!("field:{l}"))))
    }

    async fn current_surface_text(&mut self) -> Result<String, UiError> {
        self.check_session()?;
        Ok(self.surface_text.clone())
    }

    async fn close_extra_surfaces(&mut self) -> Result<u32, UiError> {
        self.check_session()?;
        Ok(std::mem::take(&mut self.extra_surfaces))
    }

    async fn engage_page_size(&mut self, _size: u32) -> Result<bool, UiError> {
        self.check_session()?;
        Ok(self.page_size_control)
    }
}
