//! Per-incident state machine: open, confirm, extract, classify, fill, submit, verify, clean up.
//!
//! Every step either advances or fails with its own [`IncidentError`]. Incident failures are
//! returned as [`IncidentOutcome::Failed`]; only a fatal [`UiError`] escapes as `Err`.

use super::{classifier, extract, parse_address};
use crate::model::{AddressComponents, CustomerInfo, IncidentRecord, RunConfig, Step};
use crate::ui::{Condition, UiAutomation, UiError, ACK_LABELS, CONFIRM_LABELS, SAVE_LABELS};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum IncidentError {
    #[error("action button could not be activated: {0}")]
    ActionUnavailable(String),
    #[error("confirmation prompt did not appear within {0:?}")]
    ConfirmationTimeout(Duration),
    #[error("confirmation prompt has no affirmative button")]
    ConfirmationControlMissing,
    #[error("no form field could be populated")]
    NoFieldsPopulated,
    #[error("save button not found")]
    SaveControlMissing,
    #[error("form still open after save")]
    UnconfirmedSave,
    #[error("row handle no longer resolves: {0}")]
    RowStale(String),
}

impl IncidentError {
    pub fn step(&self) -> Step {
        match self {
            IncidentError::ActionUnavailable(_) | IncidentError::RowStale(_) => Step::Open,
            IncidentError::ConfirmationTimeout(_) => Step::AwaitConfirm,
            IncidentError::ConfirmationControlMissing => Step::Confirm,
            IncidentError::NoFieldsPopulated => Step::Fill,
            IncidentError::SaveControlMissing => Step::Submit,
            IncidentError::UnconfirmedSave => Step::Verify,
        }
    }
}

enum Failure {
    Incident(IncidentError),
    Fatal(UiError),
}

impl From<IncidentError> for Failure {
    fn from(e: IncidentError) -> Self {
        Failure::Incident(e)
    }
}

/// Fatal errors pass through; anything else becomes the step's own failure.
fn step_failure(e: UiError, on_step: impl FnOnce(UiError) -> IncidentError) -> Failure {
    if e.is_fatal() {
        Failure::Fatal(e)
    } else {
        Failure::Incident(on_step(e))
    }
}

/// Form inputs on the remediation surface, in fill order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    AddressNotes,
    Solution,
    Street,
    HouseNumber,
    District,
    Region,
    Name,
    Phone,
}

impl FormField {
    pub const ALL: [FormField; 8] = [
        FormField::AddressNotes,
        FormField::Solution,
        FormField::Street,
        FormField::HouseNumber,
        FormField::District,
        FormField::Region,
        FormField::Name,
        FormField::Phone,
    ];

    pub fn labels(self) -> &'static [&'static str] {
        match self {
            FormField::AddressNotes => &["Datos adicionales a la dirección", "Datos adicionales"],
            FormField::Solution => &["Solución", "Solucion"],
            FormField::Street => &["Calle"],
            FormField::HouseNumber => &["Numero", "Número"],
            FormField::District => &["Comuna"],
            FormField::Region => &["Region", "Región"],
            FormField::Name => &["Nombre", "Nome"],
            FormField::Phone => &["Celular", "Teléfono"],
        }
    }

    fn value<'a>(self, customer: &'a CustomerInfo, address: &'a AddressComponents) -> &'a str {
        match self {
            FormField::AddressNotes => &customer.address,
            // Without a classified note the address doubles as the solution text.
            FormField::Solution => customer
                .automatic_message
                .as_deref()
                .unwrap_or(&customer.address),
            FormField::Street => &address.street,
            FormField::HouseNumber => &address.house_number,
            FormField::District => &address.district,
            FormField::Region => &address.region,
            FormField::Name => &customer.name,
            FormField::Phone => &customer.phone,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub id: String,
    pub customer: CustomerInfo,
    pub address: AddressComponents,
    pub fields_filled: u32,
    pub closed_tabs: u32,
    /// An acknowledgement popup appeared after saving and was dismissed.
    pub acknowledged: bool,
}

#[derive(Debug)]
pub enum IncidentOutcome {
    Submitted(Submission),
    Failed { id: String, error: IncidentError },
}

/// Drive one incident through every step. Never retries.
pub async fn process_one<U>(
    ui: &mut U,
    cfg: &RunConfig,
    record: &IncidentRecord,
) -> Result<IncidentOutcome, UiError>
where
    U: UiAutomation + ?Sized,
{
    match run_steps(ui, cfg, record).await {
        Ok(submission) => {
            info!(
                incident = %submission.id,
                customer = %submission.customer.name,
                district = %submission.address.district,
                fields = submission.fields_filled,
                acknowledged = submission.acknowledged,
                "novelty saved"
            );
            Ok(IncidentOutcome::Submitted(submission))
        }
        Err(Failure::Incident(error)) => {
            warn!(incident = %record.id, step = %error.step(), error = %error, "novelty failed");
            Ok(IncidentOutcome::Failed {
                id: record.id.clone(),
                error,
            })
        }
        Err(Failure::Fatal(e)) => Err(e),
    }
}

async fn run_steps<U>(
    ui: &mut U,
    cfg: &RunConfig,
    record: &IncidentRecord,
) -> Result<Submission, Failure>
where
    U: UiAutomation + ?Sized,
{
    // Open
    ui.click(&record.action).await.map_err(|e| {
        step_failure(e, |e| match e {
            UiError::ElementNotFound(_) => IncidentError::RowStale(record.id.clone()),
            other => IncidentError::ActionUnavailable(other.to_string()),
        })
    })?;

    // AwaitConfirm
    let prompt = [Condition::ControlLabeled(CONFIRM_LABELS), Condition::ModalPresent];
    let appeared = ui
        .wait_for_any(&prompt, cfg.confirm_timeout)
        .await
        .map_err(|e| step_failure(e, |_| IncidentError::ConfirmationTimeout(cfg.confirm_timeout)))?;
    if !appeared {
        return Err(IncidentError::ConfirmationTimeout(cfg.confirm_timeout).into());
    }

    // Confirm
    let yes = ui
        .find_control(CONFIRM_LABELS)
        .await
        .map_err(|e| step_failure(e, |_| IncidentError::ConfirmationControlMissing))?
        .ok_or(IncidentError::ConfirmationControlMissing)?;
    ui.click(&yes)
        .await
        .map_err(|e| step_failure(e, |_| IncidentError::ConfirmationControlMissing))?;
    pause(cfg.settle_delay).await;

    // Extract
    let surface = match ui.current_surface_text().await {
        Ok(text) => text,
        Err(e) if e.is_fatal() => return Err(Failure::Fatal(e)),
        Err(e) => {
            debug!(incident = %record.id, error = %e, "detail text unavailable");
            String::new()
        }
    };
    let mut customer = extract::extract_customer_info(&surface);

    // Classify
    match classifier::matching_rule(&surface) {
        Some(rule) => {
            debug!(incident = %record.id, category = ?rule.category, "novelty classified");
            customer.automatic_message = Some(rule.message.to_string());
        }
        None => debug!(incident = %record.id, "no classification rule matched"),
    }

    // Fill
    let address = parse_address(&customer.address);
    let fields_filled = fill_form(ui, &record.id, &customer, &address).await?;
    if fields_filled == 0 {
        return Err(IncidentError::NoFieldsPopulated.into());
    }

    // Submit
    let save = ui
        .find_control(SAVE_LABELS)
        .await
        .map_err(|e| step_failure(e, |_| IncidentError::SaveControlMissing))?
        .ok_or(IncidentError::SaveControlMissing)?;
    ui.click(&save)
        .await
        .map_err(|e| step_failure(e, |_| IncidentError::SaveControlMissing))?;
    pause(cfg.settle_delay).await;

    // Verify
    let acknowledged = acknowledge(ui, &record.id).await?;
    let dismissed = ui
        .wait_for_any(&[Condition::ModalDismissed], cfg.verify_timeout)
        .await
        .map_err(|e| step_failure(e, |_| IncidentError::UnconfirmedSave))?;
    if !dismissed {
        return Err(IncidentError::UnconfirmedSave.into());
    }

    // Cleanup
    let closed_tabs = match ui.close_extra_surfaces().await {
        Ok(n) => n,
        Err(e) if e.is_fatal() => return Err(Failure::Fatal(e)),
        Err(e) => {
            warn!(incident = %record.id, error = %e, "could not close extra tabs");
            0
        }
    };

    Ok(Submission {
        id: record.id.clone(),
        customer,
        address,
        fields_filled,
        closed_tabs,
        acknowledged,
    })
}

async fn fill_form<U>(
    ui: &mut U,
    id: &str,
    customer: &CustomerInfo,
    address: &AddressComponents,
) -> Result<u32, Failure>
where
    U: UiAutomation + ?Sized,
{
    let mut filled = 0;
    for field in FormField::ALL {
        let value = field.value(customer, address);
        if value.is_empty() {
            continue;
        }
        let el = match ui.find_field(field.labels()).await {
            Ok(Some(el)) => el,
            Ok(None) => {
                debug!(incident = %id, ?field, "field not on form");
                continue;
            }
            Err(e) if e.is_fatal() => return Err(Failure::Fatal(e)),
            Err(e) => {
                debug!(incident = %id, ?field, error = %e, "field lookup failed");
                continue;
            }
        };
        match ui.set_value(&el, value).await {
            Ok(()) => filled += 1,
            Err(e) if e.is_fatal() => return Err(Failure::Fatal(e)),
            Err(e) => debug!(incident = %id, ?field, error = %e, "could not set field"),
        }
    }
    Ok(filled)
}

/// Dismiss the post-save popup if one shows up. Its absence is not an error.
async fn acknowledge<U>(ui: &mut U, id: &str) -> Result<bool, Failure>
where
    U: UiAutomation + ?Sized,
{
    let ok = match ui.find_control(ACK_LABELS).await {
        Ok(found) => found,
        Err(e) if e.is_fatal() => return Err(Failure::Fatal(e)),
        Err(_) => None,
    };
    let Some(ok) = ok else {
        return Ok(false);
    };
    match ui.click(&ok).await {
        Ok(()) => {
            debug!(incident = %id, "acknowledgement dismissed");
            Ok(true)
        }
        Err(e) if e.is_fatal() => Err(Failure::Fatal(e)),
        Err(_) => Ok(false),
    }
}

async fn pause(d: Duration) {
    if !d.is_zero() {
        tokio::time::sleep(d).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::fake::FakeUi;
    use crate::ui::ElementRef;

    const DETAIL: &str = "Novedad: CLIENTE AUSENTE\nORDERS TO:\nAna Rojas\nLas Flores 123 - Centro, Maipú - Metropolitana\nTelf. 912345678";

    fn instant_config() -> RunConfig {
        RunConfig {
            confirm_timeout: Duration::ZERO,
            settle_delay: Duration::ZERO,
            verify_timeout: Duration::ZERO,
            cycle_pause: Duration::ZERO,
            ..RunConfig::default()
        }
    }

    fn record(id: &str, n: usize) -> IncidentRecord {
        IncidentRecord {
            id: id.into(),
            keyed: true,
            action: ElementRef::new(format!("row-{n}")),
        }
    }

    fn failure_of(outcome: IncidentOutcome) -> IncidentError {
        match outcome {
            IncidentOutcome::Failed { error, .. } => error,
            IncidentOutcome::Submitted(s) => panic!("expected failure, got {s:?}"),
        }
    }

    #[tokio::test]
    async fn happy_path_fills_parsed_fields() {
        let mut ui = FakeUi::new();
        ui.surface_text = DETAIL.into();
        ui.extra_surfaces = 2;
        ui.fields.insert("Solución");

        let outcome = process_one(&mut ui, &instant_config(), &record("NV-1", 1))
            .await
            .unwrap();
        let IncidentOutcome::Submitted(sub) = outcome else {
            panic!("expected submission");
        };
        assert_eq!(sub.fields_filled, 7);
        assert_eq!(sub.closed_tabs, 2);
        assert_eq!(ui.value_of("Calle"), Some("Las Flores"));
        assert_eq!(ui.value_of("Numero"), Some("123"));
        assert_eq!(ui.value_of("Comuna"), Some("Maipú"));
        assert_eq!(ui.value_of("Region"), Some("Metropolitana"));
        assert_eq!(ui.value_of("Nombre"), Some("Ana Rojas"));
        assert_eq!(ui.value_of("Celular"), Some("912345678"));
        assert_eq!(ui.value_of("Solución"), Some(classifier::RULES[0].message));
    }

    #[tokio::test]
    async fn solution_falls_back_to_address_without_classification() {
        let mut ui = FakeUi::new();
        ui.surface_text = "ORDERS TO:\nAna\nCalle 5, Temuco".into();
        ui.fields = ["Solucion"].into_iter().collect();

        let outcome = process_one(&mut ui, &instant_config(), &record("NV-2", 1))
            .await
            .unwrap();
        assert!(matches!(outcome, IncidentOutcome::Submitted(_)));
        assert_eq!(ui.value_of("Solucion"), Some("Calle 5, Temuco"));
    }

    #[tokio::test]
    async fn missing_prompt_is_confirmation_timeout() {
        let mut ui = FakeUi::new();
        ui.prompt_appears = false;
        let err = failure_of(
            process_one(&mut ui, &instant_config(), &record("NV-3", 1))
                .await
                .unwrap(),
        );
        assert!(matches!(err, IncidentError::ConfirmationTimeout(_)));
        assert_eq!(err.step(), Step::AwaitConfirm);
    }

    #[tokio::test]
    async fn prompt_without_yes_is_control_missing() {
        let mut ui = FakeUi::new();
        ui.controls.remove("Yes");
        // The prompt modal still shows, so this is past AwaitConfirm.
        let outcome = process_one(&mut ui, &instant_config(), &record("NV-4", 1))
            .await
            .unwrap();
        assert!(matches!(
            failure_of(outcome),
            IncidentError::ConfirmationControlMissing
        ));
    }

    #[tokio::test]
    async fn stale_row_is_reported_as_such() {
        let mut ui = FakeUi::new();
        ui.stale.insert(ElementRef::new("row-1"));
        let err = failure_of(
            process_one(&mut ui, &instant_config(), &record("NV-5", 1))
                .await
                .unwrap(),
        );
        assert!(matches!(err, IncidentError::RowStale(ref id) if id == "NV-5"));
        assert_eq!(err.step(), Step::Open);
    }

    #[tokio::test]
    async fn empty_form_is_no_fields_populated() {
        let mut ui = FakeUi::new();
        ui.fields.clear();
        let err = failure_of(
            process_one(&mut ui, &instant_config(), &record("NV-6", 1))
                .await
                .unwrap(),
        );
        assert!(matches!(err, IncidentError::NoFieldsPopulated));
        assert!(ui.clicks.iter().all(|c| c != "ctl:SAVE SOLUCION"));
    }

    #[tokio::test]
    async fn missing_save_button() {
        let mut ui = FakeUi::new();
        ui.controls.remove("SAVE SOLUCION");
        let err = failure_of(
            process_one(&mut ui, &instant_config(), &record("NV-7", 1))
                .await
                .unwrap(),
        );
        assert!(matches!(err, IncidentError::SaveControlMissing));
    }

    #[tokio::test]
    async fn form_left_open_is_unconfirmed() {
        let mut ui = FakeUi::new();
        ui.dismiss_on_save = false;
        ui.ack_on_save = true;
        let err = failure_of(
            process_one(&mut ui, &instant_config(), &record("NV-8", 1))
                .await
                .unwrap(),
        );
        // The acknowledgement alone does not make the save count.
        assert!(matches!(err, IncidentError::UnconfirmedSave));
        assert_eq!(err.step(), Step::Verify);
    }

    #[tokio::test]
    async fn acknowledgement_is_dismissed_when_shown() {
        let mut ui = FakeUi::new();
        ui.ack_on_save = true;
        let outcome = process_one(&mut ui, &instant_config(), &record("NV-9", 1))
            .await
            .unwrap();
        let IncidentOutcome::Submitted(sub) = outcome else {
            panic!("expected submission");
        };
        assert!(sub.acknowledged);
        assert_eq!(ui.clicks.last().map(String::as_str), Some("ctl:OK"));
    }

    #[tokio::test]
    async fn lost_session_escapes_as_error() {
        let mut ui = FakeUi::new();
        ui.session_lost = true;
        let err = process_one(&mut ui, &instant_config(), &record("NV-10", 1))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
