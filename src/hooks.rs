//! Collaborators fired by the scheduler after a booking or transition.
//!
//! All of these are best effort. A failing hook is logged by the
//! scheduler and never rolls back or fails the transition that fired it.

use std::sync::Mutex;
use thiserror::Error;
use tracing::info;

use crate::models::{Appointment, AppointmentId, Invoice, Notification};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HookError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("collaborator rejected the request: {0}")]
    Rejected(String),
}

/// Delivers notifications. Fire and forget from the engine's side.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification) -> Result<(), HookError>;
}

/// Records invoices raised at booking time.
pub trait Invoicer: Send + Sync {
    fn create_invoice_for_appointment(&self, invoice: Invoice) -> Result<Invoice, HookError>;
}

/// Opens a medical record when a completed visit asks for one.
pub trait MedicalRecords: Send + Sync {
    fn open_for_appointment(&self, appointment: &Appointment) -> Result<(), HookError>;
}

/// Writes notifications to the log and drops them.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) -> Result<(), HookError> {
        info!(
            recipient = ?notification.recipient,
            kind = ?notification.kind,
            appointment = %notification.data.appointment_id,
            "{}: {}",
            notification.title,
            notification.message
        );
        Ok(())
    }
}

/// Keeps every notification it receives.
#[derive(Debug, Default)]
pub struct InMemoryNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub fn sent_for(&self, appointment: AppointmentId) -> Vec<Notification> {
        self.sent()
            .into_iter()
            .filter(|n| n.data.appointment_id == appointment)
            .collect()
    }
}

impl Notifier for InMemoryNotifier {
    fn notify(&self, notification: Notification) -> Result<(), HookError> {
        self.sent
            .lock()
            .map_err(|_| HookError::Unavailable("notification outbox poisoned".into()))?
            .push(notification);
        Ok(())
    }
}

/// Keeps every invoice it receives.
#[derive(Debug, Default)]
pub struct InMemoryInvoicer {
    invoices: Mutex<Vec<Invoice>>,
}

impl InMemoryInvoicer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invoices(&self) -> Vec<Invoice> {
        self.invoices.lock().map(|all| all.clone()).unwrap_or_default()
    }

    pub fn invoices_for(&self, appointment: AppointmentId) -> Vec<Invoice> {
        self.invoices()
            .into_iter()
            .filter(|invoice| invoice.appointment_id == appointment)
            .collect()
    }
}

impl Invoicer for InMemoryInvoicer {
    fn create_invoice_for_appointment(&self, invoice: Invoice) -> Result<Invoice, HookError> {
        self.invoices
            .lock()
            .map_err(|_| HookError::Unavailable("invoice ledger poisoned".into()))?
            .push(invoice.clone());
        info!(
            invoice = %invoice.id,
            appointment = %invoice.appointment_id,
            total = %invoice.total_amount,
            due = %invoice.due_date,
            "invoice issued"
        );
        Ok(invoice)
    }
}

/// Logs the request and does nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggedMedicalRecords;

impl MedicalRecords for LoggedMedicalRecords {
    fn open_for_appointment(&self, appointment: &Appointment) -> Result<(), HookError> {
        info!(
            appointment = %appointment.id,
            patient = %appointment.patient_id,
            "medical record requested"
        );
        Ok(())
    }
}
