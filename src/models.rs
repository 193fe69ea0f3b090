//! Data models for the scheduling engine.
//!
//! - Identifiers: `ProviderId`, `PatientId`, `AppointmentId`
//! - Money: fees held in minor units
//! - Provider / Patient: referenced, never owned, by appointments
//! - Appointment: the record the engine creates and mutates
//! - Invoice / Notification: payloads handed to external collaborators

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::calendar::WeeklySchedule;
use crate::error::{FormatError, SchedulingError};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                $name(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = FormatError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim())
                    .map($name)
                    .map_err(|_| FormatError::new(stringify!($name), s))
            }
        }
    };
}

id_type!(
    /// Identifies a provider (doctor).
    ProviderId
);
id_type!(PatientId);
id_type!(AppointmentId);

/// An amount of money in minor units (cents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(pub i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_minor(cents: i64) -> Self {
        Money(cents)
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl FromStr for Money {
    type Err = FormatError;

    /// Parses amounts such as `150`, `150.5` or `150.00`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || FormatError::new("amount", s);
        let trimmed = s.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let (whole, fraction) = match digits.split_once('.') {
            Some((w, f)) => (w, f),
            None => (digits, ""),
        };
        if whole.is_empty()
            || fraction.len() > 2
            || !whole.chars().all(|c| c.is_ascii_digit())
            || !fraction.chars().all(|c| c.is_ascii_digit())
        {
            return Err(err());
        }
        let whole: i64 = whole.parse().map_err(|_| err())?;
        let cents: i64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i64>().map_err(|_| err())? * 10,
            _ => fraction.parse().map_err(|_| err())?,
        };
        let total = whole
            .checked_mul(100)
            .and_then(|v| v.checked_add(cents))
            .ok_or_else(err)?;
        Ok(Money(if negative { -total } else { total }))
    }
}

/// A clinician offering bookable slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub id: ProviderId,
    pub name: String,
    pub specialization: String,
    pub consultation_fee: Money,
    pub schedule: WeeklySchedule,
}

impl Provider {
    /// Create a new provider with validation.
    pub fn new(
        name: impl Into<String>,
        specialization: impl Into<String>,
        consultation_fee: Money,
        schedule: WeeklySchedule,
    ) -> Result<Self, SchedulingError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SchedulingError::InvalidInput {
                field: "provider name",
                reason: "cannot be empty".to_string(),
            });
        }
        if !consultation_fee.is_positive() {
            return Err(SchedulingError::InvalidInput {
                field: "consultation fee",
                reason: format!("must be positive, got {}", consultation_fee),
            });
        }

        Ok(Provider {
            id: ProviderId::new(),
            name,
            specialization: specialization.into(),
            consultation_fee,
            schedule,
        })
    }
}

/// Represents a patient in the scheduling system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub id: PatientId,
    pub name: String,
    pub contact: String,
}

impl Patient {
    /// Create a new patient with validation.
    pub fn new(name: impl Into<String>, contact: impl Into<String>) -> Result<Self, SchedulingError> {
        let name = name.into();
        let contact = contact.into();
        if name.trim().is_empty() {
            return Err(SchedulingError::InvalidInput {
                field: "patient name",
                reason: "cannot be empty".to_string(),
            });
        }
        if contact.trim().is_empty() {
            return Err(SchedulingError::InvalidInput {
                field: "patient contact",
                reason: "cannot be empty".to_string(),
            });
        }

        Ok(Patient {
            id: PatientId::new(),
            name,
            contact,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 5] = [
        AppointmentStatus::Scheduled,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::NoShow,
    ];

    /// Whether an appointment in this status holds its slot.
    pub fn blocks_slot(&self) -> bool {
        matches!(self, AppointmentStatus::Scheduled | AppointmentStatus::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        !self.blocks_slot()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no-show",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AppointmentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim())
            .ok_or_else(|| FormatError::new("status", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AppointmentType {
    #[default]
    Consultation,
    FollowUp,
    Emergency,
    Surgery,
}

impl AppointmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentType::Consultation => "consultation",
            AppointmentType::FollowUp => "follow-up",
            AppointmentType::Emergency => "emergency",
            AppointmentType::Surgery => "surgery",
        }
    }
}

impl fmt::Display for AppointmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentType {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "consultation" => Ok(AppointmentType::Consultation),
            "follow-up" => Ok(AppointmentType::FollowUp),
            "emergency" => Ok(AppointmentType::Emergency),
            "surgery" => Ok(AppointmentType::Surgery),
            _ => Err(FormatError::new("appointment type", s)),
        }
    }
}

/// Arrival state, tracked alongside the status rather than inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum Attendance {
    #[default]
    NotArrived,
    CheckedIn { at: NaiveDateTime },
}

impl Attendance {
    pub fn is_checked_in(&self) -> bool {
        matches!(self, Attendance::CheckedIn { .. })
    }
}

/// An appointment created and owned by the scheduling engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub patient_id: PatientId,
    pub provider_id: ProviderId,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub duration_minutes: i64,
    pub appointment_type: AppointmentType,
    pub status: AppointmentStatus,
    pub fee: Money,
    pub cancellation_reason: Option<String>,
    pub notes: Option<String>,
    pub attendance: Attendance,
    pub completed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    /// Bumped on every stored write.
    pub version: i64,
}

impl Appointment {
    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }

    /// Append a paragraph to the notes, keeping what is already there.
    pub fn append_note(&mut self, note: &str) {
        self.notes = Some(match self.notes.take() {
            Some(existing) if !existing.is_empty() => format!("{}\n\n{}", existing, note),
            _ => note.to_string(),
        });
    }
}

/// A request to book one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub patient_id: PatientId,
    pub provider_id: ProviderId,
    pub date: NaiveDate,
    pub time: NaiveTime,
    #[serde(default)]
    pub appointment_type: AppointmentType,
    /// Overrides the provider's consultation fee when set.
    #[serde(default)]
    pub fee: Option<Money>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl BookingRequest {
    pub fn new(patient_id: PatientId, provider_id: ProviderId, date: NaiveDate, time: NaiveTime) -> Self {
        BookingRequest {
            patient_id,
            provider_id,
            date,
            time,
            appointment_type: AppointmentType::default(),
            fee: None,
            notes: None,
        }
    }

    pub fn with_type(mut self, appointment_type: AppointmentType) -> Self {
        self.appointment_type = appointment_type;
        self
    }

    pub fn with_fee(mut self, fee: Money) -> Self {
        self.fee = Some(fee);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Pending,
    Paid,
    Void,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub description: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub total: Money,
}

/// Invoice raised for a booked appointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub appointment_id: AppointmentId,
    pub patient_id: PatientId,
    pub provider_id: ProviderId,
    pub subtotal: Money,
    pub tax_amount: Money,
    pub discount_amount: Money,
    pub total_amount: Money,
    pub status: InvoiceStatus,
    pub issued_on: NaiveDate,
    pub due_date: NaiveDate,
    pub items: Vec<InvoiceItem>,
}

impl Invoice {
    /// Single-line consultation invoice for the appointment's snapshotted fee.
    pub fn for_appointment(
        appointment: &Appointment,
        provider: &Provider,
        issued_on: NaiveDate,
        due_days: i64,
    ) -> Self {
        let fee = appointment.fee;
        Invoice {
            id: Uuid::new_v4(),
            appointment_id: appointment.id,
            patient_id: appointment.patient_id,
            provider_id: appointment.provider_id,
            subtotal: fee,
            tax_amount: Money::ZERO,
            discount_amount: Money::ZERO,
            total_amount: fee,
            status: InvoiceStatus::Pending,
            issued_on,
            due_date: chrono::Duration::try_days(due_days)
                .and_then(|span| issued_on.checked_add_signed(span))
                .unwrap_or(NaiveDate::MAX),
            items: vec![InvoiceItem {
                description: format!("Medical consultation - {}", provider.specialization),
                quantity: 1,
                unit_price: fee,
                total: fee,
            }],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationAction {
    Confirmed,
    CheckedIn,
    Completed,
    Cancelled,
    NoShow,
}

impl NotificationAction {
    pub fn title(&self) -> &'static str {
        match self {
            NotificationAction::Confirmed => "Appointment confirmed",
            NotificationAction::CheckedIn => "Patient arrived",
            NotificationAction::Completed => "Appointment completed",
            NotificationAction::Cancelled => "Appointment cancelled",
            NotificationAction::NoShow => "Missed appointment",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum Recipient {
    Patient(PatientId),
    Provider(ProviderId),
}

/// Closed metadata attached to every appointment notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
    pub appointment_id: AppointmentId,
    pub action: NotificationAction,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: Recipient,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub data: NotificationData,
}

impl Notification {
    pub fn for_appointment(
        recipient: Recipient,
        appointment: &Appointment,
        action: NotificationAction,
        reason: Option<&str>,
    ) -> Self {
        let message = match (action, reason) {
            (NotificationAction::Confirmed, _) => "Your appointment has been confirmed".to_string(),
            (NotificationAction::CheckedIn, _) => "Patient is in the waiting list".to_string(),
            (NotificationAction::Completed, _) => {
                "Your appointment was completed successfully".to_string()
            }
            (NotificationAction::Cancelled, reason) => {
                let subject = match recipient {
                    Recipient::Patient(_) => "Your appointment".to_string(),
                    Recipient::Provider(_) => format!(
                        "The appointment on {} at {}",
                        appointment.date,
                        appointment.time.format("%H:%M")
                    ),
                };
                match reason {
                    Some(reason) => format!("{} has been cancelled: {}", subject, reason),
                    None => format!("{} has been cancelled", subject),
                }
            }
            (NotificationAction::NoShow, _) => format!(
                "You missed your appointment on {} at {}",
                appointment.date,
                appointment.time.format("%H:%M")
            ),
        };
        let kind = match action {
            NotificationAction::Cancelled | NotificationAction::NoShow => NotificationKind::Warning,
            _ => NotificationKind::Info,
        };

        Notification {
            recipient,
            title: action.title().to_string(),
            message,
            kind,
            data: NotificationData {
                appointment_id: appointment.id,
                action,
                reason: reason.map(str::to_string),
            },
        }
    }
}
