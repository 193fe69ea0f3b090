//! Error types for the scheduling engine.
//!
//! Every failure a caller can observe is a `SchedulingError`. Storage
//! failures are wrapped, except for uniqueness violations which the
//! scheduler translates into `SlotTaken` before they reach the caller.

use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;

use crate::lifecycle::LifecycleEvent;
use crate::models::{AppointmentId, AppointmentStatus, ProviderId};
use crate::policy::Action;

/// Malformed date, time or amount input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {kind} '{input}'")]
pub struct FormatError {
    pub kind: &'static str,
    pub input: String,
}

impl FormatError {
    pub fn new(kind: &'static str, input: impl Into<String>) -> Self {
        FormatError {
            kind,
            input: input.into(),
        }
    }
}

/// The lifecycle guard that rejected a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionGuard {
    /// The event is not legal from the current status.
    IllegalFromState,
    /// Cancel and reschedule need a non-empty reason.
    ReasonRequired,
    /// Too close to the slot start for this actor to cancel.
    NoticePeriod { hours: i64 },
    /// The slot has not started long enough ago to be a no-show.
    NotYetDue,
    AlreadyCheckedIn,
    /// The patient checked in, so the visit cannot be a no-show.
    PatientArrived,
}

impl std::fmt::Display for TransitionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionGuard::IllegalFromState => write!(f, "not allowed from this status"),
            TransitionGuard::ReasonRequired => write!(f, "a reason is required"),
            TransitionGuard::NoticePeriod { hours } => {
                write!(f, "requires at least {} hours notice", hours)
            }
            TransitionGuard::NotYetDue => write!(f, "the appointment is not overdue yet"),
            TransitionGuard::AlreadyCheckedIn => write!(f, "the patient is already checked in"),
            TransitionGuard::PatientArrived => write!(f, "the patient has checked in"),
        }
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// An active booking already holds the (provider, date, time) slot.
    #[error("an active appointment already occupies this slot")]
    UniquenessViolation,

    /// The row changed since it was read.
    #[error("appointment {0} was modified concurrently")]
    VersionConflict(AppointmentId),

    #[error("appointment {0} not found")]
    NotFound(AppointmentId),

    #[error("invalid stored value for {field}: {value}")]
    Corrupt { field: &'static str, value: String },

    #[error("migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("store lock poisoned")]
    Poisoned,
}

#[derive(Error, Debug)]
pub enum SchedulingError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("provider {provider} already has an appointment on {date} at {time}")]
    SlotTaken {
        provider: ProviderId,
        date: NaiveDate,
        time: NaiveTime,
    },

    #[error("provider {provider} does not work on day {weekday} ({date})")]
    ProviderUnavailableDay {
        provider: ProviderId,
        date: NaiveDate,
        weekday: u32,
    },

    #[error("{time} is outside working hours {start}-{end}")]
    OutsideWorkingHours {
        time: NaiveTime,
        start: NaiveTime,
        end: NaiveTime,
    },

    #[error("{time} is not on the {granularity}-minute slot grid starting at {start}")]
    MisalignedSlot {
        time: NaiveTime,
        start: NaiveTime,
        granularity: i64,
    },

    #[error("{date} is in the past")]
    DateInPast { date: NaiveDate },

    #[error("cannot {event} an appointment that is {from}: {guard}")]
    InvalidTransition {
        from: AppointmentStatus,
        event: LifecycleEvent,
        guard: TransitionGuard,
    },

    #[error("not authorized to {0}")]
    Unauthorized(Action),

    #[error("invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    #[error("provider {0} not found")]
    ProviderNotFound(ProviderId),

    #[error("appointment {0} not found")]
    AppointmentNotFound(AppointmentId),

    #[error("appointment {0} was modified by another request, reload and retry")]
    ConcurrentModification(AppointmentId),

    #[error("storage failure: {0}")]
    Storage(StorageError),
}

impl SchedulingError {
    /// True for the booking-validation kinds that users see as one message.
    pub fn is_slot_unavailable(&self) -> bool {
        matches!(
            self,
            SchedulingError::SlotTaken { .. }
                | SchedulingError::ProviderUnavailableDay { .. }
                | SchedulingError::OutsideWorkingHours { .. }
                | SchedulingError::MisalignedSlot { .. }
        )
    }

    /// Text suitable for showing to an end user.
    pub fn user_message(&self) -> String {
        if self.is_slot_unavailable() {
            return "This slot is unavailable".to_string();
        }
        match self {
            SchedulingError::Storage(_) => "Something went wrong, please try again".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<StorageError> for SchedulingError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(id) => SchedulingError::AppointmentNotFound(id),
            StorageError::VersionConflict(id) => SchedulingError::ConcurrentModification(id),
            other => SchedulingError::Storage(other),
        }
    }
}

pub type Result<T, E = SchedulingError> = std::result::Result<T, E>;
