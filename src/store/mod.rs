//! Persistence boundary for appointments.
//!
//! Both stores enforce the slot exclusion themselves: at most one
//! scheduled or confirmed appointment per (provider, date, time). The
//! scheduler's pre-check is advisory; the store is the final word.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use chrono::{NaiveDate, NaiveTime};

use crate::error::StorageError;
use crate::models::{Appointment, AppointmentId, AppointmentStatus, ProviderId};

/// A booking as seen by availability and conflict checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookedSlot {
    pub appointment_id: AppointmentId,
    pub time: NaiveTime,
    pub status: AppointmentStatus,
}

pub trait AppointmentStore: Send + Sync {
    /// Every booking for the provider on that date, in any status.
    fn find_bookings_for(&self, provider: ProviderId, date: NaiveDate) -> Result<Vec<BookedSlot>, StorageError>;

    /// Stores a new appointment and returns it as stored (version 1).
    ///
    /// Fails with `UniquenessViolation` if an active appointment already
    /// holds the slot. The check and the write are a single atomic step.
    fn insert_appointment(&self, appointment: &Appointment) -> Result<Appointment, StorageError>;

    /// Writes back an appointment read at `appointment.version`.
    ///
    /// Fails with `VersionConflict` if the row changed since, and with
    /// `UniquenessViolation` if the new slot is held by another active
    /// appointment.
    fn update_appointment(&self, appointment: &Appointment) -> Result<Appointment, StorageError>;

    fn get_appointment(&self, id: AppointmentId) -> Result<Option<Appointment>, StorageError>;

    /// Appointments dated `from..=to`, ordered by date then time.
    fn appointments_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        provider: Option<ProviderId>,
    ) -> Result<Vec<Appointment>, StorageError>;
}
