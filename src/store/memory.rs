//! In-process appointment store.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{AppointmentStore, BookedSlot};
use crate::error::StorageError;
use crate::models::{Appointment, AppointmentId, ProviderId};

/// Appointments held in a map behind one lock, so every check-then-write
/// happens under the same critical section.
#[derive(Debug, Default)]
pub struct MemoryStore {
    appointments: Mutex<HashMap<AppointmentId, Appointment>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<AppointmentId, Appointment>>, StorageError> {
        self.appointments.lock().map_err(|_| StorageError::Poisoned)
    }
}

fn slot_held_by_other(map: &HashMap<AppointmentId, Appointment>, candidate: &Appointment) -> bool {
    candidate.status.blocks_slot()
        && map.values().any(|other| {
            other.id != candidate.id
                && other.status.blocks_slot()
                && other.provider_id == candidate.provider_id
                && other.date == candidate.date
                && other.time == candidate.time
        })
}

impl AppointmentStore for MemoryStore {
    fn find_bookings_for(&self, provider: ProviderId, date: NaiveDate) -> Result<Vec<BookedSlot>, StorageError> {
        let map = self.lock()?;
        let mut slots: Vec<BookedSlot> = map
            .values()
            .filter(|a| a.provider_id == provider && a.date == date)
            .map(|a| BookedSlot {
                appointment_id: a.id,
                time: a.time,
                status: a.status,
            })
            .collect();
        slots.sort_by_key(|s| s.time);
        Ok(slots)
    }

    fn insert_appointment(&self, appointment: &Appointment) -> Result<Appointment, StorageError> {
        let mut map = self.lock()?;
        if slot_held_by_other(&map, appointment) {
            return Err(StorageError::UniquenessViolation);
        }
        let mut stored = appointment.clone();
        stored.version = 1;
        map.insert(stored.id, stored.clone());
        Ok(stored)
    }

    fn update_appointment(&self, appointment: &Appointment) -> Result<Appointment, StorageError> {
        let mut map = self.lock()?;
        let current_version = map
            .get(&appointment.id)
            .map(|current| current.version)
            .ok_or(StorageError::NotFound(appointment.id))?;
        if current_version != appointment.version {
            return Err(StorageError::VersionConflict(appointment.id));
        }
        if slot_held_by_other(&map, appointment) {
            return Err(StorageError::UniquenessViolation);
        }
        let mut stored = appointment.clone();
        stored.version += 1;
        map.insert(stored.id, stored.clone());
        Ok(stored)
    }

    fn get_appointment(&self, id: AppointmentId) -> Result<Option<Appointment>, StorageError> {
        Ok(self.lock()?.get(&id).cloned())
    }

    fn appointments_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        provider: Option<ProviderId>,
    ) -> Result<Vec<Appointment>, StorageError> {
        let map = self.lock()?;
        let mut found: Vec<Appointment> = map
            .values()
            .filter(|a| a.date >= from && a.date <= to)
            .filter(|a| provider.map_or(true, |p| a.provider_id == p))
            .cloned()
            .collect();
        found.sort_by_key(|a| (a.date, a.time));
        Ok(found)
    }
}
