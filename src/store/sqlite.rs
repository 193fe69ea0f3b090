//! SQLite-backed appointment store.
//!
//! Slot exclusion is a partial unique index over active rows, so two
//! connections racing for the same slot cannot both commit.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::{ffi, params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

use super::{AppointmentStore, BookedSlot};
use crate::error::StorageError;
use crate::models::{Appointment, AppointmentId, AppointmentStatus, AppointmentType, Attendance, Money, ProviderId};

const MIGRATIONS: &[(i64, &str)] = &[(
    1,
    "CREATE TABLE IF NOT EXISTS schema_version (
         version INTEGER PRIMARY KEY,
         applied_at TEXT NOT NULL DEFAULT (datetime('now'))
     );
     CREATE TABLE appointments (
         id TEXT PRIMARY KEY,
         patient_id TEXT NOT NULL,
         provider_id TEXT NOT NULL,
         date TEXT NOT NULL,
         time TEXT NOT NULL,
         duration_minutes INTEGER NOT NULL,
         appointment_type TEXT NOT NULL,
         status TEXT NOT NULL
             CHECK (status IN ('scheduled', 'confirmed', 'completed', 'cancelled', 'no-show')),
         fee INTEGER NOT NULL,
         cancellation_reason TEXT,
         notes TEXT,
         checked_in_at TEXT,
         completed_at TEXT,
         created_at TEXT NOT NULL,
         updated_at TEXT NOT NULL,
         version INTEGER NOT NULL
     );
     CREATE UNIQUE INDEX idx_appointments_active_slot
         ON appointments (provider_id, date, time)
         WHERE status IN ('scheduled', 'confirmed');
     CREATE INDEX idx_appointments_date ON appointments (date, time);
     INSERT INTO schema_version (version) VALUES (1);",
)];

const SELECT_COLUMNS: &str = "id, patient_id, provider_id, date, time, duration_minutes, appointment_type, status,
     fee, cancellation_reason, notes, checked_in_at, completed_at, created_at, updated_at, version";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file and bring its schema up to date.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path.as_ref())?;
        info!(path = %path.as_ref().display(), "opened appointment database");
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.busy_timeout(Duration::from_secs(5))?;
        run_migrations(&conn, MIGRATIONS)?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    pub fn schema_version(&self) -> Result<i64, StorageError> {
        current_version(&*self.lock()?)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }
}

fn run_migrations(conn: &Connection, migrations: &[(i64, &str)]) -> Result<(), StorageError> {
    let current = current_version(conn)?;
    for (version, sql) in migrations {
        if *version > current {
            info!("running migration v{version}");
            let failed = |e: rusqlite::Error| StorageError::MigrationFailed {
                version: *version,
                reason: e.to_string(),
            };
            // Each migration commits whole or not at all.
            let tx = conn.unchecked_transaction().map_err(failed)?;
            tx.execute_batch(sql).map_err(failed)?;
            tx.commit().map_err(failed)?;
        }
    }
    Ok(())
}

/// 0 when the schema has never been created.
fn current_version(conn: &Connection) -> Result<i64, StorageError> {
    let created: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version')",
        [],
        |row| row.get(0),
    )?;
    if !created {
        return Ok(0);
    }
    let version = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, Option<i64>>(0)
    })?;
    Ok(version.unwrap_or(0))
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn translate(err: rusqlite::Error) -> StorageError {
    if is_unique_violation(&err) {
        StorageError::UniquenessViolation
    } else {
        StorageError::Sqlite(err)
    }
}

/// Column values as stored, before enum and id parsing.
struct StoredRow {
    id: String,
    patient_id: String,
    provider_id: String,
    date: NaiveDate,
    time: NaiveTime,
    duration_minutes: i64,
    appointment_type: String,
    status: String,
    fee: i64,
    cancellation_reason: Option<String>,
    notes: Option<String>,
    checked_in_at: Option<NaiveDateTime>,
    completed_at: Option<NaiveDateTime>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
    version: i64,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<StoredRow> {
    Ok(StoredRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        provider_id: row.get(2)?,
        date: row.get(3)?,
        time: row.get(4)?,
        duration_minutes: row.get(5)?,
        appointment_type: row.get(6)?,
        status: row.get(7)?,
        fee: row.get(8)?,
        cancellation_reason: row.get(9)?,
        notes: row.get(10)?,
        checked_in_at: row.get(11)?,
        completed_at: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
        version: row.get(15)?,
    })
}

fn parse_column<T: FromStr>(field: &'static str, value: String) -> Result<T, StorageError> {
    value
        .parse()
        .map_err(|_| StorageError::Corrupt { field, value })
}

impl TryFrom<StoredRow> for Appointment {
    type Error = StorageError;

    fn try_from(row: StoredRow) -> Result<Self, Self::Error> {
        Ok(Appointment {
            id: parse_column::<AppointmentId>("id", row.id)?,
            patient_id: parse_column("patient_id", row.patient_id)?,
            provider_id: parse_column("provider_id", row.provider_id)?,
            date: row.date,
            time: row.time,
            duration_minutes: row.duration_minutes,
            appointment_type: parse_column::<AppointmentType>("appointment_type", row.appointment_type)?,
            status: parse_column::<AppointmentStatus>("status", row.status)?,
            fee: Money(row.fee),
            cancellation_reason: row.cancellation_reason,
            notes: row.notes,
            attendance: match row.checked_in_at {
                Some(at) => Attendance::CheckedIn { at },
                None => Attendance::NotArrived,
            },
            completed_at: row.completed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            version: row.version,
        })
    }
}

fn checked_in_at(appointment: &Appointment) -> Option<NaiveDateTime> {
    match appointment.attendance {
        Attendance::CheckedIn { at } => Some(at),
        Attendance::NotArrived => None,
    }
}

fn load(conn: &Connection, id: AppointmentId) -> Result<Option<Appointment>, StorageError> {
    let sql = format!("SELECT {SELECT_COLUMNS} FROM appointments WHERE id = ?1");
    conn.query_row(&sql, params![id.to_string()], read_row)
        .optional()?
        .map(Appointment::try_from)
        .transpose()
}

impl AppointmentStore for SqliteStore {
    fn find_bookings_for(&self, provider: ProviderId, date: NaiveDate) -> Result<Vec<BookedSlot>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, time, status FROM appointments
             WHERE provider_id = ?1 AND date = ?2
             ORDER BY time",
        )?;
        let rows = stmt.query_map(params![provider.to_string(), date], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, NaiveTime>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut slots = Vec::new();
        for row in rows {
            let (id, time, status) = row?;
            slots.push(BookedSlot {
                appointment_id: parse_column("id", id)?,
                time,
                status: parse_column("status", status)?,
            });
        }
        Ok(slots)
    }

    fn insert_appointment(&self, appointment: &Appointment) -> Result<Appointment, StorageError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO appointments (id, patient_id, provider_id, date, time, duration_minutes,
                 appointment_type, status, fee, cancellation_reason, notes, checked_in_at,
                 completed_at, created_at, updated_at, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, 1)",
            params![
                appointment.id.to_string(),
                appointment.patient_id.to_string(),
                appointment.provider_id.to_string(),
                appointment.date,
                appointment.time,
                appointment.duration_minutes,
                appointment.appointment_type.as_str(),
                appointment.status.as_str(),
                appointment.fee.0,
                appointment.cancellation_reason,
                appointment.notes,
                checked_in_at(appointment),
                appointment.completed_at,
                appointment.created_at,
                appointment.updated_at,
            ],
        )
        .map_err(translate)?;
        debug!(appointment = %appointment.id, "appointment row inserted");

        let mut stored = appointment.clone();
        stored.version = 1;
        Ok(stored)
    }

    fn update_appointment(&self, appointment: &Appointment) -> Result<Appointment, StorageError> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE appointments SET
                     date = ?3, time = ?4, duration_minutes = ?5, appointment_type = ?6,
                     status = ?7, fee = ?8, cancellation_reason = ?9, notes = ?10,
                     checked_in_at = ?11, completed_at = ?12, updated_at = ?13,
                     version = version + 1
                 WHERE id = ?1 AND version = ?2",
                params![
                    appointment.id.to_string(),
                    appointment.version,
                    appointment.date,
                    appointment.time,
                    appointment.duration_minutes,
                    appointment.appointment_type.as_str(),
                    appointment.status.as_str(),
                    appointment.fee.0,
                    appointment.cancellation_reason,
                    appointment.notes,
                    checked_in_at(appointment),
                    appointment.completed_at,
                    appointment.updated_at,
                ],
            )
            .map_err(translate)?;

        if changed == 0 {
            return match load(&conn, appointment.id)? {
                Some(_) => Err(StorageError::VersionConflict(appointment.id)),
                None => Err(StorageError::NotFound(appointment.id)),
            };
        }

        let mut stored = appointment.clone();
        stored.version += 1;
        Ok(stored)
    }

    fn get_appointment(&self, id: AppointmentId) -> Result<Option<Appointment>, StorageError> {
        load(&*self.lock()?, id)
    }

    fn appointments_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        provider: Option<ProviderId>,
    ) -> Result<Vec<Appointment>, StorageError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM appointments
             WHERE date BETWEEN ?1 AND ?2 AND (?3 IS NULL OR provider_id = ?3)
             ORDER BY date, time"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![from, to, provider.map(|p| p.to_string())], read_row)?;

        let mut found = Vec::new();
        for row in rows {
            found.push(Appointment::try_from(row?)?);
        }
        Ok(found)
    }
}
