//! Appointment status state machine.
//!
//! ```text
//! scheduled --confirm--> confirmed --complete--> completed
//!     |  \                  |
//!     |   check-in (flag)   |
//!     +--cancel / no-show---+--> cancelled / no-show
//!     +<-----reschedule-----+
//! ```
//!
//! Functions here only validate and mutate an in-memory `Appointment`.
//! Persistence, authorization and side effects belong to the scheduler.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::error::{SchedulingError, TransitionGuard};
use crate::models::{Appointment, AppointmentStatus, Attendance};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleEvent {
    Confirm,
    CheckIn,
    Complete,
    Cancel,
    Reschedule,
    MarkNoShow,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleEvent::Confirm => "confirm",
            LifecycleEvent::CheckIn => "check in",
            LifecycleEvent::Complete => "complete",
            LifecycleEvent::Cancel => "cancel",
            LifecycleEvent::Reschedule => "reschedule",
            LifecycleEvent::MarkNoShow => "mark as no-show",
        };
        f.write_str(name)
    }
}

/// The status `event` leads to from `from`, or `None` if it is illegal.
pub fn next_status(from: AppointmentStatus, event: LifecycleEvent) -> Option<AppointmentStatus> {
    use AppointmentStatus::*;
    use LifecycleEvent::*;

    match (from, event) {
        (Scheduled, Confirm) => Some(Confirmed),
        (Scheduled, CheckIn) => Some(Scheduled),
        (Confirmed, Complete) => Some(Completed),
        (Scheduled | Confirmed, Cancel) => Some(Cancelled),
        (Scheduled | Confirmed, Reschedule) => Some(Scheduled),
        (Scheduled | Confirmed, MarkNoShow) => Some(NoShow),
        _ => None,
    }
}

/// Events that are legal from `status`.
pub fn allowed_events(status: AppointmentStatus) -> Vec<LifecycleEvent> {
    [
        LifecycleEvent::Confirm,
        LifecycleEvent::CheckIn,
        LifecycleEvent::Complete,
        LifecycleEvent::Cancel,
        LifecycleEvent::Reschedule,
        LifecycleEvent::MarkNoShow,
    ]
    .into_iter()
    .filter(|event| next_status(status, *event).is_some())
    .collect()
}

fn rejected(appointment: &Appointment, event: LifecycleEvent, guard: TransitionGuard) -> SchedulingError {
    warn!(
        appointment = %appointment.id,
        status = %appointment.status,
        %event,
        %guard,
        "transition rejected"
    );
    SchedulingError::InvalidTransition {
        from: appointment.status,
        event,
        guard,
    }
}

fn advance(appointment: &Appointment, event: LifecycleEvent) -> Result<AppointmentStatus, SchedulingError> {
    next_status(appointment.status, event)
        .ok_or_else(|| rejected(appointment, event, TransitionGuard::IllegalFromState))
}

fn require_reason(appointment: &Appointment, event: LifecycleEvent, reason: &str) -> Result<(), SchedulingError> {
    if reason.trim().is_empty() {
        return Err(rejected(appointment, event, TransitionGuard::ReasonRequired));
    }
    Ok(())
}

pub fn confirm(appointment: &mut Appointment, now: NaiveDateTime) -> Result<(), SchedulingError> {
    appointment.status = advance(appointment, LifecycleEvent::Confirm)?;
    appointment.updated_at = now;
    Ok(())
}

/// Records arrival. The status is left as it is.
pub fn check_in(appointment: &mut Appointment, now: NaiveDateTime) -> Result<(), SchedulingError> {
    let status = advance(appointment, LifecycleEvent::CheckIn)?;
    if appointment.attendance.is_checked_in() {
        return Err(rejected(appointment, LifecycleEvent::CheckIn, TransitionGuard::AlreadyCheckedIn));
    }
    appointment.status = status;
    appointment.attendance = Attendance::CheckedIn { at: now };
    appointment.updated_at = now;
    Ok(())
}

/// Only confirmed appointments can be completed.
pub fn complete(appointment: &mut Appointment, now: NaiveDateTime) -> Result<(), SchedulingError> {
    appointment.status = advance(appointment, LifecycleEvent::Complete)?;
    appointment.completed_at = Some(now);
    appointment.updated_at = now;
    Ok(())
}

pub fn cancel(appointment: &mut Appointment, reason: &str, now: NaiveDateTime) -> Result<(), SchedulingError> {
    let status = advance(appointment, LifecycleEvent::Cancel)?;
    require_reason(appointment, LifecycleEvent::Cancel, reason)?;
    appointment.status = status;
    appointment.cancellation_reason = Some(reason.trim().to_string());
    appointment.updated_at = now;
    Ok(())
}

/// Fails unless at least `notice_hours` remain before the slot starts.
pub fn check_cancellation_notice(
    appointment: &Appointment,
    now: NaiveDateTime,
    notice_hours: i64,
) -> Result<(), SchedulingError> {
    let too_late = match Duration::try_hours(notice_hours) {
        Some(notice) => appointment.starts_at() - now < notice,
        None => true,
    };
    if too_late {
        return Err(rejected(
            appointment,
            LifecycleEvent::Cancel,
            TransitionGuard::NoticePeriod { hours: notice_hours },
        ));
    }
    Ok(())
}

/// Moves the appointment and appends an audit note. The caller must have
/// validated the new slot already.
///
/// A confirmed appointment goes back to scheduled, and any check-in is
/// cleared since it belonged to the old slot.
pub fn reschedule(
    appointment: &mut Appointment,
    new_date: NaiveDate,
    new_time: NaiveTime,
    reason: &str,
    now: NaiveDateTime,
) -> Result<(), SchedulingError> {
    let status = advance(appointment, LifecycleEvent::Reschedule)?;
    require_reason(appointment, LifecycleEvent::Reschedule, reason)?;

    let note = format!(
        "Rescheduled from {} {} to {} {}. Reason: {}",
        appointment.date,
        appointment.time.format("%H:%M"),
        new_date,
        new_time.format("%H:%M"),
        reason.trim()
    );
    appointment.date = new_date;
    appointment.time = new_time;
    appointment.status = status;
    appointment.attendance = Attendance::NotArrived;
    appointment.append_note(&note);
    appointment.updated_at = now;
    Ok(())
}

/// Allowed once `grace_minutes` have passed since the slot start, and
/// never for a patient who checked in.
pub fn mark_no_show(
    appointment: &mut Appointment,
    now: NaiveDateTime,
    grace_minutes: i64,
) -> Result<(), SchedulingError> {
    let status = advance(appointment, LifecycleEvent::MarkNoShow)?;
    if appointment.attendance.is_checked_in() {
        return Err(rejected(appointment, LifecycleEvent::MarkNoShow, TransitionGuard::PatientArrived));
    }
    let due = Duration::try_minutes(grace_minutes).and_then(|grace| appointment.starts_at().checked_add_signed(grace));
    if due.map_or(true, |due| now < due) {
        return Err(rejected(appointment, LifecycleEvent::MarkNoShow, TransitionGuard::NotYetDue));
    }
    appointment.status = status;
    appointment.updated_at = now;
    Ok(())
}
