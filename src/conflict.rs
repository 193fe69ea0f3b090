//! Booking validation against existing bookings and working hours.

use chrono::{NaiveDate, NaiveTime};
use tracing::debug;

use crate::calendar::day_of_week;
use crate::error::SchedulingError;
use crate::models::Provider;
use crate::store::BookedSlot;

/// Checks that `provider` can take a booking at `date` `time`.
///
/// Checks run in a fixed order: an active booking at the same time, a
/// missing window for the weekday, a time outside `[start, end)`, and
/// finally alignment with the slot grid. Only scheduled and confirmed
/// entries in `existing` count as occupying a slot.
///
/// This is a pre-check. Stores enforce the same exclusion atomically on
/// insert, so a racing booking that passes here still fails there.
pub fn validate_booking(
    provider: &Provider,
    date: NaiveDate,
    time: NaiveTime,
    existing: &[BookedSlot],
    slot_minutes: i64,
) -> Result<(), SchedulingError> {
    if existing
        .iter()
        .any(|booked| booked.time == time && booked.status.blocks_slot())
    {
        debug!(provider = %provider.id, %date, %time, "slot already taken");
        return Err(SchedulingError::SlotTaken {
            provider: provider.id,
            date,
            time,
        });
    }

    let weekday = day_of_week(date);
    let hours = provider
        .schedule
        .hours_for_weekday(weekday)
        .ok_or(SchedulingError::ProviderUnavailableDay {
            provider: provider.id,
            date,
            weekday,
        })?;

    if !hours.contains(time) {
        return Err(SchedulingError::OutsideWorkingHours {
            time,
            start: hours.start,
            end: hours.end,
        });
    }

    if !hours.is_on_grid(time, slot_minutes) {
        return Err(SchedulingError::MisalignedSlot {
            time,
            start: hours.start,
            granularity: slot_minutes,
        });
    }

    Ok(())
}
