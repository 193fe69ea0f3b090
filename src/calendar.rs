//! Calendar arithmetic, the injectable clock, and slot availability.
//!
//! Weekday numbering is fixed at 0 = Sunday through 6 = Saturday and is
//! the key space of `WeeklySchedule`.

use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use crate::error::{FormatError, SchedulingError};
use crate::models::Provider;

/// Source of "now" for every time-sensitive operation.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

/// Wall clock in the local timezone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<NaiveDateTime>,
}

impl FixedClock {
    pub fn new(now: NaiveDateTime) -> Self {
        FixedClock {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

const MINUTES_PER_DAY: i64 = 24 * 60;

/// Day of week, 0 = Sunday.
pub fn day_of_week(date: NaiveDate) -> u32 {
    date.weekday().num_days_from_sunday()
}

/// Adds minutes to a time of day, wrapping past midnight.
pub fn add_minutes(time: NaiveTime, minutes: i64) -> NaiveTime {
    time.overflowing_add_signed(Duration::minutes(minutes.rem_euclid(MINUTES_PER_DAY))).0
}

pub fn compare_time_of_day(a: NaiveTime, b: NaiveTime) -> Ordering {
    a.cmp(&b)
}

/// Parses a `YYYY-MM-DD` date.
pub fn parse_date(input: &str) -> Result<NaiveDate, FormatError> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d").map_err(|_| FormatError::new("date", input))
}

/// Parses `HH:MM` or `HH:MM:SS`.
pub fn parse_time(input: &str) -> Result<NaiveTime, FormatError> {
    let trimmed = input.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .map_err(|_| FormatError::new("time", input))
}

/// The `[start, end)` window a provider accepts bookings in on one weekday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl WorkingHours {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, SchedulingError> {
        if start >= end {
            return Err(SchedulingError::InvalidInput {
                field: "working hours",
                reason: format!("start {} must be before end {}", start, end),
            });
        }
        Ok(WorkingHours { start, end })
    }

    /// Convenience for whole-hour windows such as 9 to 17.
    pub fn hours(start_hour: u32, end_hour: u32) -> Result<Self, SchedulingError> {
        let to_time = |hour: u32| {
            NaiveTime::from_hms_opt(hour, 0, 0).ok_or_else(|| SchedulingError::InvalidInput {
                field: "working hours",
                reason: format!("{} is not an hour of the day", hour),
            })
        };
        WorkingHours::new(to_time(start_hour)?, to_time(end_hour)?)
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        self.start <= time && time < self.end
    }

    /// Whether `time` is a whole number of slots after the window start.
    pub fn is_on_grid(&self, time: NaiveTime, slot_minutes: i64) -> bool {
        if time < self.start || slot_minutes <= 0 {
            return false;
        }
        let offset = time - self.start;
        offset.num_seconds() % (slot_minutes.min(MINUTES_PER_DAY) * 60) == 0
    }

    /// Slot start times from `start` while strictly before `end`.
    pub fn slots(&self, slot_minutes: i64) -> SlotGrid {
        SlotGrid {
            next: Some(self.start),
            end: self.end,
            step: Duration::minutes(slot_minutes.clamp(1, MINUTES_PER_DAY)),
        }
    }
}

/// Iterator over slot start times in a window. Never crosses midnight.
#[derive(Debug, Clone)]
pub struct SlotGrid {
    next: Option<NaiveTime>,
    end: NaiveTime,
    step: Duration,
}

impl Iterator for SlotGrid {
    type Item = NaiveTime;

    fn next(&mut self) -> Option<NaiveTime> {
        let current = self.next.filter(|t| *t < self.end)?;
        let (following, wrapped) = current.overflowing_add_signed(self.step);
        self.next = if wrapped == 0 { Some(following) } else { None };
        Some(current)
    }
}

/// Working hours per weekday, at most one window per day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklySchedule {
    days: BTreeMap<u32, WorkingHours>,
}

impl WeeklySchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the window for `weekday`, replacing any previous one.
    pub fn set(&mut self, weekday: u32, hours: WorkingHours) -> Result<(), SchedulingError> {
        if weekday > 6 {
            return Err(SchedulingError::InvalidInput {
                field: "weekday",
                reason: format!("{} is not in 0..=6", weekday),
            });
        }
        self.days.insert(weekday, hours);
        Ok(())
    }

    pub fn with_day(mut self, weekday: u32, hours: WorkingHours) -> Result<Self, SchedulingError> {
        self.set(weekday, hours)?;
        Ok(self)
    }

    /// Same window on every listed weekday.
    pub fn uniform(weekdays: &[u32], hours: WorkingHours) -> Result<Self, SchedulingError> {
        weekdays
            .iter()
            .try_fold(WeeklySchedule::new(), |schedule, day| schedule.with_day(*day, hours))
    }

    pub fn clear(&mut self, weekday: u32) {
        self.days.remove(&weekday);
    }

    pub fn hours_for_weekday(&self, weekday: u32) -> Option<WorkingHours> {
        self.days.get(&weekday).copied()
    }

    pub fn hours_on(&self, date: NaiveDate) -> Option<WorkingHours> {
        self.hours_for_weekday(day_of_week(date))
    }

    pub fn working_days(&self) -> impl Iterator<Item = u32> + '_ {
        self.days.keys().copied()
    }
}

/// Bookable slot starts for `provider` on `date`, minus `booked` times.
///
/// `booked` should only hold times of scheduled or confirmed
/// appointments. Times outside the window are ignored. A day with no
/// window yields no slots.
pub fn compute_available_slots(
    provider: &Provider,
    date: NaiveDate,
    booked: &[NaiveTime],
    slot_minutes: i64,
) -> Vec<NaiveTime> {
    let Some(hours) = provider.schedule.hours_on(date) else {
        return Vec::new();
    };
    let taken: HashSet<NaiveTime> = booked.iter().copied().collect();
    hours
        .slots(slot_minutes)
        .filter(|slot| !taken.contains(slot))
        .collect()
}
