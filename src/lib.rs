//! Clinic appointment scheduling engine.
//!
//! Computes bookable slots from a provider's weekly working hours, guards
//! against double booking, and moves appointments through their lifecycle
//! while firing notification, invoicing and medical-record hooks.

pub mod calendar;
pub mod config;
pub mod conflict;
pub mod error;
pub mod hooks;
pub mod lifecycle;
pub mod models;
pub mod policy;
pub mod scheduler;
pub mod store;

pub use calendar::{Clock, FixedClock, SystemClock, WeeklySchedule, WorkingHours};
pub use config::SchedulerConfig;
pub use error::{Result, SchedulingError, StorageError, TransitionGuard};
pub use lifecycle::LifecycleEvent;
pub use models::{
    Appointment, AppointmentId, AppointmentStatus, AppointmentType, BookingRequest, Money, Patient, PatientId,
    Provider, ProviderId,
};
pub use policy::{Action, Actor};
pub use scheduler::AppointmentScheduler;
pub use store::{AppointmentStore, MemoryStore, SqliteStore};
