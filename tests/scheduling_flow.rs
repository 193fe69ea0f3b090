use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use pretty_assertions::assert_eq;
use std::sync::Arc;

use clinic_scheduler::hooks::{InMemoryInvoicer, InMemoryNotifier};
use clinic_scheduler::models::{NotificationAction, NotificationKind, Recipient};
use clinic_scheduler::{
    Action, Actor, AppointmentScheduler, AppointmentStatus, AppointmentStore, BookingRequest, FixedClock, MemoryStore,
    Money, PatientId, Provider, ProviderId, SchedulerConfig, SchedulingError, SqliteStore, TransitionGuard,
    WeeklySchedule, WorkingHours,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

// Monday morning before opening.
fn start_of_week() -> NaiveDateTime {
    date(2026, 10, 19).and_hms_opt(8, 0, 0).unwrap()
}

const WEDNESDAY: (i32, u32, u32) = (2026, 10, 21);
const FRIDAY: (i32, u32, u32) = (2026, 10, 23);

fn wednesday() -> NaiveDate {
    date(WEDNESDAY.0, WEDNESDAY.1, WEDNESDAY.2)
}

struct Clinic<S: AppointmentStore> {
    scheduler: AppointmentScheduler<S>,
    clock: Arc<FixedClock>,
    notifier: Arc<InMemoryNotifier>,
    invoicer: Arc<InMemoryInvoicer>,
    doctor: ProviderId,
}

fn clinic<S: AppointmentStore>(store: S) -> Clinic<S> {
    let clock = Arc::new(FixedClock::new(start_of_week()));
    let notifier = Arc::new(InMemoryNotifier::new());
    let invoicer = Arc::new(InMemoryInvoicer::new());
    let scheduler = AppointmentScheduler::new(store, SchedulerConfig::default())
        .unwrap()
        .with_clock(clock.clone())
        .with_notifier(notifier.clone())
        .with_invoicer(invoicer.clone());

    // Sunday to Thursday, 09:00 to 17:00.
    let schedule = WeeklySchedule::uniform(&[0, 1, 2, 3, 4], WorkingHours::hours(9, 17).unwrap()).unwrap();
    let doctor = scheduler
        .register_provider(Provider::new("Dr. Amina Qureshi", "Cardiology", Money(15000), schedule).unwrap())
        .unwrap();

    Clinic {
        scheduler,
        clock,
        notifier,
        invoicer,
        doctor,
    }
}

fn request(c: &Clinic<impl AppointmentStore>, day: NaiveDate, time: NaiveTime) -> BookingRequest {
    BookingRequest::new(PatientId::new(), c.doctor, day, time)
}

#[test]
fn working_day_offers_sixteen_half_hour_slots() {
    let c = clinic(MemoryStore::new());
    let slots = c.scheduler.available_slots(c.doctor, wednesday()).unwrap();

    assert_eq!(slots.len(), 16);
    assert_eq!(slots.first(), Some(&t(9, 0)));
    assert_eq!(slots.last(), Some(&t(16, 30)));

    let friday = date(FRIDAY.0, FRIDAY.1, FRIDAY.2);
    assert!(c.scheduler.available_slots(c.doctor, friday).unwrap().is_empty());
}

#[test]
fn conflict_guard_rejects_bad_requests() {
    let c = clinic(MemoryStore::new());
    let desk = Actor::Receptionist;
    let friday = date(FRIDAY.0, FRIDAY.1, FRIDAY.2);

    let err = c.scheduler.book(&desk, request(&c, friday, t(10, 0))).unwrap_err();
    assert!(matches!(err, SchedulingError::ProviderUnavailableDay { weekday: 5, .. }));

    let err = c.scheduler.book(&desk, request(&c, wednesday(), t(8, 30))).unwrap_err();
    assert!(matches!(err, SchedulingError::OutsideWorkingHours { .. }));

    let err = c.scheduler.book(&desk, request(&c, wednesday(), t(17, 0))).unwrap_err();
    assert!(matches!(err, SchedulingError::OutsideWorkingHours { .. }));

    let err = c.scheduler.book(&desk, request(&c, wednesday(), t(9, 15))).unwrap_err();
    assert!(matches!(err, SchedulingError::MisalignedSlot { .. }));

    let err = c
        .scheduler
        .book(&desk, request(&c, date(2026, 10, 18), t(10, 0)))
        .unwrap_err();
    assert!(matches!(err, SchedulingError::DateInPast { .. }));
}

#[test]
fn double_booking_is_refused_until_the_slot_is_cancelled() {
    let c = clinic(MemoryStore::new());
    let desk = Actor::Receptionist;

    let first = c.scheduler.book(&desk, request(&c, wednesday(), t(10, 0))).unwrap();
    let slots = c.scheduler.available_slots(c.doctor, wednesday()).unwrap();
    assert_eq!(slots.len(), 15);
    assert!(!slots.contains(&t(10, 0)));

    let err = c.scheduler.book(&desk, request(&c, wednesday(), t(10, 0))).unwrap_err();
    assert!(matches!(err, SchedulingError::SlotTaken { .. }));
    assert_eq!(err.user_message(), "This slot is unavailable");

    c.scheduler.cancel(&desk, first.id, "Patient travelling").unwrap();
    assert!(c
        .scheduler
        .available_slots(c.doctor, wednesday())
        .unwrap()
        .contains(&t(10, 0)));

    let second = c.scheduler.book(&desk, request(&c, wednesday(), t(10, 0))).unwrap();
    assert_eq!(second.status, AppointmentStatus::Scheduled);
    assert_ne!(second.id, first.id);
}

#[test]
fn full_visit_from_booking_to_completion() {
    let c = clinic(MemoryStore::new());
    let desk = Actor::Receptionist;
    let doctor = Actor::Doctor { provider: c.doctor };

    let booked = c
        .scheduler
        .book(&desk, request(&c, wednesday(), t(11, 0)).with_notes("Chest pain on exertion"))
        .unwrap();
    assert_eq!(booked.fee, Money(15000));
    assert_eq!(c.invoicer.invoices_for(booked.id).len(), 1);

    // Completing straight from scheduled is not allowed.
    let err = c.scheduler.complete(&doctor, booked.id, false).unwrap_err();
    assert!(matches!(
        err,
        SchedulingError::InvalidTransition {
            from: AppointmentStatus::Scheduled,
            guard: TransitionGuard::IllegalFromState,
            ..
        }
    ));

    c.clock.set(wednesday().and_hms_opt(10, 50, 0).unwrap());
    let arrived = c.scheduler.check_in(&desk, booked.id).unwrap();
    assert_eq!(arrived.status, AppointmentStatus::Scheduled);
    assert!(arrived.attendance.is_checked_in());

    c.scheduler.confirm(&desk, booked.id).unwrap();
    c.clock.advance(Duration::minutes(40));
    let done = c.scheduler.complete(&doctor, booked.id, true).unwrap();
    assert_eq!(done.status, AppointmentStatus::Completed);
    assert_eq!(done.completed_at, Some(wednesday().and_hms_opt(11, 30, 0).unwrap()));

    let actions: Vec<(Recipient, NotificationAction)> = c
        .notifier
        .sent_for(booked.id)
        .into_iter()
        .map(|n| (n.recipient, n.data.action))
        .collect();
    assert_eq!(
        actions,
        vec![
            (Recipient::Provider(c.doctor), NotificationAction::CheckedIn),
            (Recipient::Patient(booked.patient_id), NotificationAction::Confirmed),
            (Recipient::Patient(booked.patient_id), NotificationAction::Completed),
        ]
    );

    // Terminal: nothing more can happen to it.
    assert!(c.scheduler.cancel(&Actor::Admin, booked.id, "too late").is_err());
    assert_eq!(c.invoicer.invoices_for(booked.id).len(), 1);
}

#[test]
fn cancellation_requires_a_reason_and_warns_both_sides() {
    let c = clinic(MemoryStore::new());
    let desk = Actor::Receptionist;
    let booked = c.scheduler.book(&desk, request(&c, wednesday(), t(14, 0))).unwrap();

    let err = c.scheduler.cancel(&desk, booked.id, "   ").unwrap_err();
    assert!(matches!(
        err,
        SchedulingError::InvalidTransition {
            guard: TransitionGuard::ReasonRequired,
            ..
        }
    ));

    let cancelled = c.scheduler.cancel(&desk, booked.id, "Doctor on leave").unwrap();
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("Doctor on leave"));

    let sent = c.notifier.sent_for(booked.id);
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|n| n.kind == NotificationKind::Warning));
}

#[test]
fn reschedule_moves_the_booking_and_keeps_an_audit_note() {
    let c = clinic(MemoryStore::new());
    let desk = Actor::Receptionist;
    let booked = c
        .scheduler
        .book(&desk, request(&c, wednesday(), t(9, 0)).with_notes("First visit"))
        .unwrap();
    c.scheduler.confirm(&desk, booked.id).unwrap();

    let thursday = date(2026, 10, 22);
    let moved = c
        .scheduler
        .reschedule(&desk, booked.id, thursday, t(15, 30), "Patient asked for afternoon")
        .unwrap();

    assert_eq!((moved.date, moved.time), (thursday, t(15, 30)));
    assert_eq!(moved.status, AppointmentStatus::Scheduled);
    assert_eq!(
        moved.notes.as_deref(),
        Some(
            "First visit\n\nRescheduled from 2026-10-21 09:00 to 2026-10-22 15:30. \
             Reason: Patient asked for afternoon"
        )
    );
    assert!(c
        .scheduler
        .available_slots(c.doctor, wednesday())
        .unwrap()
        .contains(&t(9, 0)));
}

#[test]
fn roles_are_enforced() {
    let c = clinic(MemoryStore::new());
    let booked = c
        .scheduler
        .book(&Actor::Receptionist, request(&c, wednesday(), t(9, 0)))
        .unwrap();

    let other_doctor = Actor::Doctor {
        provider: ProviderId::new(),
    };
    assert!(matches!(
        c.scheduler.cancel(&other_doctor, booked.id, "not mine"),
        Err(SchedulingError::Unauthorized(Action::Cancel))
    ));
    assert!(matches!(
        c.scheduler.check_in(&Actor::Admin, booked.id),
        Err(SchedulingError::Unauthorized(Action::CheckIn))
    ));
    assert!(matches!(
        c.scheduler.confirm(&Actor::Doctor { provider: c.doctor }, booked.id),
        Err(SchedulingError::Unauthorized(Action::Confirm))
    ));
}

#[test]
fn sqlite_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clinic.db");

    let booked = {
        let c = clinic(SqliteStore::open(&path).unwrap());
        let desk = Actor::Receptionist;
        let booked = c.scheduler.book(&desk, request(&c, wednesday(), t(13, 0))).unwrap();
        c.scheduler.confirm(&desk, booked.id).unwrap();

        let err = c.scheduler.book(&desk, request(&c, wednesday(), t(13, 0))).unwrap_err();
        assert!(matches!(err, SchedulingError::SlotTaken { .. }));
        booked
    };

    let reopened = SqliteStore::open(&path).unwrap();
    let stored = reopened.get_appointment(booked.id).unwrap().unwrap();
    assert_eq!(stored.status, AppointmentStatus::Confirmed);
    assert_eq!(stored.fee, Money(15000));
    assert_eq!(stored.version, 2);
    assert_eq!(reopened.find_bookings_for(booked.provider_id, wednesday()).unwrap().len(), 1);
}

#[test]
fn sunday_visit_end_to_end() {
    let c = clinic(MemoryStore::new());
    let desk = Actor::Receptionist;
    let sunday = date(2026, 10, 25);

    let booked = c.scheduler.book(&desk, request(&c, sunday, t(9, 0))).unwrap();
    assert_eq!(booked.status, AppointmentStatus::Scheduled);

    let confirmed = c.scheduler.confirm(&desk, booked.id).unwrap();
    assert_eq!(confirmed.status, AppointmentStatus::Confirmed);

    let err = c.scheduler.book(&desk, request(&c, sunday, t(9, 0))).unwrap_err();
    assert!(matches!(err, SchedulingError::SlotTaken { .. }));

    let done = c.scheduler.complete(&Actor::Admin, booked.id, false).unwrap();
    assert_eq!(done.status, AppointmentStatus::Completed);
    assert_eq!(c.invoicer.invoices().len(), 1);

    assert!(matches!(
        c.scheduler.confirm(&desk, booked.id),
        Err(SchedulingError::InvalidTransition {
            from: AppointmentStatus::Completed,
            ..
        })
    ));
}

#[test]
fn cancelling_twice_fails() {
    let c = clinic(MemoryStore::new());
    let booked = c
        .scheduler
        .book(&Actor::Receptionist, request(&c, wednesday(), t(12, 0)))
        .unwrap();
    c.scheduler.cancel(&Actor::Admin, booked.id, "patient request").unwrap();

    let err = c.scheduler.cancel(&Actor::Admin, booked.id, "again").unwrap_err();
    assert!(matches!(
        err,
        SchedulingError::InvalidTransition {
            from: AppointmentStatus::Cancelled,
            guard: TransitionGuard::IllegalFromState,
            ..
        }
    ));
}
