//! Appointment booking and lifecycle engine.
//!
//! `AppointmentScheduler` ties the pieces together: it looks up the
//! provider, runs the conflict guard, persists through an
//! `AppointmentStore`, drives the lifecycle state machine, and fires the
//! notification, invoicing and medical-record hooks.
//!
//! Hook failures are logged and swallowed. Once a booking or transition
//! has been stored it stands, whatever its side effects do.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use crate::calendar::{compute_available_slots, Clock, SystemClock};
use crate::config::{ConfigError, SchedulerConfig};
use crate::conflict::validate_booking;
use crate::error::{Result, SchedulingError, StorageError};
use crate::hooks::{InMemoryInvoicer, Invoicer, LoggedMedicalRecords, MedicalRecords, Notifier, TracingNotifier};
use crate::lifecycle::{self, LifecycleEvent};
use crate::models::{
    Appointment, AppointmentId, AppointmentStatus, Attendance, BookingRequest, Invoice, Notification,
    NotificationAction, Provider, ProviderId, Recipient,
};
use crate::policy::{self, Action, Actor, Authorizer, RoleAuthorizer};
use crate::store::AppointmentStore;

pub struct AppointmentScheduler<S: AppointmentStore> {
    store: S,
    config: SchedulerConfig,
    providers: RwLock<HashMap<ProviderId, Provider>>,
    clock: Arc<dyn Clock>,
    authorizer: Arc<dyn Authorizer>,
    notifier: Arc<dyn Notifier>,
    invoicer: Arc<dyn Invoicer>,
    medical_records: Arc<dyn MedicalRecords>,
}

fn poisoned() -> SchedulingError {
    SchedulingError::Storage(StorageError::Poisoned)
}

impl<S: AppointmentStore> AppointmentScheduler<S> {
    /// Scheduler on the system clock with role-based authorization,
    /// log-only notifications and an in-memory invoice ledger.
    ///
    /// Fails if `config` does not pass `SchedulerConfig::validate`.
    pub fn new(store: S, config: SchedulerConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(AppointmentScheduler {
            store,
            config,
            providers: RwLock::new(HashMap::new()),
            clock: Arc::new(SystemClock),
            authorizer: Arc::new(RoleAuthorizer),
            notifier: Arc::new(TracingNotifier),
            invoicer: Arc::new(InMemoryInvoicer::new()),
            medical_records: Arc::new(LoggedMedicalRecords),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_invoicer(mut self, invoicer: Arc<dyn Invoicer>) -> Self {
        self.invoicer = invoicer;
        self
    }

    pub fn with_medical_records(mut self, medical_records: Arc<dyn MedicalRecords>) -> Self {
        self.medical_records = medical_records;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    // ---------------------------------------------------------------
    // Providers
    // ---------------------------------------------------------------

    /// Make a provider bookable, replacing any earlier registration.
    pub fn register_provider(&self, provider: Provider) -> Result<ProviderId> {
        let id = provider.id;
        info!(provider = %id, name = %provider.name, "provider registered");
        self.providers.write().map_err(|_| poisoned())?.insert(id, provider);
        Ok(id)
    }

    pub fn provider(&self, id: ProviderId) -> Result<Provider> {
        self.providers
            .read()
            .map_err(|_| poisoned())?
            .get(&id)
            .cloned()
            .ok_or(SchedulingError::ProviderNotFound(id))
    }

    pub fn providers(&self) -> Result<Vec<Provider>> {
        let mut all: Vec<Provider> = self.providers.read().map_err(|_| poisoned())?.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    // ---------------------------------------------------------------
    // Availability
    // ---------------------------------------------------------------

    /// Free slot starts for a provider on a date, read fresh from the store.
    pub fn available_slots(&self, provider_id: ProviderId, date: NaiveDate) -> Result<Vec<NaiveTime>> {
        let provider = self.provider(provider_id)?;
        let booked: Vec<NaiveTime> = self
            .store
            .find_bookings_for(provider_id, date)?
            .into_iter()
            .filter(|b| b.status.blocks_slot())
            .map(|b| b.time)
            .collect();
        let slots = compute_available_slots(&provider, date, &booked, self.config.slot_minutes);
        debug!(provider = %provider_id, %date, free = slots.len(), "computed availability");
        Ok(slots)
    }

    /// Runs the conflict guard without booking anything.
    pub fn check_availability(&self, provider_id: ProviderId, date: NaiveDate, time: NaiveTime) -> Result<()> {
        let provider = self.provider(provider_id)?;
        self.check_slot(&provider, date, time)
    }

    fn check_slot(&self, provider: &Provider, date: NaiveDate, time: NaiveTime) -> Result<()> {
        if date < self.clock.today() {
            return Err(SchedulingError::DateInPast { date });
        }
        let existing = self.store.find_bookings_for(provider.id, date)?;
        validate_booking(provider, date, time, &existing, self.config.slot_minutes)
    }

    // ---------------------------------------------------------------
    // Booking
    // ---------------------------------------------------------------

    /// Book a slot. The new appointment starts out scheduled.
    ///
    /// The fee is the request's override or else the provider's
    /// consultation fee at this moment. A positive fee raises one invoice.
    pub fn book(&self, actor: &Actor, request: BookingRequest) -> Result<Appointment> {
        self.authorize(actor, Action::Book, request.provider_id)?;
        let provider = self.provider(request.provider_id)?;
        if let Some(notes) = &request.notes {
            check_length("notes", notes, self.config.max_note_length)?;
        }
        if let Some(fee) = request.fee {
            if fee.0 < 0 {
                return Err(SchedulingError::InvalidInput {
                    field: "fee",
                    reason: format!("{} is negative", fee),
                });
            }
        }

        self.check_slot(&provider, request.date, request.time)?;

        let now = self.clock.now();
        let appointment = Appointment {
            id: AppointmentId::new(),
            patient_id: request.patient_id,
            provider_id: provider.id,
            date: request.date,
            time: request.time,
            duration_minutes: self.config.slot_minutes,
            appointment_type: request.appointment_type,
            status: AppointmentStatus::Scheduled,
            fee: request.fee.unwrap_or(provider.consultation_fee),
            cancellation_reason: None,
            notes: request.notes.filter(|n| !n.trim().is_empty()),
            attendance: Attendance::NotArrived,
            completed_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        };

        let stored = self
            .store
            .insert_appointment(&appointment)
            .map_err(|err| slot_error(err, &appointment))?;
        info!(
            appointment = %stored.id,
            provider = %stored.provider_id,
            date = %stored.date,
            time = %stored.time,
            fee = %stored.fee,
            "appointment booked"
        );

        if stored.fee.is_positive() {
            self.raise_invoice(&stored, &provider);
        }
        Ok(stored)
    }

    fn raise_invoice(&self, appointment: &Appointment, provider: &Provider) {
        let invoice = Invoice::for_appointment(
            appointment,
            provider,
            self.clock.today(),
            self.config.invoice_due_days,
        );
        if let Err(err) = self.invoicer.create_invoice_for_appointment(invoice) {
            warn!(appointment = %appointment.id, error = %err, "invoice creation failed");
        }
    }

    // ---------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------

    pub fn confirm(&self, actor: &Actor, id: AppointmentId) -> Result<Appointment> {
        let confirmed = self.transition(actor, id, Action::Confirm, lifecycle::confirm)?;
        self.notify_patient(&confirmed, NotificationAction::Confirmed, None);
        Ok(confirmed)
    }

    /// Marks the patient as arrived. The status stays scheduled.
    pub fn check_in(&self, actor: &Actor, id: AppointmentId) -> Result<Appointment> {
        let arrived = self.transition(actor, id, Action::CheckIn, lifecycle::check_in)?;
        self.notify_provider(&arrived, NotificationAction::CheckedIn, None);
        Ok(arrived)
    }

    /// Completes a confirmed appointment, optionally opening a medical record.
    pub fn complete(&self, actor: &Actor, id: AppointmentId, create_medical_record: bool) -> Result<Appointment> {
        let completed = self.transition(actor, id, Action::Complete, lifecycle::complete)?;
        if create_medical_record {
            if let Err(err) = self.medical_records.open_for_appointment(&completed) {
                warn!(appointment = %completed.id, error = %err, "medical record creation failed");
            }
        }
        self.notify_patient(&completed, NotificationAction::Completed, None);
        Ok(completed)
    }

    /// Cancels with a mandatory reason. Staff other than admins need
    /// `cancellation_notice_hours` notice.
    pub fn cancel(&self, actor: &Actor, id: AppointmentId, reason: &str) -> Result<Appointment> {
        check_length("cancellation reason", reason, self.config.max_reason_length)?;
        let notice_hours = policy::bound_by_cancellation_notice(actor).then_some(self.config.cancellation_notice_hours);

        let cancelled = self.transition(actor, id, Action::Cancel, |appointment, now| {
            if let Some(hours) = notice_hours {
                if lifecycle::next_status(appointment.status, LifecycleEvent::Cancel).is_some() {
                    lifecycle::check_cancellation_notice(appointment, now, hours)?;
                }
            }
            lifecycle::cancel(appointment, reason, now)
        })?;

        let reason = cancelled.cancellation_reason.as_deref();
        self.notify_patient(&cancelled, NotificationAction::Cancelled, reason);
        self.notify_provider(&cancelled, NotificationAction::Cancelled, reason);
        Ok(cancelled)
    }

    /// Moves an appointment to a new slot that passes the conflict guard.
    /// The appointment returns to scheduled and an audit note is appended.
    pub fn reschedule(
        &self,
        actor: &Actor,
        id: AppointmentId,
        new_date: NaiveDate,
        new_time: NaiveTime,
        reason: &str,
    ) -> Result<Appointment> {
        check_length("reschedule reason", reason, self.config.max_reason_length)?;

        self.transition(actor, id, Action::Reschedule, |appointment, now| {
            if lifecycle::next_status(appointment.status, LifecycleEvent::Reschedule).is_some() {
                let provider = self.provider(appointment.provider_id)?;
                self.check_slot(&provider, new_date, new_time)?;
            }
            lifecycle::reschedule(appointment, new_date, new_time, reason, now)
        })
    }

    /// Records that the patient never came.
    pub fn mark_no_show(&self, actor: &Actor, id: AppointmentId) -> Result<Appointment> {
        let grace = self.config.no_show_grace_minutes;
        let missed = self.transition(actor, id, Action::MarkNoShow, |appointment, now| {
            lifecycle::mark_no_show(appointment, now, grace)
        })?;
        self.notify_patient(&missed, NotificationAction::NoShow, None);
        Ok(missed)
    }

    /// Load, authorize, apply `apply` to a copy, and write it back.
    fn transition<F>(&self, actor: &Actor, id: AppointmentId, action: Action, apply: F) -> Result<Appointment>
    where
        F: FnOnce(&mut Appointment, NaiveDateTime) -> Result<()>,
    {
        let mut appointment = self.appointment(id)?;
        self.authorize(actor, action, appointment.provider_id)?;

        let from = appointment.status;
        apply(&mut appointment, self.clock.now())?;

        let stored = self
            .store
            .update_appointment(&appointment)
            .map_err(|err| slot_error(err, &appointment))?;
        info!(
            appointment = %id,
            %from,
            to = %stored.status,
            action = ?action,
            "appointment updated"
        );
        Ok(stored)
    }

    fn authorize(&self, actor: &Actor, action: Action, provider: ProviderId) -> Result<()> {
        let owns = self.authorizer.current_actor_owns_provider(actor, provider);
        if policy::permits(actor, action, owns) {
            Ok(())
        } else {
            warn!(?actor, ?action, %provider, "authorization denied");
            Err(SchedulingError::Unauthorized(action))
        }
    }

    fn notify_patient(&self, appointment: &Appointment, action: NotificationAction, reason: Option<&str>) {
        self.notify(Recipient::Patient(appointment.patient_id), appointment, action, reason);
    }

    fn notify_provider(&self, appointment: &Appointment, action: NotificationAction, reason: Option<&str>) {
        self.notify(Recipient::Provider(appointment.provider_id), appointment, action, reason);
    }

    fn notify(&self, recipient: Recipient, appointment: &Appointment, action: NotificationAction, reason: Option<&str>) {
        let notification = Notification::for_appointment(recipient, appointment, action, reason);
        if let Err(err) = self.notifier.notify(notification) {
            warn!(appointment = %appointment.id, ?recipient, error = %err, "notification failed");
        }
    }

    // ---------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------

    pub fn appointment(&self, id: AppointmentId) -> Result<Appointment> {
        self.store
            .get_appointment(id)?
            .ok_or(SchedulingError::AppointmentNotFound(id))
    }

    /// Every appointment dated today, all providers, ordered by time.
    pub fn todays_appointments(&self) -> Result<Vec<Appointment>> {
        let today = self.clock.today();
        Ok(self.store.appointments_between(today, today, None)?)
    }

    /// Scheduled appointments for a provider from today through `days` ahead.
    pub fn upcoming_for_provider(&self, actor: &Actor, provider: ProviderId, days: i64) -> Result<Vec<Appointment>> {
        self.authorize(actor, Action::ViewAgenda, provider)?;
        let today = self.clock.today();
        let until = Duration::try_days(days.max(0))
            .and_then(|span| today.checked_add_signed(span))
            .ok_or_else(|| SchedulingError::InvalidInput {
                field: "days",
                reason: format!("{} days ahead is out of range", days),
            })?;
        Ok(self
            .store
            .appointments_between(today, until, Some(provider))?
            .into_iter()
            .filter(|a| a.status == AppointmentStatus::Scheduled)
            .collect())
    }
}

/// A uniqueness violation means another request took the slot first.
fn slot_error(err: StorageError, appointment: &Appointment) -> SchedulingError {
    match err {
        StorageError::UniquenessViolation => {
            warn!(
                provider = %appointment.provider_id,
                date = %appointment.date,
                time = %appointment.time,
                "slot taken concurrently"
            );
            SchedulingError::SlotTaken {
                provider: appointment.provider_id,
                date: appointment.date,
                time: appointment.time,
            }
        }
        other => other.into(),
    }
}

fn check_length(field: &'static str, value: &str, max: usize) -> Result<()> {
    let length = value.chars().count();
    if length > max {
        return Err(SchedulingError::InvalidInput {
            field,
            reason: format!("{} characters exceeds the limit of {}", length, max),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{FixedClock, WeeklySchedule, WorkingHours};
    use crate::error::TransitionGuard;
    use crate::hooks::{HookError, InMemoryNotifier};
    use crate::models::{Money, PatientId};
    use crate::store::MemoryStore;

    // Monday 2026-10-19, 08:00.
    fn monday_morning() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 19)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    struct Fixture {
        scheduler: AppointmentScheduler<MemoryStore>,
        clock: Arc<FixedClock>,
        notifier: Arc<InMemoryNotifier>,
        invoicer: Arc<InMemoryInvoicer>,
        provider: ProviderId,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(FixedClock::new(monday_morning()));
        let notifier = Arc::new(InMemoryNotifier::new());
        let invoicer = Arc::new(InMemoryInvoicer::new());
        let scheduler = AppointmentScheduler::new(MemoryStore::new(), SchedulerConfig::default())
            .unwrap()
            .with_clock(clock.clone())
            .with_notifier(notifier.clone())
            .with_invoicer(invoicer.clone());
        let schedule = WeeklySchedule::uniform(&[0, 1, 2, 3, 4], WorkingHours::hours(9, 17).unwrap()).unwrap();
        let provider = scheduler
            .register_provider(Provider::new("Dr. Farah", "Pediatrics", Money(12000), schedule).unwrap())
            .unwrap();
        Fixture {
            scheduler,
            clock,
            notifier,
            invoicer,
            provider,
        }
    }

    fn wednesday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 21).unwrap()
    }

    fn book_at(f: &Fixture, time: NaiveTime) -> Appointment {
        f.scheduler
            .book(
                &Actor::Receptionist,
                BookingRequest::new(PatientId::new(), f.provider, wednesday(), time),
            )
            .unwrap()
    }

    #[test]
    fn booking_snapshots_fee_and_invoices_once() {
        let f = fixture();
        let appt = book_at(&f, t(9, 0));

        assert_eq!(appt.status, AppointmentStatus::Scheduled);
        assert_eq!(appt.fee, Money(12000));
        let invoices = f.invoicer.invoices_for(appt.id);
        assert_eq!(invoices.len(), 1);
        assert_eq!(invoices[0].total_amount, Money(12000));
        assert_eq!(invoices[0].due_date, monday_morning().date() + Duration::days(7));
        assert_eq!(invoices[0].items[0].description, "Medical consultation - Pediatrics");
    }

    #[test]
    fn free_booking_raises_no_invoice() {
        let f = fixture();
        let appt = f
            .scheduler
            .book(
                &Actor::Admin,
                BookingRequest::new(PatientId::new(), f.provider, wednesday(), t(9, 0)).with_fee(Money::ZERO),
            )
            .unwrap();
        assert!(f.invoicer.invoices_for(appt.id).is_empty());
    }

    #[test]
    fn later_fee_change_does_not_touch_booked_fee() {
        let f = fixture();
        let appt = book_at(&f, t(9, 0));
        let mut provider = f.scheduler.provider(f.provider).unwrap();
        provider.consultation_fee = Money(99900);
        f.scheduler.register_provider(provider).unwrap();

        assert_eq!(f.scheduler.appointment(appt.id).unwrap().fee, Money(12000));
    }

    #[test]
    fn booking_in_the_past_is_rejected() {
        let f = fixture();
        let last_week = monday_morning().date() - Duration::days(7);
        let result = f.scheduler.book(
            &Actor::Receptionist,
            BookingRequest::new(PatientId::new(), f.provider, last_week, t(9, 0)),
        );
        assert!(matches!(result, Err(SchedulingError::DateInPast { .. })));
    }

    #[test]
    fn doctors_cannot_book() {
        let f = fixture();
        let doctor = Actor::Doctor { provider: f.provider };
        let result = f.scheduler.book(
            &doctor,
            BookingRequest::new(PatientId::new(), f.provider, wednesday(), t(9, 0)),
        );
        assert!(matches!(result, Err(SchedulingError::Unauthorized(Action::Book))));
    }

    #[test]
    fn unknown_provider_is_reported() {
        let f = fixture();
        let result = f.scheduler.available_slots(ProviderId::new(), wednesday());
        assert!(matches!(result, Err(SchedulingError::ProviderNotFound(_))));
    }

    #[test]
    fn other_doctor_cannot_complete() {
        let f = fixture();
        let appt = book_at(&f, t(9, 0));
        f.scheduler.confirm(&Actor::Receptionist, appt.id).unwrap();

        let stranger = Actor::Doctor {
            provider: ProviderId::new(),
        };
        assert!(matches!(
            f.scheduler.complete(&stranger, appt.id, false),
            Err(SchedulingError::Unauthorized(Action::Complete))
        ));

        let owner = Actor::Doctor { provider: f.provider };
        let done = f.scheduler.complete(&owner, appt.id, true).unwrap();
        assert_eq!(done.status, AppointmentStatus::Completed);
    }

    #[test]
    fn receptionist_needs_a_days_notice_to_cancel() {
        let f = fixture();
        let appt = book_at(&f, t(9, 0));
        f.clock.set(wednesday().and_hms_opt(7, 0, 0).unwrap());

        let err = f
            .scheduler
            .cancel(&Actor::Receptionist, appt.id, "patient request")
            .unwrap_err();
        assert!(matches!(
            err,
            SchedulingError::InvalidTransition {
                guard: TransitionGuard::NoticePeriod { hours: 24 },
                ..
            }
        ));

        let cancelled = f.scheduler.cancel(&Actor::Admin, appt.id, "patient request").unwrap();
        assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
    }

    #[test]
    fn cancel_notifies_patient_and_provider() {
        let f = fixture();
        let appt = book_at(&f, t(9, 0));
        f.scheduler.cancel(&Actor::Receptionist, appt.id, "patient request").unwrap();

        let sent = f.notifier.sent_for(appt.id);
        let recipients: Vec<_> = sent.iter().map(|n| n.recipient).collect();
        assert_eq!(
            recipients,
            vec![Recipient::Patient(appt.patient_id), Recipient::Provider(f.provider)]
        );
        assert!(sent.iter().all(|n| n.data.reason.as_deref() == Some("patient request")));
    }

    #[test]
    fn overlong_reason_is_rejected() {
        let f = fixture();
        let appt = book_at(&f, t(9, 0));
        let reason = "x".repeat(501);
        assert!(matches!(
            f.scheduler.cancel(&Actor::Admin, appt.id, &reason),
            Err(SchedulingError::InvalidInput { .. })
        ));
    }

    #[test]
    fn check_in_notifies_provider_and_keeps_status() {
        let f = fixture();
        let appt = book_at(&f, t(9, 0));
        let arrived = f.scheduler.check_in(&Actor::Receptionist, appt.id).unwrap();

        assert_eq!(arrived.status, AppointmentStatus::Scheduled);
        assert!(arrived.attendance.is_checked_in());
        let sent = f.notifier.sent_for(appt.id);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, Recipient::Provider(f.provider));
    }

    #[test]
    fn reschedule_into_taken_slot_fails_and_leaves_appointment() {
        let f = fixture();
        book_at(&f, t(10, 0));
        let moving = book_at(&f, t(11, 0));

        let result = f
            .scheduler
            .reschedule(&Actor::Receptionist, moving.id, wednesday(), t(10, 0), "clash");
        assert!(matches!(result, Err(SchedulingError::SlotTaken { .. })));
        assert_eq!(f.scheduler.appointment(moving.id).unwrap().time, t(11, 0));
    }

    #[test]
    fn reschedule_frees_old_slot() {
        let f = fixture();
        let appt = book_at(&f, t(10, 0));
        f.scheduler.confirm(&Actor::Receptionist, appt.id).unwrap();

        let moved = f
            .scheduler
            .reschedule(&Actor::Receptionist, appt.id, wednesday(), t(14, 30), "doctor in surgery")
            .unwrap();

        assert_eq!(moved.status, AppointmentStatus::Scheduled);
        let slots = f.scheduler.available_slots(f.provider, wednesday()).unwrap();
        assert!(slots.contains(&t(10, 0)));
        assert!(!slots.contains(&t(14, 30)));
    }

    #[test]
    fn no_show_only_after_grace() {
        let f = fixture();
        let appt = book_at(&f, t(9, 0));
        f.clock.set(wednesday().and_hms_opt(9, 10, 0).unwrap());
        assert!(f.scheduler.mark_no_show(&Actor::Receptionist, appt.id).is_err());

        f.clock.advance(Duration::minutes(30));
        let missed = f.scheduler.mark_no_show(&Actor::Receptionist, appt.id).unwrap();
        assert_eq!(missed.status, AppointmentStatus::NoShow);
        assert!(f.scheduler.available_slots(f.provider, wednesday()).unwrap().contains(&t(9, 0)));
    }

    struct FailingNotifier;

    impl Notifier for FailingNotifier {
        fn notify(&self, _: Notification) -> std::result::Result<(), HookError> {
            Err(HookError::Unavailable("smtp down".into()))
        }
    }

    #[test]
    fn notification_failure_does_not_fail_transition() {
        let f = fixture();
        let scheduler = f.scheduler.with_notifier(Arc::new(FailingNotifier));
        let appt = scheduler
            .book(
                &Actor::Receptionist,
                BookingRequest::new(PatientId::new(), f.provider, wednesday(), t(9, 0)),
            )
            .unwrap();

        let confirmed = scheduler.confirm(&Actor::Receptionist, appt.id).unwrap();
        assert_eq!(confirmed.status, AppointmentStatus::Confirmed);
        assert_eq!(
            scheduler.appointment(appt.id).unwrap().status,
            AppointmentStatus::Confirmed
        );
    }

    #[test]
    fn upcoming_lists_only_scheduled_in_range() {
        let f = fixture();
        let first = book_at(&f, t(9, 0));
        let second = book_at(&f, t(9, 30));
        f.scheduler.confirm(&Actor::Receptionist, second.id).unwrap();

        let owner = Actor::Doctor { provider: f.provider };
        let upcoming = f.scheduler.upcoming_for_provider(&owner, f.provider, 7).unwrap();
        let ids: Vec<_> = upcoming.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![first.id]);

        assert!(f.scheduler.upcoming_for_provider(&owner, f.provider, 1).unwrap().is_empty());

        let stranger = Actor::Doctor {
            provider: ProviderId::new(),
        };
        assert!(f.scheduler.upcoming_for_provider(&stranger, f.provider, 7).is_err());
    }

    #[test]
    fn far_horizon_is_rejected_not_panicking() {
        let f = fixture();
        book_at(&f, t(9, 0));

        let result = f.scheduler.upcoming_for_provider(&Actor::Admin, f.provider, 200_000_000);
        assert!(matches!(result, Err(SchedulingError::InvalidInput { field: "days", .. })));
        let result = f.scheduler.upcoming_for_provider(&Actor::Admin, f.provider, i64::MAX);
        assert!(matches!(result, Err(SchedulingError::InvalidInput { field: "days", .. })));

        assert_eq!(
            f.scheduler
                .upcoming_for_provider(&Actor::Admin, f.provider, 3650)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn invalid_config_is_refused_at_construction() {
        let config = SchedulerConfig {
            slot_minutes: 0,
            ..SchedulerConfig::default()
        };
        assert!(AppointmentScheduler::new(MemoryStore::new(), config).is_err());

        let config = SchedulerConfig {
            invoice_due_days: 9_000_000_000_000,
            ..SchedulerConfig::default()
        };
        assert!(AppointmentScheduler::new(MemoryStore::new(), config).is_err());
    }

    #[test]
    fn checked_in_patient_cannot_be_marked_no_show() {
        let f = fixture();
        let appt = book_at(&f, t(9, 0));
        f.clock.set(wednesday().and_hms_opt(8, 55, 0).unwrap());
        f.scheduler.check_in(&Actor::Receptionist, appt.id).unwrap();

        f.clock.advance(Duration::minutes(60));
        let err = f.scheduler.mark_no_show(&Actor::Receptionist, appt.id).unwrap_err();
        assert!(matches!(
            err,
            SchedulingError::InvalidTransition {
                guard: TransitionGuard::PatientArrived,
                ..
            }
        ));

        let stored = f.scheduler.appointment(appt.id).unwrap();
        assert_eq!(stored.status, AppointmentStatus::Scheduled);
        assert!(stored.attendance.is_checked_in());
        assert!(f
            .notifier
            .sent_for(appt.id)
            .iter()
            .all(|n| n.data.action != NotificationAction::NoShow));
    }

    #[test]
    fn todays_agenda_follows_the_clock() {
        let f = fixture();
        book_at(&f, t(9, 0));
        assert!(f.scheduler.todays_appointments().unwrap().is_empty());

        f.clock.set(wednesday().and_hms_opt(7, 30, 0).unwrap());
        assert_eq!(f.scheduler.todays_appointments().unwrap().len(), 1);
    }
}
