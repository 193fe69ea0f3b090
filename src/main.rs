/// Interactive front-desk console for the clinic scheduler.
///
/// Reads `clinic-scheduler.toml` from the working directory when present,
/// stores appointments in SQLite if a database path is configured and in
/// memory otherwise, then runs a menu loop on stdin.
use chrono::{Duration, NaiveDate};
use std::cell::Cell;
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;
use tracing::{error, info};

use clinic_scheduler::calendar::{parse_date, parse_time};
use clinic_scheduler::config::{self, SchedulerConfig, DEFAULT_CONFIG_FILE};
use clinic_scheduler::{
    Actor, Appointment, AppointmentScheduler, AppointmentStore, AppointmentType, BookingRequest, MemoryStore,
    Money, Patient, PatientId, Provider, SchedulingError, SqliteStore, WeeklySchedule, WorkingHours,
};

/// How far ahead the appointment pickers look.
const PICKER_DAYS: i64 = 30;

struct AppointmentCLI<S: AppointmentStore> {
    scheduler: AppointmentScheduler<S>,
    patients: HashMap<PatientId, Patient>,
    actor: Actor,
    running: bool,
    stdin_closed: Cell<bool>,
}

impl<S: AppointmentStore> AppointmentCLI<S> {
    fn new(scheduler: AppointmentScheduler<S>) -> Self {
        AppointmentCLI {
            scheduler,
            patients: HashMap::new(),
            actor: Actor::Receptionist,
            running: true,
            stdin_closed: Cell::new(false),
        }
    }

    fn print_header(&self) {
        println!("\n{}", "=".repeat(60));
        println!("       CLINIC APPOINTMENT SCHEDULER v{}", config::APP_VERSION);
        println!("{}", "=".repeat(60));
    }

    fn print_menu(&self) {
        println!("\n--- Main Menu (acting as {}) ---", self.describe_actor());
        println!(" 1. Add doctor");
        println!(" 2. Register patient");
        println!(" 3. Switch role");
        println!(" 4. View available slots");
        println!(" 5. Book appointment");
        println!(" 6. Confirm appointment");
        println!(" 7. Check in patient");
        println!(" 8. Complete appointment");
        println!(" 9. Cancel appointment");
        println!("10. Reschedule appointment");
        println!("11. Mark no-show");
        println!("12. Today's appointments");
        println!("13. Doctor's upcoming appointments");
        println!("14. Run demo");
        println!("15. Exit");
        println!("{}", "-".repeat(20));
    }

    fn describe_actor(&self) -> String {
        match self.actor {
            Actor::Admin => "admin".to_string(),
            Actor::Receptionist => "receptionist".to_string(),
            Actor::Doctor { provider } => match self.scheduler.provider(provider) {
                Ok(p) => p.name,
                Err(_) => format!("doctor {}", provider),
            },
        }
    }

    fn get_input(&self, prompt: &str, default: Option<&str>) -> String {
        if let Some(def) = default {
            print!("{} [{}]: ", prompt, def);
        } else {
            print!("{}: ", prompt);
        }
        let _ = io::stdout().flush();

        let mut input = String::new();
        match io::stdin().read_line(&mut input) {
            Ok(0) | Err(_) => self.stdin_closed.set(true),
            Ok(_) => {}
        }
        let input = input.trim();

        if input.is_empty() {
            default.unwrap_or("").to_string()
        } else {
            input.to_string()
        }
    }

    fn get_int_input(&self, prompt: &str, default: Option<i64>) -> i64 {
        loop {
            let default_str = default.map(|d| d.to_string());
            let input = self.get_input(prompt, default_str.as_deref());

            if let Ok(value) = input.parse::<i64>() {
                return value;
            }
            if self.stdin_closed.get() {
                return default.unwrap_or(0);
            }
            println!("Please enter a valid number");
        }
    }

    fn get_date_input(&self, prompt: &str, default: NaiveDate) -> Option<NaiveDate> {
        let input = self.get_input(prompt, Some(&default.format("%Y-%m-%d").to_string()));
        match parse_date(&input) {
            Ok(date) => Some(date),
            Err(e) => {
                println!("{}", e);
                None
            }
        }
    }

    fn report(&self, err: &SchedulingError) {
        println!("\nError: {}", err.user_message());
    }

    fn tomorrow(&self) -> NaiveDate {
        self.scheduler.now().date() + Duration::days(1)
    }

    fn patient_name(&self, id: PatientId) -> String {
        self.patients
            .get(&id)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| format!("patient {}", &id.to_string()[..8]))
    }

    fn describe(&self, appointment: &Appointment) -> String {
        let doctor = self
            .scheduler
            .provider(appointment.provider_id)
            .map(|p| p.name)
            .unwrap_or_else(|_| "unknown doctor".to_string());
        let arrived = if appointment.attendance.is_checked_in() {
            ", arrived"
        } else {
            ""
        };
        format!(
            "{} {} - {} with {} ({}, {}{})",
            appointment.date,
            appointment.time.format("%H:%M"),
            self.patient_name(appointment.patient_id),
            doctor,
            appointment.appointment_type,
            appointment.status,
            arrived
        )
    }

    fn choose_provider(&self) -> Option<Provider> {
        let providers = match self.scheduler.providers() {
            Ok(providers) => providers,
            Err(e) => {
                self.report(&e);
                return None;
            }
        };
        if providers.is_empty() {
            println!("\nPlease add a doctor first (option 1)");
            return None;
        }

        println!("\nDoctors:");
        for (i, p) in providers.iter().enumerate() {
            println!("  {}. {} ({}, fee {})", i + 1, p.name, p.specialization, p.consultation_fee);
        }
        let choice = self.get_int_input("Select doctor (0 to go back)", Some(1));
        if choice <= 0 {
            return None;
        }
        providers.into_iter().nth(choice as usize - 1)
    }

    fn choose_patient(&mut self) -> Option<PatientId> {
        let mut patients: Vec<&Patient> = self.patients.values().collect();
        patients.sort_by(|a, b| a.name.cmp(&b.name));

        println!("\nPatients:");
        println!("  0. New patient");
        for (i, p) in patients.iter().enumerate() {
            println!("  {}. {} ({})", i + 1, p.name, p.contact);
        }
        let choice = self.get_int_input("Select patient", Some(0));
        if choice <= 0 {
            return self.register_patient();
        }
        patients.get(choice as usize - 1).map(|p| p.id)
    }

    fn choose_appointment(&self, title: &str) -> Option<Appointment> {
        let today = self.scheduler.now().date();
        let appointments = match self
            .scheduler
            .store()
            .appointments_between(today, today + Duration::days(PICKER_DAYS), None)
        {
            Ok(all) => all.into_iter().filter(|a| !a.status.is_terminal()).collect::<Vec<_>>(),
            Err(e) => {
                self.report(&SchedulingError::from(e));
                return None;
            }
        };
        if appointments.is_empty() {
            println!("\nNo open appointments");
            return None;
        }

        println!("\n--- {} ---", title);
        for (i, appointment) in appointments.iter().enumerate() {
            println!("  {}. {}", i + 1, self.describe(appointment));
        }
        let choice = self.get_int_input("Select appointment (0 to go back)", Some(0));
        if choice <= 0 {
            return None;
        }
        appointments.into_iter().nth(choice as usize - 1)
    }

    fn add_doctor(&mut self) {
        println!("\n--- Add Doctor ---");

        let name = self.get_input("Doctor name", Some("Dr. Smith"));
        let specialization = self.get_input("Specialization", Some("General Practice"));
        let fee = match self.get_input("Consultation fee", Some("150.00")).parse::<Money>() {
            Ok(fee) => fee,
            Err(e) => {
                println!("{}", e);
                return;
            }
        };

        println!("Working days as numbers, 0 = Sunday ... 6 = Saturday");
        let days_input = self.get_input("Working days", Some("0,1,2,3,4"));
        let days: Result<Vec<u32>, _> = days_input.split(',').map(|d| d.trim().parse::<u32>()).collect();
        let days = match days {
            Ok(days) => days,
            Err(_) => {
                println!("Working days must be numbers separated by commas");
                return;
            }
        };
        let start = self.get_int_input("Working hours start", Some(9));
        let end = self.get_int_input("Working hours end", Some(17));

        let provider = WorkingHours::hours(start.clamp(0, 24) as u32, end.clamp(0, 24) as u32)
            .and_then(|hours| WeeklySchedule::uniform(&days, hours))
            .and_then(|schedule| Provider::new(name, specialization, fee, schedule))
            .and_then(|provider| {
                let name = provider.name.clone();
                self.scheduler.register_provider(provider).map(|_| name)
            });
        match provider {
            Ok(name) => println!("\n{} can now be booked", name),
            Err(e) => self.report(&e),
        }
    }

    fn register_patient(&mut self) -> Option<PatientId> {
        println!("\n--- Register Patient ---");
        let name = self.get_input("Patient name", None);
        let contact = self.get_input("Patient contact (phone/email)", None);

        match Patient::new(name, contact) {
            Ok(patient) => {
                let id = patient.id;
                println!("\nRegistered {}", patient.name);
                self.patients.insert(id, patient);
                Some(id)
            }
            Err(e) => {
                self.report(&e);
                None
            }
        }
    }

    fn switch_role(&mut self) {
        println!("\nRoles:");
        println!("  1. Admin");
        println!("  2. Receptionist");
        println!("  3. Doctor");
        match self.get_int_input("Select role", Some(2)) {
            1 => self.actor = Actor::Admin,
            2 => self.actor = Actor::Receptionist,
            3 => {
                if let Some(provider) = self.choose_provider() {
                    self.actor = Actor::Doctor { provider: provider.id };
                }
            }
            _ => println!("Invalid choice"),
        }
        println!("\nNow acting as {}", self.describe_actor());
    }

    fn view_available_slots(&self) {
        let Some(provider) = self.choose_provider() else {
            return;
        };
        let Some(date) = self.get_date_input("Date (YYYY-MM-DD)", self.tomorrow()) else {
            return;
        };

        match self.scheduler.available_slots(provider.id, date) {
            Ok(slots) if slots.is_empty() => println!("\nNo available slots on {}", date.format("%A, %Y-%m-%d")),
            Ok(slots) => {
                println!("\n{} on {} ({} free):", provider.name, date.format("%A, %Y-%m-%d"), slots.len());
                for row in slots.chunks(6) {
                    let line: Vec<String> = row.iter().map(|t| t.format("%H:%M").to_string()).collect();
                    println!("  {}", line.join("  "));
                }
            }
            Err(e) => self.report(&e),
        }
    }

    fn book_appointment(&mut self) {
        println!("\n--- Book Appointment ---");
        let Some(provider) = self.choose_provider() else {
            return;
        };
        let Some(patient) = self.choose_patient() else {
            return;
        };
        let Some(date) = self.get_date_input("Date (YYYY-MM-DD)", self.tomorrow()) else {
            return;
        };
        let time = match parse_time(&self.get_input("Time (HH:MM)", Some("10:00"))) {
            Ok(time) => time,
            Err(e) => {
                println!("{}", e);
                return;
            }
        };
        let kind = match self
            .get_input("Type (consultation/follow-up/emergency/surgery)", Some("consultation"))
            .parse::<AppointmentType>()
        {
            Ok(kind) => kind,
            Err(e) => {
                println!("{}", e);
                return;
            }
        };
        let notes = self.get_input("Notes", Some(""));

        let mut request = BookingRequest::new(patient, provider.id, date, time).with_type(kind);
        if !notes.is_empty() {
            request = request.with_notes(notes);
        }

        match self.scheduler.book(&self.actor, request) {
            Ok(appointment) => {
                println!("\nBooked: {}", self.describe(&appointment));
                println!("Fee: {}", appointment.fee);
            }
            Err(e) => self.report(&e),
        }
    }

    fn confirm_appointment(&self) {
        if let Some(appointment) = self.choose_appointment("Confirm Appointment") {
            match self.scheduler.confirm(&self.actor, appointment.id) {
                Ok(updated) => println!("\nConfirmed: {}", self.describe(&updated)),
                Err(e) => self.report(&e),
            }
        }
    }

    fn check_in(&self) {
        if let Some(appointment) = self.choose_appointment("Check In Patient") {
            match self.scheduler.check_in(&self.actor, appointment.id) {
                Ok(updated) => println!("\n{} is in the waiting room", self.patient_name(updated.patient_id)),
                Err(e) => self.report(&e),
            }
        }
    }

    fn complete_appointment(&self) {
        if let Some(appointment) = self.choose_appointment("Complete Appointment") {
            let record = self.get_input("Open a medical record? (y/n)", Some("n"));
            match self
                .scheduler
                .complete(&self.actor, appointment.id, record.eq_ignore_ascii_case("y"))
            {
                Ok(updated) => println!("\nCompleted: {}", self.describe(&updated)),
                Err(e) => self.report(&e),
            }
        }
    }

    fn cancel_appointment(&self) {
        if let Some(appointment) = self.choose_appointment("Cancel Appointment") {
            let reason = self.get_input("Cancellation reason", None);
            match self.scheduler.cancel(&self.actor, appointment.id, &reason) {
                Ok(_) => {
                    println!("\nAppointment for {} cancelled", self.patient_name(appointment.patient_id));
                    println!("Time slot is now available again");
                }
                Err(e) => self.report(&e),
            }
        }
    }

    fn reschedule_appointment(&self) {
        let Some(appointment) = self.choose_appointment("Reschedule Appointment") else {
            return;
        };
        let Some(date) = self.get_date_input("New date (YYYY-MM-DD)", appointment.date) else {
            return;
        };
        let time = match parse_time(&self.get_input("New time (HH:MM)", None)) {
            Ok(time) => time,
            Err(e) => {
                println!("{}", e);
                return;
            }
        };
        let reason = self.get_input("Reason", None);

        match self
            .scheduler
            .reschedule(&self.actor, appointment.id, date, time, &reason)
        {
            Ok(updated) => println!("\nMoved: {}", self.describe(&updated)),
            Err(e) => self.report(&e),
        }
    }

    fn mark_no_show(&self) {
        if let Some(appointment) = self.choose_appointment("Mark No-Show") {
            match self.scheduler.mark_no_show(&self.actor, appointment.id) {
                Ok(updated) => println!("\nMarked as no-show: {}", self.describe(&updated)),
                Err(e) => self.report(&e),
            }
        }
    }

    fn print_list(&self, title: &str, appointments: &[Appointment]) {
        if appointments.is_empty() {
            println!("\nNo appointments");
            return;
        }
        println!("\n--- {} ({}) ---", title, appointments.len());
        for appointment in appointments {
            println!("  {}", self.describe(appointment));
            if let Some(notes) = &appointment.notes {
                for line in notes.lines().filter(|l| !l.is_empty()) {
                    println!("      {}", line);
                }
            }
        }
    }

    fn view_today(&self) {
        match self.scheduler.todays_appointments() {
            Ok(list) => self.print_list("Today's Appointments", &list),
            Err(e) => self.report(&e),
        }
    }

    fn view_upcoming(&self) {
        let Some(provider) = self.choose_provider() else {
            return;
        };
        let days = self.get_int_input("Days ahead", Some(7));
        match self.scheduler.upcoming_for_provider(&self.actor, provider.id, days) {
            Ok(list) => self.print_list(&format!("Upcoming for {}", provider.name), &list),
            Err(e) => self.report(&e),
        }
    }

    fn run_demo(&mut self) {
        println!("\n--- Running Demo ---");

        let demo = WorkingHours::hours(9, 17)
            .and_then(|hours| WeeklySchedule::uniform(&[0, 1, 2, 3, 4], hours))
            .and_then(|schedule| Provider::new("Dr. Demo", "Cardiology", Money::from_minor(15000), schedule));
        let provider = match demo {
            Ok(provider) => provider,
            Err(e) => {
                self.report(&e);
                return;
            }
        };
        if let Err(e) = self.scheduler.register_provider(provider.clone()) {
            self.report(&e);
            return;
        }
        println!("Dr. Demo works Sunday to Thursday, 09:00 to 17:00");

        let Some(day) = (1..=7)
            .map(|offset| self.scheduler.now().date() + Duration::days(offset))
            .find(|date| provider.schedule.hours_on(*date).is_some())
        else {
            return;
        };

        let mut people = Vec::new();
        for (name, contact) in [
            ("John Smith", "john@email.com"),
            ("Jane Doe", "jane@email.com"),
            ("Bob Wilson", "bob@email.com"),
        ] {
            match Patient::new(name, contact) {
                Ok(patient) => {
                    people.push(patient.id);
                    self.patients.insert(patient.id, patient);
                }
                Err(e) => {
                    self.report(&e);
                    return;
                }
            }
        }
        let (john, jane, bob) = (people[0], people[1], people[2]);

        let free = self.scheduler.available_slots(provider.id, day).map(|s| s.len()).unwrap_or(0);
        println!("{} free slots on {}", free, day.format("%A, %Y-%m-%d"));

        let front_desk = Actor::Receptionist;
        let at = |h: u32, m: u32| chrono::NaiveTime::from_hms_opt(h, m, 0);
        let (Some(ten), Some(half_past)) = (at(10, 0), at(10, 30)) else {
            return;
        };

        println!("\nBooking John Smith at 10:00...");
        let johns = match self.scheduler.book(&front_desk, BookingRequest::new(john, provider.id, day, ten)) {
            Ok(appointment) => appointment,
            Err(e) => {
                self.report(&e);
                return;
            }
        };
        println!("  {}", self.describe(&johns));

        println!("\nBooking Jane Doe at 10:00 as well...");
        if let Err(e) = self.scheduler.book(&front_desk, BookingRequest::new(jane, provider.id, day, ten)) {
            println!("  Refused: {}", e.user_message());
        }

        println!("\nBooking Jane Doe at 10:30 instead...");
        let janes = self
            .scheduler
            .book(&front_desk, BookingRequest::new(jane, provider.id, day, half_past));
        if let Ok(appointment) = &janes {
            println!("  {}", self.describe(appointment));
        }

        if let Err(e) = self.scheduler.confirm(&front_desk, johns.id) {
            self.report(&e);
        }

        if let Ok(appointment) = janes {
            println!("\nAdmin cancels Jane's appointment...");
            if let Err(e) = self.scheduler.cancel(&Actor::Admin, appointment.id, "Patient travelling") {
                self.report(&e);
            }
            println!("Booking Bob Wilson into the freed 10:30 slot...");
            match self
                .scheduler
                .book(&front_desk, BookingRequest::new(bob, provider.id, day, half_past))
            {
                Ok(appointment) => println!("  {}", self.describe(&appointment)),
                Err(e) => self.report(&e),
            }
        }

        let doctor = Actor::Doctor { provider: provider.id };
        match self.scheduler.upcoming_for_provider(&doctor, provider.id, 7) {
            Ok(list) => self.print_list("Dr. Demo's scheduled appointments", &list),
            Err(e) => self.report(&e),
        }
        println!("\nJohn's appointment is confirmed, so it is no longer listed as scheduled.");
    }

    fn run(&mut self) {
        self.print_header();

        while self.running {
            self.print_menu();

            let choice = self.get_int_input("Enter choice", Some(14));
            if self.stdin_closed.get() {
                self.running = false;
                break;
            }

            match choice {
                1 => self.add_doctor(),
                2 => {
                    self.register_patient();
                }
                3 => self.switch_role(),
                4 => self.view_available_slots(),
                5 => self.book_appointment(),
                6 => self.confirm_appointment(),
                7 => self.check_in(),
                8 => self.complete_appointment(),
                9 => self.cancel_appointment(),
                10 => self.reschedule_appointment(),
                11 => self.mark_no_show(),
                12 => self.view_today(),
                13 => self.view_upcoming(),
                14 => self.run_demo(),
                15 => {
                    self.running = false;
                    println!("\nGoodbye!");
                }
                _ => println!("Invalid choice"),
            }
        }
    }
}

fn main() -> ExitCode {
    let config = match SchedulerConfig::load_or_default(Path::new(DEFAULT_CONFIG_FILE)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", config::APP_NAME, e);
            return ExitCode::FAILURE;
        }
    };
    config::init_tracing(&config.log_filter);
    info!(version = config::APP_VERSION, slot_minutes = config.slot_minutes, "starting {}", config::APP_NAME);

    match config.database_path.clone() {
        Some(path) => match SqliteStore::open(&path) {
            Ok(store) => serve(store, config),
            Err(e) => {
                error!(path = %path.display(), error = %e, "cannot open database");
                ExitCode::FAILURE
            }
        },
        None => serve(MemoryStore::new(), config),
    }
}

fn serve<S: AppointmentStore>(store: S, config: SchedulerConfig) -> ExitCode {
    match AppointmentScheduler::new(store, config) {
        Ok(scheduler) => {
            AppointmentCLI::new(scheduler).run();
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "invalid configuration");
            ExitCode::FAILURE
        }
    }
}
