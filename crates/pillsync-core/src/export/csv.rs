//! Activity and schedule CSV.

use std::fmt;

use chrono::{DateTime, TimeZone};

use super::{dated_filename, ExportFile};
use crate::models::{ActivityLogEntry, MedicationSchedule, Patient};
use crate::project::schedule_patient;

pub const ACTIVITY_HEADER: [&str; 6] = [
    "Timestamp",
    "Event Type",
    "Patient",
    "Medication",
    "Status",
    "Description",
];

pub const SCHEDULE_HEADER: [&str; 9] = [
    "Patient",
    "Medication",
    "Dosage",
    "Frequency",
    "Timing",
    "Current Stock",
    "Status",
    "Last Taken",
    "Device Status",
];

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Export activity entries, in the given order, as `activity-log-<date>.csv`.
/// Timestamps are rendered in `now`'s time zone.
pub fn activity_csv<'a, Tz>(
    entries: impl IntoIterator<Item = &'a ActivityLogEntry>,
    now: &DateTime<Tz>,
) -> ExportFile
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let tz = now.timezone();
    let mut csv = String::new();
    push_row(&mut csv, ACTIVITY_HEADER);

    for entry in entries {
        push_row(
            &mut csv,
            [
                entry
                    .timestamp
                    .with_timezone(&tz)
                    .format(TIME_FORMAT)
                    .to_string()
                    .as_str(),
                entry.event_type.as_str(),
                entry.patient_name.as_deref().unwrap_or(""),
                entry.medication_name.as_deref().unwrap_or(""),
                entry.status.as_str(),
                entry.description.as_str(),
            ],
        );
    }

    ExportFile::csv(dated_filename("activity-log", now), csv)
}

/// Export schedules as `medication-schedules-<date>.csv`. The patient column
/// prefers the current patient name over the schedule's snapshot.
pub fn schedule_csv<'a, Tz>(
    schedules: impl IntoIterator<Item = &'a MedicationSchedule>,
    patients: &[Patient],
    now: &DateTime<Tz>,
) -> ExportFile
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let tz = now.timezone();
    let mut csv = String::new();
    push_row(&mut csv, SCHEDULE_HEADER);

    for schedule in schedules {
        let patient = schedule_patient(schedule, patients);
        let last_taken = schedule
            .last_taken
            .map(|t| t.with_timezone(&tz).format(TIME_FORMAT).to_string())
            .unwrap_or_default();
        let stock = schedule.current_stock.to_string();

        push_row(
            &mut csv,
            [
                patient.as_str(),
                schedule.medication_name.as_str(),
                schedule.dosage.as_str(),
                schedule.frequency.as_str(),
                schedule.timing.as_str(),
                stock.as_str(),
                schedule.status.as_str(),
                last_taken.as_str(),
                schedule.device_status.as_str(),
            ],
        );
    }

    ExportFile::csv(dated_filename("medication-schedules", now), csv)
}

fn push_row<'a>(csv: &mut String, fields: impl IntoIterator<Item = &'a str>) {
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            csv.push(',');
        }
        csv.push_str(&escape_csv(field));
    }
    csv.push('\n');
}

/// Escape a field for CSV output (RFC 4180).
pub fn escape_csv(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
