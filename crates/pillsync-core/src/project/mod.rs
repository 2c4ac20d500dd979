//! View projection over local mirrors.
//!
//! Everything here reads mirror contents and returns new values. Nothing is
//! cached: "now" is an argument, so date buckets move across midnight and
//! aggregates follow owner changes without invalidation.

mod date_range;
mod filter;
mod sort;
mod stats;

pub use date_range::*;
pub use filter::*;
pub use sort::*;
pub use stats::*;

use uuid::Uuid;

use crate::models::{MedicationSchedule, Patient};

/// Rendered in place of a patient name that no longer resolves.
pub const UNKNOWN_PATIENT: &str = "Unknown patient";

/// Name of the referenced patient, tolerating dangling references.
pub fn patient_label(patients: &[Patient], id: Uuid) -> String {
    patients
        .iter()
        .find(|p| p.id == id)
        .map(|p| p.name.clone())
        .unwrap_or_else(|| UNKNOWN_PATIENT.to_string())
}

/// Patient column for a schedule: the current name, else the name stored
/// on the schedule, else [`UNKNOWN_PATIENT`].
pub fn schedule_patient(schedule: &MedicationSchedule, patients: &[Patient]) -> String {
    match (&schedule.patient_name, patients.iter().any(|p| p.id == schedule.patient_id)) {
        (Some(name), false) => name.clone(),
        _ => patient_label(patients, schedule.patient_id),
    }
}

/// Lowercased, trimmed search needle. Blank input means "no search".
pub(crate) fn needle(search: &Option<String>) -> Option<String> {
    search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
}

/// Case-insensitive substring match against any of the given fields.
pub(crate) fn any_contains<'a>(
    needle: &str,
    fields: impl IntoIterator<Item = Option<&'a str>>,
) -> bool {
    fields
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OwnerId;

    #[test]
    fn test_patient_label_falls_back() {
        let patient = Patient::new(OwnerId::new(), "Mary Smith", 78);
        let patients = vec![patient.clone()];

        assert_eq!(patient_label(&patients, patient.id), "Mary Smith");
        assert_eq!(patient_label(&patients, Uuid::new_v4()), UNKNOWN_PATIENT);
    }

    #[test]
    fn test_blank_search_is_ignored() {
        assert_eq!(needle(&None), None);
        assert_eq!(needle(&Some("   ".into())), None);
        assert_eq!(needle(&Some(" MetFormin ".into())), Some("metformin".into()));
    }
}
