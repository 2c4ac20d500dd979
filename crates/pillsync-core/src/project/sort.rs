//! View orderings. Ties fall back to id so results are stable.

use serde::{Deserialize, Serialize};

use crate::models::{ActivityLogEntry, MedicationSchedule, Patient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatientSort {
    #[default]
    Name,
    Age,
    Newest,
}

impl PatientSort {
    pub fn sort(&self, patients: &mut [&Patient]) {
        match self {
            PatientSort::Name => patients.sort_by(|a, b| {
                a.name
                    .to_lowercase()
                    .cmp(&b.name.to_lowercase())
                    .then_with(|| a.id.cmp(&b.id))
            }),
            PatientSort::Age => {
                patients.sort_by(|a, b| a.age.cmp(&b.age).then_with(|| a.id.cmp(&b.id)))
            }
            PatientSort::Newest => patients.sort_by(|a, b| {
                b.created_at
                    .cmp(&a.created_at)
                    .then_with(|| a.id.cmp(&b.id))
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScheduleSort {
    #[default]
    Newest,
    Medication,
    /// Lowest stock first
    Stock,
}

impl ScheduleSort {
    pub fn sort(&self, schedules: &mut [&MedicationSchedule]) {
        match self {
            ScheduleSort::Newest => schedules.sort_by(|a, b| {
                b.created_at
                    .cmp(&a.created_at)
                    .then_with(|| a.id.cmp(&b.id))
            }),
            ScheduleSort::Medication => schedules.sort_by(|a, b| {
                a.medication_name
                    .to_lowercase()
                    .cmp(&b.medication_name.to_lowercase())
                    .then_with(|| a.id.cmp(&b.id))
            }),
            ScheduleSort::Stock => schedules.sort_by(|a, b| {
                a.current_stock
                    .cmp(&b.current_stock)
                    .then_with(|| a.id.cmp(&b.id))
            }),
        }
    }
}

/// Activity feeds are always newest first.
pub fn newest_first(entries: &mut [&ActivityLogEntry]) {
    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Frequency, OwnerId};
    use uuid::Uuid;

    #[test]
    fn test_schedule_sorts() {
        let owner = OwnerId::new();
        let patient = Uuid::new_v4();
        let a = MedicationSchedule::new(owner, patient, "zoloft", "1", Frequency::Daily, 3);
        let b = MedicationSchedule::new(owner, patient, "Aspirin", "1", Frequency::Daily, 30);
        let mut view = vec![&a, &b];

        ScheduleSort::Medication.sort(&mut view);
        assert_eq!(view[0].medication_name, "Aspirin");

        ScheduleSort::Stock.sort(&mut view);
        assert_eq!(view[0].current_stock, 3);
    }

    #[test]
    fn test_patient_sort_ignores_case() {
        let owner = OwnerId::new();
        let a = Patient::new(owner, "bob", 70);
        let b = Patient::new(owner, "Alice", 90);
        let mut view = vec![&a, &b];

        PatientSort::Name.sort(&mut view);
        assert_eq!(view[0].name, "Alice");

        PatientSort::Age.sort(&mut view);
        assert_eq!(view[0].name, "bob");
    }
}
