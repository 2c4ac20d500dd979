//! Demo data for a fresh owner.

use pillsync_core::models::{
    Device, EmergencyContact, Entity, Frequency, MedicationSchedule, OwnerId, Patient,
};
use pillsync_core::sync::{Mutation, RemoteSource};
use pillsync_core::SqliteSource;
use tracing::info;

use crate::SimResult;

/// Rows written by [`seed_demo_data`].
#[derive(Debug, Clone)]
pub struct DemoData {
    pub patients: Vec<Patient>,
    pub schedules: Vec<MedicationSchedule>,
    pub devices: Vec<Device>,
}

struct DemoSchedule {
    patient: usize,
    medication: &'static str,
    dosage: &'static str,
    frequency: Frequency,
    timing: &'static str,
    stock: u32,
    instructions: Option<&'static str>,
}

const DEMO_SCHEDULES: [DemoSchedule; 4] = [
    DemoSchedule {
        patient: 0,
        medication: "Lisinopril",
        dosage: "10mg",
        frequency: Frequency::Daily,
        timing: "08:00",
        stock: 28,
        instructions: Some("Take with water"),
    },
    DemoSchedule {
        patient: 0,
        medication: "Metformin",
        dosage: "500mg",
        frequency: Frequency::TwiceDaily,
        timing: "08:00, 20:00",
        stock: 12,
        instructions: Some("Take with meals"),
    },
    DemoSchedule {
        patient: 1,
        medication: "Atorvastatin",
        dosage: "20mg",
        frequency: Frequency::Daily,
        timing: "21:00",
        stock: 45,
        instructions: None,
    },
    DemoSchedule {
        patient: 1,
        medication: "Ibuprofen",
        dosage: "200mg",
        frequency: Frequency::AsNeeded,
        timing: "As needed",
        stock: 6,
        instructions: Some("Do not exceed 3 doses a day"),
    },
];

/// Write two patients with schedules and two dispensers for `owner`.
pub async fn seed_demo_data(source: &SqliteSource, owner: OwnerId) -> SimResult<DemoData> {
    let mut mary = Patient::new(owner, "Mary Johnson", 78);
    mary.add_condition("Hypertension");
    mary.add_condition("Type 2 Diabetes");
    mary.emergency_contact = Some(EmergencyContact {
        name: "Susan Johnson".into(),
        phone: "555-0142".into(),
        relationship: "Daughter".into(),
    });

    let mut robert = Patient::new(owner, "Robert Chen", 82);
    robert.add_condition("Arthritis");
    robert.add_condition("High Cholesterol");

    let mut patients = Vec::new();
    for patient in [mary, robert] {
        patients.push(insert(source, owner, patient).await?);
    }

    let mut schedules = Vec::new();
    for demo in &DEMO_SCHEDULES {
        let patient = &patients[demo.patient];
        let mut schedule = MedicationSchedule::new(
            owner,
            patient.id,
            demo.medication,
            demo.dosage,
            demo.frequency,
            demo.stock,
        );
        schedule.patient_name = Some(patient.name.clone());
        schedule.timing = demo.timing.to_string();
        schedule.instructions = demo.instructions.map(str::to_string);
        schedules.push(insert(source, owner, schedule).await?);
    }

    let mut devices = Vec::new();
    for (name, location) in [("Kitchen Dispenser", "Kitchen"), ("Bedroom Dispenser", "Bedroom")] {
        devices.push(insert(source, owner, Device::new(owner, name, location)).await?);
    }

    info!(
        owner = %owner,
        patients = patients.len(),
        schedules = schedules.len(),
        devices = devices.len(),
        "Seeded demo data"
    );
    Ok(DemoData {
        patients,
        schedules,
        devices,
    })
}

async fn insert<E>(source: &SqliteSource, owner: OwnerId, row: E) -> SimResult<E>
where
    E: Entity,
    SqliteSource: RemoteSource<E>,
{
    let stored = source.mutate(owner, Mutation::Insert(row.clone())).await?;
    Ok(stored.unwrap_or(row))
}
