//! Synchronized collection and mutator tests against the SQLite source.

use chrono::Utc;
use uuid::Uuid;

use pillsync_core::config::{ResubscribePolicy, SyncConfig};
use pillsync_core::models::{
    ActivityLogEntry, EventType, Frequency, MedicationSchedule, OrderBy, OwnerId, Patient,
    ScheduleStatus, StockTier, Table,
};
use pillsync_core::notify::RecordingNotifier;
use pillsync_core::source::SqliteSource;
use pillsync_core::sync::{
    ChangeEvent, CollectionStatus, Mutation, OptimisticMutator, RemoteSource, SyncError,
    SyncedCollection,
};

fn fast_config() -> SyncConfig {
    SyncConfig {
        resubscribe: ResubscribePolicy {
            max_attempts: 2,
            backoff_ms: 1,
        },
        ..Default::default()
    }
}

async fn seed(source: &SqliteSource, owner: OwnerId, stock: u32) -> (Patient, MedicationSchedule) {
    let patient = Patient::new(owner, "Mary Smith", 82);
    source.mutate(owner, Mutation::Insert(patient.clone())).await.unwrap();

    let mut schedule = MedicationSchedule::new(owner, patient.id, "Metformin", "500mg", Frequency::Daily, stock);
    schedule.patient_name = Some(patient.name.clone());
    source.mutate(owner, Mutation::Insert(schedule.clone())).await.unwrap();
    (patient, schedule)
}

fn count_of(entries: &[ActivityLogEntry], event_type: EventType) -> usize {
    entries.iter().filter(|e| e.event_type == event_type).count()
}

#[tokio::test]
async fn test_open_loads_rows_then_follows_feed() {
    let config = fast_config();
    let source = SqliteSource::open_in_memory(&config).unwrap();
    let owner = OwnerId::new();
    let (patient, _) = seed(&source, owner, 30).await;

    let mut patients: SyncedCollection<_, Patient> =
        SyncedCollection::open(&source, owner, &config).await.unwrap();
    assert_eq!(patients.status(), CollectionStatus::Live);
    assert_eq!(patients.items(), &[patient.clone()]);

    let added = Patient::new(owner, "Alan Brown", 77);
    source.mutate(owner, Mutation::Insert(added.clone())).await.unwrap();
    let event = patients.next_change().await.unwrap();
    assert_eq!(event.id(), Some(added.id));

    // Sorted by name
    let names: Vec<_> = patients.items().iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["Alan Brown", "Mary Smith"]);

    // Another owner's rows never reach this mirror
    let stranger = OwnerId::new();
    source
        .mutate(stranger, Mutation::Insert(Patient::new(stranger, "Zoe", 60)))
        .await
        .unwrap();
    assert_eq!(patients.pump().unwrap(), 0);
    assert_eq!(patients.items().len(), 2);
}

#[tokio::test]
async fn test_mark_taken_updates_stock_and_logs() {
    let config = fast_config();
    let source = SqliteSource::open_in_memory(&config).unwrap();
    let owner = OwnerId::new();
    let (_, schedule) = seed(&source, owner, 15).await;
    let notifier = RecordingNotifier::default();

    let mut schedules: SyncedCollection<_, MedicationSchedule> =
        SyncedCollection::open(&source, owner, &config).await.unwrap();
    let mut activity: SyncedCollection<_, ActivityLogEntry> =
        SyncedCollection::open(&source, owner, &config).await.unwrap();
    let mut mutator = OptimisticMutator::new(&config, &notifier, &notifier);

    let taken = mutator.mark_taken(&mut schedules, schedule.id, Utc::now()).await.unwrap();
    assert_eq!(taken.status, ScheduleStatus::Taken);
    assert_eq!(taken.current_stock, 14);
    assert!(taken.last_taken.is_some());

    // The feed echo of our own write is a no-op
    schedules.pump().unwrap();
    assert_eq!(schedules.items().len(), 1);
    assert_eq!(schedules.get(schedule.id).map(|s| s.current_stock), Some(14));

    activity.pump().unwrap();
    assert_eq!(activity.items().len(), 1);
    let entry = &activity.items()[0];
    assert_eq!(entry.event_type, EventType::MedicationDispensed);
    assert_eq!(entry.patient_id, Some(schedule.patient_id));
    assert_eq!(entry.stock_level, Some(14));

    assert_eq!(
        notifier.notifications(),
        vec![(
            "Medication Taken".to_string(),
            "Metformin for Mary Smith has been marked as taken".to_string()
        )]
    );

    // Marking taken twice is an invalid transition, reported inline
    let again = mutator.mark_taken(&mut schedules, schedule.id, Utc::now()).await;
    assert!(matches!(again, Err(SyncError::InvalidTransition(_))));
    assert_eq!(notifier.errors().len(), 1);
}

#[tokio::test]
async fn test_low_stock_alert_fires_once_until_restock() {
    let config = fast_config();
    let source = SqliteSource::open_in_memory(&config).unwrap();
    let owner = OwnerId::new();
    let (_, schedule) = seed(&source, owner, 11).await;
    let notifier = RecordingNotifier::default();

    let mut schedules: SyncedCollection<_, MedicationSchedule> =
        SyncedCollection::open(&source, owner, &config).await.unwrap();
    let mut activity: SyncedCollection<_, ActivityLogEntry> =
        SyncedCollection::open(&source, owner, &config).await.unwrap();
    let mut mutator = OptimisticMutator::new(&config, &notifier, &notifier);

    mutator.mark_taken(&mut schedules, schedule.id, Utc::now()).await.unwrap();
    assert!(!mutator.alert_armed(schedule.id, StockTier::Low));

    // Bounce across the threshold again
    mutator.mark_untaken(&mut schedules, schedule.id, Utc::now()).await.unwrap();
    mutator.mark_taken(&mut schedules, schedule.id, Utc::now()).await.unwrap();

    activity.pump().unwrap();
    assert_eq!(count_of(activity.items(), EventType::LowStockAlert), 1);
    assert_eq!(count_of(activity.items(), EventType::MedicationDispensed), 2);
    let alerts = notifier
        .notifications()
        .into_iter()
        .filter(|(title, _)| title == "Low Stock Alert")
        .count();
    assert_eq!(alerts, 1);

    mutator.restock(&mut schedules, schedule.id, 30, Utc::now()).await.unwrap();
    assert!(mutator.alert_armed(schedule.id, StockTier::Low));
    assert_eq!(schedules.get(schedule.id).map(|s| s.current_stock), Some(30));
}

#[tokio::test]
async fn test_failed_write_rolls_back() {
    let config = fast_config();
    let source = SqliteSource::open_in_memory(&config).unwrap();
    let owner = OwnerId::new();
    let (_, schedule) = seed(&source, owner, 20).await;
    let notifier = RecordingNotifier::default();

    let mut schedules: SyncedCollection<_, MedicationSchedule> =
        SyncedCollection::open(&source, owner, &config).await.unwrap();
    let mut mutator = OptimisticMutator::new(&config, &notifier, &notifier);
    let before = schedules.items().to_vec();

    source.set_online(false);
    let result = mutator.mark_taken(&mut schedules, schedule.id, Utc::now()).await;
    assert!(matches!(result, Err(SyncError::SourceUnavailable(_))));
    assert_eq!(schedules.items(), before.as_slice());
    assert_eq!(notifier.errors().len(), 1);
    assert!(notifier.notifications().is_empty());

    source.set_online(true);
    let stored: Vec<MedicationSchedule> = source
        .fetch_all(owner, OrderBy::asc("medication_name"))
        .await
        .unwrap();
    assert_eq!(stored[0].current_stock, 20);
}

#[tokio::test]
async fn test_mark_missed_logs_missed_dose() {
    let config = fast_config();
    let source = SqliteSource::open_in_memory(&config).unwrap();
    let owner = OwnerId::new();
    let (_, schedule) = seed(&source, owner, 20).await;
    let notifier = RecordingNotifier::default();

    let mut schedules: SyncedCollection<_, MedicationSchedule> =
        SyncedCollection::open(&source, owner, &config).await.unwrap();
    let mut activity: SyncedCollection<_, ActivityLogEntry> =
        SyncedCollection::open(&source, owner, &config).await.unwrap();
    let mut mutator = OptimisticMutator::new(&config, &notifier, &notifier);

    let missed = mutator.mark_missed(&mut schedules, schedule.id, Utc::now()).await.unwrap();
    assert_eq!(missed.status, ScheduleStatus::Missed);
    assert_eq!(missed.current_stock, 20);
    assert_eq!(missed.last_taken, None);

    schedules.pump().unwrap();
    assert_eq!(schedules.get(schedule.id).map(|s| s.status), Some(ScheduleStatus::Missed));

    activity.pump().unwrap();
    assert_eq!(activity.items().len(), 1);
    let entry = &activity.items()[0];
    assert_eq!(entry.event_type, EventType::MedicationMissed);
    assert_eq!(entry.description, "Missed dose of Metformin 500mg");
    assert_eq!(entry.patient_id, Some(schedule.patient_id));

    // A missed dose cannot be taken or missed again
    let taken = mutator.mark_taken(&mut schedules, schedule.id, Utc::now()).await;
    assert!(matches!(taken, Err(SyncError::InvalidTransition(_))));
    let again = mutator.mark_missed(&mut schedules, schedule.id, Utc::now()).await;
    assert!(matches!(again, Err(SyncError::InvalidTransition(_))));
    activity.pump().unwrap();
    assert_eq!(activity.items().len(), 1);
}

#[tokio::test]
async fn test_create_and_update_write_through() {
    let config = fast_config();
    let source = SqliteSource::open_in_memory(&config).unwrap();
    let owner = OwnerId::new();
    let (patient, _) = seed(&source, owner, 20).await;
    let notifier = RecordingNotifier::default();

    let mut patients: SyncedCollection<_, Patient> =
        SyncedCollection::open(&source, owner, &config).await.unwrap();
    let mut mutator = OptimisticMutator::new(&config, &notifier, &notifier);

    let added = mutator
        .create(&mut patients, Patient::new(owner, "Alan Brown", 77))
        .await
        .unwrap();
    assert_eq!(patients.items().len(), 2);

    let mut renamed = patient.clone();
    renamed.name = "Mary Smith-Jones".into();
    mutator.update(&mut patients, renamed).await.unwrap();
    patients.pump().unwrap();
    assert_eq!(patients.items().len(), 2);
    assert_eq!(
        patients.get(patient.id).map(|p| p.name.as_str()),
        Some("Mary Smith-Jones")
    );

    let stored: Vec<Patient> = source.fetch_all(owner, OrderBy::asc("name")).await.unwrap();
    let names: Vec<_> = stored.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["Alan Brown", "Mary Smith-Jones"]);
    assert!(stored.iter().any(|p| p.id == added.id));
    assert!(notifier.errors().is_empty());
}

#[tokio::test]
async fn test_rejected_update_rolls_back() {
    let config = fast_config();
    let source = SqliteSource::open_in_memory(&config).unwrap();
    let owner = OwnerId::new();
    let (_, schedule) = seed(&source, owner, 20).await;
    let notifier = RecordingNotifier::default();

    // Another caregiver's patient
    let stranger = OwnerId::new();
    let (their_patient, _) = seed(&source, stranger, 5).await;

    let mut schedules: SyncedCollection<_, MedicationSchedule> =
        SyncedCollection::open(&source, owner, &config).await.unwrap();
    let mut mutator = OptimisticMutator::new(&config, &notifier, &notifier);
    let before = schedules.items().to_vec();

    let mut moved = schedule.clone();
    moved.patient_id = their_patient.id;
    moved.current_stock = 99;
    let result = mutator.update(&mut schedules, moved).await;
    assert!(matches!(result, Err(SyncError::WriteRejected(_))));
    assert_eq!(schedules.items(), before.as_slice());
    assert_eq!(notifier.errors().len(), 1);

    // Deleted underneath us: the edit is rejected and undone as well
    RemoteSource::<MedicationSchedule>::mutate(&source, owner, Mutation::Delete(schedule.id))
        .await
        .unwrap();
    let mut edited = schedule.clone();
    edited.dosage = "850mg".into();
    let result = mutator.update(&mut schedules, edited).await;
    assert!(matches!(result, Err(SyncError::WriteRejected(_))));
    assert_eq!(schedules.items(), before.as_slice());
    assert_eq!(notifier.errors().len(), 2);

    let stored: Vec<MedicationSchedule> = source
        .fetch_all(stranger, OrderBy::asc("medication_name"))
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].patient_id, their_patient.id);
}

#[tokio::test]
async fn test_delete_needs_confirmation() {
    let config = fast_config();
    let source = SqliteSource::open_in_memory(&config).unwrap();
    let owner = OwnerId::new();
    let (_, schedule) = seed(&source, owner, 20).await;
    let notifier = RecordingNotifier::default();

    let mut schedules: SyncedCollection<_, MedicationSchedule> =
        SyncedCollection::open(&source, owner, &config).await.unwrap();
    let mut mutator = OptimisticMutator::new(&config, &notifier, &notifier);

    let pending = mutator.request_delete(&schedules, schedule.id).unwrap();
    assert_eq!(
        pending.prompt(),
        "Are you sure you want to delete the Metformin for Mary Smith schedule?"
    );
    assert!(schedules.get(schedule.id).is_some());

    mutator.confirm_delete(&mut schedules, pending).await.unwrap();
    assert!(schedules.items().is_empty());
    schedules.pump().unwrap();
    assert!(schedules.items().is_empty());

    let missing = mutator.request_delete(&schedules, Uuid::new_v4());
    assert!(matches!(missing, Err(SyncError::NotFound(_))));
}

#[tokio::test]
async fn test_confirm_after_remote_delete_is_rejected() {
    let config = fast_config();
    let source = SqliteSource::open_in_memory(&config).unwrap();
    let owner = OwnerId::new();
    let (_, schedule) = seed(&source, owner, 20).await;
    let notifier = RecordingNotifier::default();

    let mut schedules: SyncedCollection<_, MedicationSchedule> =
        SyncedCollection::open(&source, owner, &config).await.unwrap();
    let mut mutator = OptimisticMutator::new(&config, &notifier, &notifier);
    let pending = mutator.request_delete(&schedules, schedule.id).unwrap();

    // Another client removes the row first
    RemoteSource::<MedicationSchedule>::mutate(&source, owner, Mutation::Delete(schedule.id))
        .await
        .unwrap();
    schedules.pump().unwrap();

    let result = mutator.confirm_delete(&mut schedules, pending).await;
    assert!(matches!(result, Err(SyncError::WriteRejected(_))));
    assert!(schedules.items().is_empty());
}

#[tokio::test]
async fn test_close_ignores_events_and_releases_feed() {
    let config = fast_config();
    let source = SqliteSource::open_in_memory(&config).unwrap();
    let owner = OwnerId::new();
    let (patient, _) = seed(&source, owner, 20).await;
    let notifier = RecordingNotifier::default();

    let mut patients: SyncedCollection<_, Patient> =
        SyncedCollection::open(&source, owner, &config).await.unwrap();
    assert_eq!(source.active_subscriptions_for(Table::Patients), 1);

    patients.close();
    patients.close();
    assert!(patients.is_closed());
    assert_eq!(source.active_subscriptions_for(Table::Patients), 0);

    assert!(!patients.apply(&ChangeEvent::insert(Patient::new(owner, "Late", 50))));
    assert_eq!(patients.pump().unwrap(), 0);
    assert!(matches!(patients.next_change().await, Err(SyncError::Closed)));
    assert!(matches!(patients.refresh().await, Err(SyncError::Closed)));
    assert_eq!(patients.items(), &[patient]);

    let mut mutator = OptimisticMutator::new(&config, &notifier, &notifier);
    let result = mutator.create(&mut patients, Patient::new(owner, "New", 40)).await;
    assert!(matches!(result, Err(SyncError::Closed)));

    {
        let _schedules: SyncedCollection<_, MedicationSchedule> =
            SyncedCollection::open(&source, owner, &config).await.unwrap();
        assert_eq!(source.active_subscriptions(), 1);
    }
    assert_eq!(source.active_subscriptions(), 0);
}

#[tokio::test]
async fn test_recover_after_dropped_feed() {
    let config = fast_config();
    let source = SqliteSource::open_in_memory(&config).unwrap();
    let owner = OwnerId::new();
    seed(&source, owner, 20).await;

    let mut patients: SyncedCollection<_, Patient> =
        SyncedCollection::open(&source, owner, &config).await.unwrap();

    source.drop_feeds();
    assert_eq!(patients.pump(), Err(SyncError::SubscriptionDropped));
    assert_eq!(patients.status(), CollectionStatus::Stale);
    assert_eq!(patients.items().len(), 1);

    // Written while the feed was down; only the re-read can see it
    let missed = Patient::new(owner, "Alan Brown", 77);
    source.mutate(owner, Mutation::Insert(missed.clone())).await.unwrap();

    patients.recover().await.unwrap();
    assert_eq!(patients.status(), CollectionStatus::Live);
    assert!(patients.get(missed.id).is_some());

    let later = Patient::new(owner, "Carl Diaz", 70);
    source.mutate(owner, Mutation::Insert(later.clone())).await.unwrap();
    assert_eq!(patients.pump().unwrap(), 1);
    assert_eq!(patients.items().len(), 3);
}

#[tokio::test]
async fn test_recover_gives_up_while_offline() {
    let config = fast_config();
    let source = SqliteSource::open_in_memory(&config).unwrap();
    let owner = OwnerId::new();
    seed(&source, owner, 20).await;

    let mut patients: SyncedCollection<_, Patient> =
        SyncedCollection::open(&source, owner, &config).await.unwrap();
    source.drop_feeds();
    source.set_online(false);

    let result = patients.recover().await;
    assert!(matches!(result, Err(SyncError::SourceUnavailable(_))));
    assert_eq!(patients.status(), CollectionStatus::Stale);
    assert_eq!(patients.items().len(), 1);
}

#[tokio::test]
async fn test_patient_delete_cascades_to_views() {
    let config = fast_config();
    let source = SqliteSource::open_in_memory(&config).unwrap();
    let owner = OwnerId::new();
    let (patient, schedule) = seed(&source, owner, 20).await;
    source
        .mutate(owner, Mutation::Insert(ActivityLogEntry::dispensed(&schedule)))
        .await
        .unwrap();
    let notifier = RecordingNotifier::default();

    let mut patients: SyncedCollection<_, Patient> =
        SyncedCollection::open(&source, owner, &config).await.unwrap();
    let mut schedules: SyncedCollection<_, MedicationSchedule> =
        SyncedCollection::open(&source, owner, &config).await.unwrap();
    let mut activity: SyncedCollection<_, ActivityLogEntry> =
        SyncedCollection::open(&source, owner, &config).await.unwrap();
    assert_eq!(schedules.items().len(), 1);
    assert_eq!(activity.items().len(), 1);

    let mut mutator = OptimisticMutator::new(&config, &notifier, &notifier);
    let pending = mutator.request_delete(&patients, patient.id).unwrap();
    assert!(pending.prompt().starts_with("Delete Mary Smith?"));
    mutator.confirm_delete(&mut patients, pending).await.unwrap();

    assert!(patients.items().is_empty());
    assert_eq!(schedules.pump().unwrap(), 1);
    assert_eq!(activity.pump().unwrap(), 1);
    assert!(schedules.items().is_empty());
    assert!(activity.items().is_empty());
}
