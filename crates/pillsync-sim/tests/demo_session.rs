//! End-to-end demo run against a file-backed store.

use chrono::{Local, Utc};
use pillsync_core::export::{activity_csv, ACTIVITY_HEADER};
use pillsync_core::models::{ActivityLogEntry, EventType, MedicationSchedule, OwnerId};
use pillsync_core::notify::RecordingNotifier;
use pillsync_core::project::{ActivityFilter, ActivityStats, ScheduleFilter, StockFilter};
use pillsync_core::sync::{OptimisticMutator, SyncedCollection};
use pillsync_core::{SqliteSource, SyncConfig};
use pillsync_sim::{seed_demo_data, DeviceSimulator};

#[tokio::test]
async fn test_device_events_flow_into_views_and_export() {
    let dir = tempfile::tempdir().unwrap();
    let config = SyncConfig::default();
    let source = SqliteSource::open(dir.path().join("pillsync.db"), &config).unwrap();
    let owner = OwnerId::new();
    let demo = seed_demo_data(&source, owner).await.unwrap();
    let ibuprofen = demo.schedules[3].id;

    let notifier = RecordingNotifier::default();
    let mut schedules: SyncedCollection<_, MedicationSchedule> =
        SyncedCollection::open(&source, owner, &config).await.unwrap();
    let mut activity: SyncedCollection<_, ActivityLogEntry> =
        SyncedCollection::open(&source, owner, &config).await.unwrap();
    let mut mutator = OptimisticMutator::new(&config, &notifier, &notifier);
    let sim = DeviceSimulator::new(&source, owner, &config);

    // 6 pills, one dispensed: critical
    sim.dispense(ibuprofen, Some(demo.devices[1].id), Utc::now())
        .await
        .unwrap();
    mutator
        .mark_taken(&mut schedules, demo.schedules[0].id, Utc::now())
        .await
        .unwrap();
    schedules.pump().unwrap();
    activity.pump().unwrap();

    let critical = ScheduleFilter {
        stock: Some(StockFilter::Critical),
        ..Default::default()
    };
    let view = critical.apply(schedules.items(), &config.stock);
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].id, ibuprofen);
    assert_eq!(view[0].current_stock, 5);

    let stats = ActivityStats::compute(activity.items());
    assert_eq!(stats.dispensed, 2);
    assert_eq!(stats.low_stock_alerts, 1);

    let alerts = ActivityFilter {
        event_type: Some(EventType::LowStockAlert),
        ..Default::default()
    };
    let now = Local::now();
    let rows = alerts.apply(activity.items(), &now);
    assert_eq!(rows.len(), 1);
    assert!(rows[0].description.starts_with("Critical stock: Ibuprofen"));

    let file = activity_csv(rows, &now);
    let path = file.write_to(dir.path()).unwrap();
    let written = std::fs::read_to_string(path).unwrap();
    assert_eq!(written.lines().next(), Some(ACTIVITY_HEADER.join(",").as_str()));
    assert_eq!(written.lines().count(), 2);
}
