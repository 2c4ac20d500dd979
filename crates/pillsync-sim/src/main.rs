//! Scripted demo: one caregiver, two live collections, dispensers reporting
//! in the background, and a CSV export at the end.
//!
//! Usage: `pillsync-sim [OUTPUT_DIR]`. Set `PILLSYNC_CONFIG` to a JSON file
//! to override the default configuration and `RUST_LOG` to adjust logging.

use std::path::PathBuf;

use anyhow::Context;
use chrono::{Local, Utc};
use pillsync_core::auth::{handle_sync_error, AuthProvider};
use pillsync_core::export::{activity_csv, schedule_csv};
use pillsync_core::models::{
    ActivityLogEntry, ConnectivityStatus, Device, Entity, MedicationSchedule, Patient,
};
use pillsync_core::notify::RecordingNotifier;
use pillsync_core::project::{newest_first, DashboardMetrics, ScheduleStats};
use pillsync_core::sync::{OptimisticMutator, RemoteSource, SyncedCollection};
use pillsync_core::{SqliteSource, SyncConfig};
use pillsync_sim::{seed_demo_data, DeviceSimulator, StaticAuth, DEMO_EMAIL, DEMO_PASSWORD};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let out_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let config = match std::env::var("PILLSYNC_CONFIG") {
        Ok(path) => SyncConfig::load(&path).with_context(|| format!("loading config from {}", path))?,
        Err(_) => SyncConfig::default(),
    };

    let auth = StaticAuth::demo();
    let session = auth.sign_in(DEMO_EMAIL, DEMO_PASSWORD).await?;
    let owner = session.owner_id;
    info!(user = %session.display_name(), role = session.role(), "Demo session started");

    let source = SqliteSource::open_in_memory(&config)?;
    let demo = seed_demo_data(&source, owner).await?;
    let [lisinopril, metformin, atorvastatin, ibuprofen] = [0, 1, 2, 3].map(|i| demo.schedules[i].id);
    let (kitchen, bedroom) = (demo.devices[0].id, demo.devices[1].id);

    let notifier = RecordingNotifier::default();
    let mut schedules: SyncedCollection<_, MedicationSchedule> =
        SyncedCollection::open(&source, owner, &config).await?;
    let mut activity: SyncedCollection<_, ActivityLogEntry> =
        SyncedCollection::open(&source, owner, &config).await?;
    let mut mutator = OptimisticMutator::new(&config, &notifier, &notifier);
    let sim = DeviceSimulator::new(&source, owner, &config);

    // Caregiver confirms a dose from the app
    mutator.mark_taken(&mut schedules, lisinopril, Utc::now()).await?;

    // Dispensers report on their own
    sim.dispense(metformin, Some(kitchen), Utc::now()).await?;
    sim.dispense(ibuprofen, Some(bedroom), Utc::now()).await?;
    sim.report_missed(atorvastatin, Some(bedroom), Utc::now()).await?;
    sim.set_device_status(bedroom, ConnectivityStatus::Offline, Utc::now()).await?;
    sim.heartbeat(kitchen, Utc::now()).await?;

    let applied = schedules.pump()? + activity.pump()?;
    info!(applied, "Applied remote changes");

    // A write while the backend is unreachable is rolled back
    source.set_online(false);
    if let Err(e) = mutator.mark_untaken(&mut schedules, lisinopril, Utc::now()).await {
        let recovery = handle_sync_error(&auth, &e).await;
        warn!(error = %e, ?recovery, "Write failed while offline");
    }
    source.set_online(true);

    // Feeds drop; the bedroom dispenser comes back while nobody is listening
    source.drop_feeds();
    sim.set_device_status(bedroom, ConnectivityStatus::Online, Utc::now()).await?;
    if let Err(e) = schedules.pump() {
        warn!(error = %e, "Schedule feed lost");
        schedules.recover().await?;
    }
    if let Err(e) = activity.pump() {
        warn!(error = %e, "Activity feed lost");
        activity.recover().await?;
    }

    let patients: Vec<Patient> = source.fetch_all(owner, Patient::default_order()).await?;
    let devices: Vec<Device> = source.fetch_all(owner, Device::default_order()).await?;
    let now = Local::now();

    let dashboard = DashboardMetrics::compute(
        &patients,
        schedules.items(),
        activity.items(),
        &devices,
        &config,
        &now,
    );
    info!(
        patients = dashboard.total_patients,
        schedules = dashboard.total_schedules,
        dispensed_today = dashboard.dispensed_today,
        low_stock = dashboard.low_stock_alerts,
        devices_online = dashboard.devices_online,
        devices_offline = dashboard.devices_offline,
        "Dashboard"
    );
    for entry in &dashboard.recent_activity {
        info!(event_type = %entry.event_type, status = %entry.status, "{}", entry.description);
    }

    let stats = ScheduleStats::compute(schedules.items(), &config.stock);
    info!(
        pending = stats.pending,
        taken = stats.taken,
        missed = stats.missed,
        low_stock = stats.low_stock,
        critical_stock = stats.critical_stock,
        "Schedule summary"
    );

    for (title, body) in notifier.notifications() {
        info!(%title, %body, "Notification");
    }

    let mut feed: Vec<&ActivityLogEntry> = activity.items().iter().collect();
    newest_first(&mut feed);
    for file in [
        activity_csv(feed, &now),
        schedule_csv(schedules.items(), &patients, &now),
    ] {
        let path = file.write_to(&out_dir)?;
        info!(path = %path.display(), sha256 = %file.sha256, "Wrote export");
    }

    schedules.close();
    activity.close();
    auth.sign_out().await?;
    Ok(())
}
