//! PillSync Core Library
//!
//! Live, owner-scoped synchronized collections for a caregiver medication
//! tracker: patients, medication schedules, dispenser devices and the
//! activity log.
//!
//! # Architecture
//!
//! ```text
//!   Remote Source ──bulk read──▶ Local Mirror ◀──reducer── change feed
//!        ▲                            │
//!        │                            ▼
//!   Optimistic Mutator          View Projector ──▶ views, stats, CSV
//!   (apply, write, reconcile
//!    or roll back)
//! ```
//!
//! A page opens one [`SyncedCollection`] per table it shows. The collection
//! reads everything the owner can see, then applies each change event
//! through the reducer. Events are idempotent by id, so duplicate or
//! out-of-order delivery converges.
//!
//! # Modules
//!
//! - [`sync`]: change events, reducer, mirror, collections, mutator
//! - [`project`]: filters, date buckets, sorting, aggregates
//! - [`source`]: SQLite-backed reference remote source
//! - [`db`]: SQLite tables and row mapping
//! - [`models`]: Domain types (Patient, MedicationSchedule, Device, etc.)
//! - [`export`]: CSV export of filtered views
//! - [`auth`], [`notify`]: host collaborators
//! - [`config`]: thresholds and sync tuning

pub mod auth;
pub mod config;
pub mod db;
pub mod export;
pub mod models;
pub mod notify;
pub mod project;
pub mod source;
pub mod sync;

// Re-export commonly used types
pub use config::SyncConfig;
pub use db::Database;
pub use models::{
    ActivityLogEntry, Device, Entity, MedicationSchedule, OwnerId, Patient, ScheduleStatus,
    StockTier,
};
pub use source::SqliteSource;
pub use sync::{
    ChangeEvent, LocalMirror, OptimisticMutator, RemoteSource, SyncError, SyncedCollection,
};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use project::{
    ActivityFilter, ActivityStats, DashboardMetrics, PatientFilter, PatientMetrics, PatientSort,
    ScheduleFilter, ScheduleSort, ScheduleStats,
};
use sync::{RawChangeEvent, TableEvent};

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum PillSyncError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Malformed change event: {0}")]
    MalformedEvent(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid status change: {0}")]
    InvalidTransition(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Session is closed")]
    Closed,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for PillSyncError {
    fn from(e: serde_json::Error) -> Self {
        PillSyncError::SerializationError(e.to_string())
    }
}

impl From<sync::EventError> for PillSyncError {
    fn from(e: sync::EventError) -> Self {
        PillSyncError::MalformedEvent(e.to_string())
    }
}

impl From<config::ConfigError> for PillSyncError {
    fn from(e: config::ConfigError) -> Self {
        PillSyncError::ConfigError(e.to_string())
    }
}

impl From<models::TransitionError> for PillSyncError {
    fn from(e: models::TransitionError) -> Self {
        PillSyncError::InvalidTransition(e.to_string())
    }
}

impl From<models::ParseEnumError> for PillSyncError {
    fn from(e: models::ParseEnumError) -> Self {
        PillSyncError::InvalidInput(e.to_string())
    }
}

impl From<uuid::Error> for PillSyncError {
    fn from(e: uuid::Error) -> Self {
        PillSyncError::InvalidInput(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for PillSyncError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        PillSyncError::Internal(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open a session for the signed-in owner with default configuration.
#[uniffi::export]
pub fn open_session(owner_id: String) -> Result<Arc<PillSyncCore>, PillSyncError> {
    open_session_with_config(owner_id, "{}".to_string())
}

/// Open a session with a JSON configuration (missing fields take defaults).
#[uniffi::export]
pub fn open_session_with_config(
    owner_id: String,
    config_json: String,
) -> Result<Arc<PillSyncCore>, PillSyncError> {
    let owner: OwnerId = owner_id.parse()?;
    let config = SyncConfig::from_json_str(&config_json)?;
    info!(owner = %owner, "Opened session");
    Ok(Arc::new(PillSyncCore {
        state: Arc::new(Mutex::new(SessionState::new(owner, config))),
    }))
}

// =========================================================================
// Main API Object
// =========================================================================

/// The four mirrors of one signed-in session. The host performs reads,
/// writes and subscriptions, and feeds rows and change payloads in here.
struct SessionState {
    owner: OwnerId,
    config: SyncConfig,
    patients: LocalMirror<Patient>,
    schedules: LocalMirror<MedicationSchedule>,
    activities: LocalMirror<ActivityLogEntry>,
    devices: LocalMirror<Device>,
    /// Stock alerts handed out in a patch, until a restock re-arms them
    fired_alerts: HashSet<(Uuid, StockTier)>,
    closed: bool,
}

impl SessionState {
    fn new(owner: OwnerId, config: SyncConfig) -> Self {
        Self {
            owner,
            config,
            patients: LocalMirror::new(),
            schedules: LocalMirror::new(),
            activities: LocalMirror::new(),
            devices: LocalMirror::new(),
            fired_alerts: HashSet::new(),
            closed: false,
        }
    }

    fn schedule(&self, id: &str) -> Result<&MedicationSchedule, PillSyncError> {
        let id = Uuid::parse_str(id)?;
        self.schedules
            .get(id)
            .ok_or_else(|| PillSyncError::NotFound(format!("schedule {}", id)))
    }

    /// A schedule update that raises stock above the low band without a
    /// status change is a refill. Untaking changes the status, so it never
    /// re-arms.
    fn restocked(&self, event: &ChangeEvent<MedicationSchedule>) -> Option<Uuid> {
        let ChangeEvent::Update { entity, .. } = event else {
            return None;
        };
        let before = self.schedules.get(entity.id)?;
        let refilled = before.status == entity.status
            && entity.current_stock > before.current_stock
            && !self.config.stock.is_low(entity.current_stock);
        refilled.then_some(entity.id)
    }

    fn open(&self) -> Result<(), PillSyncError> {
        if self.closed {
            Err(PillSyncError::Closed)
        } else {
            Ok(())
        }
    }
}

/// Thread-safe session wrapper for FFI.
#[derive(uniffi::Object)]
pub struct PillSyncCore {
    state: Arc<Mutex<SessionState>>,
}

#[uniffi::export]
impl PillSyncCore {
    // =========================================================================
    // Feed Operations
    // =========================================================================

    /// Replace a table's mirror with the result of a bulk read (a JSON
    /// array of rows). Rows of other owners are dropped.
    pub fn load_rows(&self, table: String, rows_json: String) -> Result<u32, PillSyncError> {
        let mut state = self.state.lock()?;
        state.open()?;
        let owner = state.owner;
        let loaded = match table.parse::<models::Table>()? {
            models::Table::Patients => load(&mut state.patients, owner, &rows_json)?,
            models::Table::MedicationSchedules => load(&mut state.schedules, owner, &rows_json)?,
            models::Table::ActivityLog => load(&mut state.activities, owner, &rows_json)?,
            models::Table::Devices => load(&mut state.devices, owner, &rows_json)?,
        };
        Ok(loaded as u32)
    }

    /// Apply one raw change payload. Returns whether a mirror changed.
    /// A closed session ignores every event.
    pub fn apply_change(&self, payload_json: String) -> Result<bool, PillSyncError> {
        let mut state = self.state.lock()?;
        if state.closed {
            debug!("Ignoring change on closed session");
            return Ok(false);
        }
        let raw = RawChangeEvent::from_json(&payload_json)?;
        if !raw.concerns(state.owner) {
            debug!(table = %raw.table, "Ignoring change for another owner");
            return Ok(false);
        }

        let owner = state.owner;
        let changed = match TableEvent::decode(&raw)? {
            TableEvent::Patients(event) => apply(&mut state.patients, event, owner),
            TableEvent::Schedules(event) => {
                let restocked = state.restocked(&event);
                let changed = apply(&mut state.schedules, event, owner);
                if let (true, Some(id)) = (changed, restocked) {
                    state.fired_alerts.retain(|(schedule, _)| *schedule != id);
                    debug!(id = %id, "Stock alerts re-armed");
                }
                changed
            }
            TableEvent::Activities(event) => apply(&mut state.activities, event, owner),
            TableEvent::Devices(event) => apply(&mut state.devices, event, owner),
        };
        Ok(changed)
    }

    /// Stop accepting events. Idempotent.
    pub fn close(&self) -> Result<(), PillSyncError> {
        let mut state = self.state.lock()?;
        if !state.closed {
            state.closed = true;
            info!(owner = %state.owner, "Closed session");
        }
        Ok(())
    }

    pub fn is_closed(&self) -> Result<bool, PillSyncError> {
        Ok(self.state.lock()?.closed)
    }

    // =========================================================================
    // Views
    // =========================================================================

    pub fn patients(&self, filter: FfiPatientFilter) -> Result<Vec<FfiPatient>, PillSyncError> {
        let state = self.state.lock()?;
        let sort = parse_opt::<PatientSort>(&filter.sort)?.unwrap_or_default();
        let filter = PatientFilter {
            search: filter.search,
            condition: filter.condition,
            compliance: parse_opt(&filter.compliance)?,
        };

        let mut view = filter.apply(
            state.patients.items(),
            state.schedules.items(),
            state.activities.items(),
            &state.config.compliance,
        );
        sort.sort(&mut view);

        Ok(view
            .into_iter()
            .map(|p| {
                let metrics = PatientMetrics::compute(p.id, state.schedules.items(), state.activities.items());
                FfiPatient::new(p, &metrics, &state.config)
            })
            .collect())
    }

    pub fn schedules(&self, filter: FfiScheduleFilter) -> Result<Vec<FfiSchedule>, PillSyncError> {
        let state = self.state.lock()?;
        let sort = parse_opt::<ScheduleSort>(&filter.sort)?.unwrap_or_default();
        let filter = schedule_filter(filter)?;

        let mut view = filter.apply(state.schedules.items(), &state.config.stock);
        sort.sort(&mut view);
        Ok(view
            .into_iter()
            .map(|s| FfiSchedule::new(s, &state))
            .collect())
    }

    pub fn activities(&self, filter: FfiActivityFilter) -> Result<Vec<FfiActivity>, PillSyncError> {
        let state = self.state.lock()?;
        let now = Local::now();
        let mut view = activity_filter(filter)?.apply(state.activities.items(), &now);
        project::newest_first(&mut view);
        Ok(view.into_iter().map(FfiActivity::from).collect())
    }

    pub fn devices(&self) -> Result<Vec<FfiDevice>, PillSyncError> {
        let state = self.state.lock()?;
        let now = Local::now();
        Ok(state
            .devices
            .items()
            .iter()
            .map(|d| FfiDevice::new(d, &now))
            .collect())
    }

    /// Confirmation text for deleting a row.
    pub fn delete_prompt(&self, table: String, id: String) -> Result<String, PillSyncError> {
        let state = self.state.lock()?;
        let id = Uuid::parse_str(&id)?;
        let prompt = match table.parse::<models::Table>()? {
            models::Table::Patients => state.patients.get(id).map(Entity::delete_prompt),
            models::Table::MedicationSchedules => state.schedules.get(id).map(Entity::delete_prompt),
            models::Table::ActivityLog => state.activities.get(id).map(Entity::delete_prompt),
            models::Table::Devices => state.devices.get(id).map(Entity::delete_prompt),
        };
        prompt.ok_or_else(|| PillSyncError::NotFound(format!("{} {}", table, id)))
    }

    // =========================================================================
    // Stats
    // =========================================================================

    pub fn schedule_stats(&self, filter: FfiScheduleFilter) -> Result<FfiScheduleStats, PillSyncError> {
        let state = self.state.lock()?;
        let view = schedule_filter(filter)?.apply(state.schedules.items(), &state.config.stock);
        Ok(ScheduleStats::compute(view, &state.config.stock).into())
    }

    pub fn activity_stats(&self, filter: FfiActivityFilter) -> Result<FfiActivityStats, PillSyncError> {
        let state = self.state.lock()?;
        let now = Local::now();
        let view = activity_filter(filter)?.apply(state.activities.items(), &now);
        Ok(ActivityStats::compute(view).into())
    }

    pub fn dashboard(&self) -> Result<FfiDashboard, PillSyncError> {
        let state = self.state.lock()?;
        let metrics = DashboardMetrics::compute(
            state.patients.items(),
            state.schedules.items(),
            state.activities.items(),
            state.devices.items(),
            &state.config,
            &Local::now(),
        );
        Ok(metrics.into())
    }

    // =========================================================================
    // Status Transitions
    // =========================================================================

    /// Rows to write for `pending -> taken`: the updated schedule, the
    /// dispense entry and a stock alert if a threshold was crossed and that
    /// alert has not been handed out since the last refill. The mirror is
    /// left alone; it converges when the write comes back on the change feed.
    pub fn mark_taken_patch(&self, schedule_id: String) -> Result<FfiStatusPatch, PillSyncError> {
        let mut state = self.state.lock()?;
        state.open()?;
        let now = Utc::now();
        let before = state.schedule(&schedule_id)?;
        let after = before.mark_taken(now)?;
        let crossed = state
            .config
            .stock
            .crossed_into(before.current_stock, after.current_stock);

        let mut entries = vec![ActivityLogEntry::dispensed(&after).at(now)];
        if let Some(tier) = crossed {
            if state.fired_alerts.insert((after.id, tier)) {
                entries.push(ActivityLogEntry::stock_alert(&after, tier).at(now));
            } else {
                debug!(id = %after.id, tier = tier.as_str(), "Stock alert already raised");
            }
        }
        FfiStatusPatch::new(&after, &entries)
    }

    /// Row to write for a refill to `count` pills. Alerts re-arm once the
    /// refill comes back on the change feed.
    pub fn restock_patch(&self, schedule_id: String, count: u32) -> Result<FfiStatusPatch, PillSyncError> {
        let state = self.state.lock()?;
        state.open()?;
        let mut after = state.schedule(&schedule_id)?.clone();
        after.current_stock = count;
        after.updated_at = Utc::now();
        FfiStatusPatch::new(&after, &[])
    }

    /// Rows to write for `taken -> pending`. Never raises alerts.
    pub fn mark_untaken_patch(&self, schedule_id: String) -> Result<FfiStatusPatch, PillSyncError> {
        let state = self.state.lock()?;
        state.open()?;
        let after = state.schedule(&schedule_id)?.mark_untaken(Utc::now())?;
        FfiStatusPatch::new(&after, &[])
    }

    /// Rows to write for `pending -> missed`.
    pub fn mark_missed_patch(&self, schedule_id: String) -> Result<FfiStatusPatch, PillSyncError> {
        let state = self.state.lock()?;
        state.open()?;
        let now = Utc::now();
        let after = state.schedule(&schedule_id)?.mark_missed(now)?;
        FfiStatusPatch::new(&after, &[ActivityLogEntry::missed(&after).at(now)])
    }

    // =========================================================================
    // Export Operations
    // =========================================================================

    /// Export the filtered activity view as CSV.
    pub fn export_activity_csv(&self, filter: FfiActivityFilter) -> Result<FfiExportFile, PillSyncError> {
        let state = self.state.lock()?;
        let now = Local::now();
        let mut view = activity_filter(filter)?.apply(state.activities.items(), &now);
        project::newest_first(&mut view);
        Ok(export::activity_csv(view, &now).into())
    }

    /// Export the filtered schedule view as CSV.
    pub fn export_schedule_csv(&self, filter: FfiScheduleFilter) -> Result<FfiExportFile, PillSyncError> {
        let state = self.state.lock()?;
        let sort = parse_opt::<ScheduleSort>(&filter.sort)?.unwrap_or_default();
        let mut view = schedule_filter(filter)?.apply(state.schedules.items(), &state.config.stock);
        sort.sort(&mut view);
        Ok(export::schedule_csv(view, state.patients.items(), &Local::now()).into())
    }
}

fn load<E: Entity>(
    mirror: &mut LocalMirror<E>,
    owner: OwnerId,
    rows_json: &str,
) -> Result<usize, PillSyncError> {
    let rows: Vec<E> = serde_json::from_str(rows_json)?;
    let total = rows.len();
    let own: Vec<E> = rows.into_iter().filter(|r| r.owner_id() == owner).collect();
    if own.len() < total {
        warn!(table = %E::TABLE, owner = %owner, dropped = total - own.len(), "Dropped rows of another owner");
    }
    let loaded = own.len();
    mirror.replace_all(own);
    debug!(table = %E::TABLE, owner = %owner, rows = loaded, "Loaded rows");
    Ok(loaded)
}

fn apply<E: Entity>(mirror: &mut LocalMirror<E>, event: ChangeEvent<E>, owner: OwnerId) -> bool {
    match event.scoped_to(owner) {
        Some(event) => mirror.apply(&event),
        None => false,
    }
}

fn parse_opt<T>(value: &Option<String>) -> Result<Option<T>, PillSyncError>
where
    T: serde::de::DeserializeOwned,
{
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .map(|v| {
            serde_json::from_value(serde_json::Value::String(v.to_string()))
                .map_err(|_| PillSyncError::InvalidInput(format!("unknown option {:?}", v)))
        })
        .transpose()
}

fn schedule_filter(filter: FfiScheduleFilter) -> Result<ScheduleFilter, PillSyncError> {
    Ok(ScheduleFilter {
        search: filter.search,
        patient_id: filter.patient_id.as_deref().map(Uuid::parse_str).transpose()?,
        status: parse_opt(&filter.status)?,
        stock: parse_opt(&filter.stock)?,
    })
}

fn activity_filter(filter: FfiActivityFilter) -> Result<ActivityFilter, PillSyncError> {
    Ok(ActivityFilter {
        search: filter.search,
        event_type: parse_opt(&filter.event_type)?,
        status: parse_opt(&filter.status)?,
        date_range: parse_opt(&filter.date_range)?,
    })
}

fn timestamp(time: &DateTime<Utc>) -> String {
    time.to_rfc3339()
}

// =========================================================================
// FFI Types
// =========================================================================

/// Patients view filter. Empty strings and `None` mean "any".
#[derive(Debug, Clone, Default, uniffi::Record)]
pub struct FfiPatientFilter {
    pub search: Option<String>,
    pub condition: Option<String>,
    /// excellent | good | needs-attention
    pub compliance: Option<String>,
    /// name | age | newest
    pub sort: Option<String>,
}

/// Schedules view filter.
#[derive(Debug, Clone, Default, uniffi::Record)]
pub struct FfiScheduleFilter {
    pub search: Option<String>,
    pub patient_id: Option<String>,
    /// pending | taken | missed
    pub status: Option<String>,
    /// low | critical | normal
    pub stock: Option<String>,
    /// newest | medication | stock
    pub sort: Option<String>,
}

/// Activity view filter.
#[derive(Debug, Clone, Default, uniffi::Record)]
pub struct FfiActivityFilter {
    pub search: Option<String>,
    pub event_type: Option<String>,
    pub status: Option<String>,
    /// today | yesterday | last-7-days | last-30-days | this-month
    pub date_range: Option<String>,
}

/// FFI-safe patient with derived metrics.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatient {
    pub id: String,
    pub name: String,
    pub age: u32,
    pub medical_conditions: Vec<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    pub emergency_contact_relationship: Option<String>,
    pub active_schedules: u32,
    pub compliance: Option<f64>,
    pub compliance_tier: Option<String>,
}

impl FfiPatient {
    fn new(patient: &Patient, metrics: &PatientMetrics, config: &SyncConfig) -> Self {
        let contact = patient.emergency_contact.as_ref();
        Self {
            id: patient.id.to_string(),
            name: patient.name.clone(),
            age: patient.age,
            medical_conditions: patient.medical_conditions.clone(),
            emergency_contact_name: contact.map(|c| c.name.clone()),
            emergency_contact_phone: contact.map(|c| c.phone.clone()),
            emergency_contact_relationship: contact.map(|c| c.relationship.clone()),
            active_schedules: metrics.active_schedules as u32,
            compliance: metrics.compliance(),
            compliance_tier: metrics
                .tier(&config.compliance)
                .map(|t| t.as_str().to_string()),
        }
    }
}

/// FFI-safe medication schedule.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSchedule {
    pub id: String,
    pub patient_id: String,
    /// Current patient name, stored name, or "Unknown patient"
    pub patient_name: String,
    pub medication_name: String,
    pub dosage: String,
    pub frequency: String,
    pub timing: String,
    pub instructions: Option<String>,
    pub current_stock: u32,
    /// critical | low | normal (exclusive)
    pub stock_tier: String,
    pub status: String,
    pub last_taken: Option<String>,
    pub device_status: String,
}

impl FfiSchedule {
    fn new(schedule: &MedicationSchedule, state: &SessionState) -> Self {
        Self {
            id: schedule.id.to_string(),
            patient_id: schedule.patient_id.to_string(),
            patient_name: project::schedule_patient(schedule, state.patients.items()),
            medication_name: schedule.medication_name.clone(),
            dosage: schedule.dosage.clone(),
            frequency: schedule.frequency.as_str().to_string(),
            timing: schedule.timing.clone(),
            instructions: schedule.instructions.clone(),
            current_stock: schedule.current_stock,
            stock_tier: schedule.stock_tier(&state.config.stock).as_str().to_string(),
            status: schedule.status.as_str().to_string(),
            last_taken: schedule.last_taken.as_ref().map(timestamp),
            device_status: schedule.device_status.as_str().to_string(),
        }
    }
}

/// FFI-safe activity entry.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiActivity {
    pub id: String,
    pub event_type: String,
    pub status: String,
    pub patient_name: Option<String>,
    pub medication_name: Option<String>,
    pub description: String,
    pub timestamp: String,
    pub stock_level: Option<u32>,
}

impl From<&ActivityLogEntry> for FfiActivity {
    fn from(entry: &ActivityLogEntry) -> Self {
        Self {
            id: entry.id.to_string(),
            event_type: entry.event_type.as_str().to_string(),
            status: entry.status.as_str().to_string(),
            patient_name: entry.patient_name.clone(),
            medication_name: entry.medication_name.clone(),
            description: entry.description.clone(),
            timestamp: timestamp(&entry.timestamp),
            stock_level: entry.stock_level,
        }
    }
}

/// FFI-safe device.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDevice {
    pub id: String,
    pub name: String,
    pub location: String,
    pub status: String,
    pub last_seen: String,
    pub last_seen_label: String,
}

impl FfiDevice {
    fn new(device: &Device, now: &DateTime<Local>) -> Self {
        Self {
            id: device.id.to_string(),
            name: device.name.clone(),
            location: device.location.clone(),
            status: device.status.as_str().to_string(),
            last_seen: timestamp(&device.last_seen),
            last_seen_label: device.last_seen_label(now),
        }
    }
}

/// FFI-safe schedule summary.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiScheduleStats {
    pub total: u32,
    pub pending: u32,
    pub taken: u32,
    pub missed: u32,
    pub low_stock: u32,
    pub critical_stock: u32,
    pub offline_devices: u32,
}

impl From<ScheduleStats> for FfiScheduleStats {
    fn from(stats: ScheduleStats) -> Self {
        Self {
            total: stats.total as u32,
            pending: stats.pending as u32,
            taken: stats.taken as u32,
            missed: stats.missed as u32,
            low_stock: stats.low_stock as u32,
            critical_stock: stats.critical_stock as u32,
            offline_devices: stats.offline_devices as u32,
        }
    }
}

/// FFI-safe activity summary.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiActivityStats {
    pub total: u32,
    pub dispensed: u32,
    pub missed: u32,
    pub low_stock_alerts: u32,
}

impl From<ActivityStats> for FfiActivityStats {
    fn from(stats: ActivityStats) -> Self {
        Self {
            total: stats.total as u32,
            dispensed: stats.dispensed as u32,
            missed: stats.missed as u32,
            low_stock_alerts: stats.low_stock_alerts as u32,
        }
    }
}

/// FFI-safe dashboard.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDashboard {
    pub total_patients: u32,
    pub total_schedules: u32,
    pub dispensed_today: u32,
    pub low_stock_alerts: u32,
    pub devices_online: u32,
    pub devices_offline: u32,
    pub recent_activity: Vec<FfiActivity>,
}

impl From<DashboardMetrics> for FfiDashboard {
    fn from(metrics: DashboardMetrics) -> Self {
        Self {
            total_patients: metrics.total_patients as u32,
            total_schedules: metrics.total_schedules as u32,
            dispensed_today: metrics.dispensed_today as u32,
            low_stock_alerts: metrics.low_stock_alerts as u32,
            devices_online: metrics.devices_online as u32,
            devices_offline: metrics.devices_offline as u32,
            recent_activity: metrics.recent_activity.iter().map(FfiActivity::from).collect(),
        }
    }
}

/// Rows the host writes to apply a status change.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiStatusPatch {
    pub schedule_id: String,
    /// Full updated schedule row as JSON
    pub schedule_json: String,
    /// Activity rows to append, as JSON
    pub activity_json: Vec<String>,
}

impl FfiStatusPatch {
    fn new(schedule: &MedicationSchedule, entries: &[ActivityLogEntry]) -> Result<Self, PillSyncError> {
        Ok(Self {
            schedule_id: schedule.id.to_string(),
            schedule_json: serde_json::to_string(schedule)?,
            activity_json: entries
                .iter()
                .map(serde_json::to_string)
                .collect::<Result<_, _>>()?,
        })
    }
}

/// FFI-safe export file.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiExportFile {
    pub filename: String,
    pub mime_type: String,
    pub content: String,
    pub sha256: String,
}

impl From<export::ExportFile> for FfiExportFile {
    fn from(file: export::ExportFile) -> Self {
        Self {
            filename: file.filename,
            mime_type: file.mime_type,
            content: file.content,
            sha256: file.sha256,
        }
    }
}
