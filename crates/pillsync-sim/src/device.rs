//! Device-origin events.
//!
//! A dispenser reports straight to the remote store, bypassing any client
//! mirror. Collections observe the results on their change feeds.

use chrono::{DateTime, Utc};
use pillsync_core::config::{StockThresholds, SyncConfig};
use pillsync_core::models::{
    ActivityLogEntry, ConnectivityStatus, Device, Entity, EventType, MedicationSchedule, OwnerId,
    Severity,
};
use pillsync_core::sync::{Mutation, RemoteSource};
use pillsync_core::SqliteSource;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{SimError, SimResult};

/// Simulated dispensers belonging to one owner.
pub struct DeviceSimulator<'a> {
    source: &'a SqliteSource,
    owner: OwnerId,
    thresholds: StockThresholds,
}

impl<'a> DeviceSimulator<'a> {
    pub fn new(source: &'a SqliteSource, owner: OwnerId, config: &SyncConfig) -> Self {
        Self {
            source,
            owner,
            thresholds: config.stock,
        }
    }

    /// The dispenser released a dose: the schedule is taken, one pill is
    /// gone, and crossing a stock threshold logs an alert.
    pub async fn dispense(
        &self,
        schedule_id: Uuid,
        device_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> SimResult<MedicationSchedule> {
        let before: MedicationSchedule = self.find(schedule_id).await?;
        let after = self.update(before.mark_taken(now)?).await?;
        info!(id = %schedule_id, stock = after.current_stock, "Dispensed dose");

        self.log(ActivityLogEntry::dispensed(&after).at(now), device_id)
            .await?;
        if let Some(tier) = self
            .thresholds
            .crossed_into(before.current_stock, after.current_stock)
        {
            self.log(ActivityLogEntry::stock_alert(&after, tier).at(now), device_id)
                .await?;
        }
        Ok(after)
    }

    /// The dose window closed without a dispense.
    pub async fn report_missed(
        &self,
        schedule_id: Uuid,
        device_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> SimResult<MedicationSchedule> {
        let before: MedicationSchedule = self.find(schedule_id).await?;
        let after = self.update(before.mark_missed(now)?).await?;
        info!(id = %schedule_id, "Missed dose");

        self.log(ActivityLogEntry::missed(&after).at(now), device_id)
            .await?;
        Ok(after)
    }

    /// Flip connectivity. A change of status is logged; reporting the
    /// current status only refreshes `last_seen`.
    pub async fn set_device_status(
        &self,
        device_id: Uuid,
        status: ConnectivityStatus,
        now: DateTime<Utc>,
    ) -> SimResult<Device> {
        let mut device: Device = self.find(device_id).await?;
        let changed = device.status != status;
        device.status = status;
        device.last_seen = now;
        let device = self.update(device).await?;

        if changed {
            let (severity, description) = match status {
                ConnectivityStatus::Online => {
                    (Severity::Success, format!("{} is back online", device.label()))
                }
                ConnectivityStatus::Offline => {
                    (Severity::Error, format!("{} went offline", device.label()))
                }
            };
            info!(device = %device_id, status = status.as_str(), "Device status changed");
            let entry = ActivityLogEntry::new(self.owner, EventType::DeviceStatus, severity, description)
                .at(now);
            self.log(entry, Some(device_id)).await?;
        }
        Ok(device)
    }

    /// Periodic check-in from an online device.
    pub async fn heartbeat(&self, device_id: Uuid, now: DateTime<Utc>) -> SimResult<Device> {
        let mut device: Device = self.find(device_id).await?;
        device.last_seen = now;
        debug!(device = %device_id, "Heartbeat");
        self.update(device).await
    }

    async fn find<E>(&self, id: Uuid) -> SimResult<E>
    where
        E: Entity,
        SqliteSource: RemoteSource<E>,
    {
        let rows: Vec<E> = self.source.fetch_all(self.owner, E::default_order()).await?;
        rows.into_iter()
            .find(|row| row.id() == id)
            .ok_or(SimError::NotFound(id))
    }

    async fn update<E>(&self, row: E) -> SimResult<E>
    where
        E: Entity,
        SqliteSource: RemoteSource<E>,
    {
        let stored = self
            .source
            .mutate(self.owner, Mutation::Update(row.clone()))
            .await?;
        Ok(stored.unwrap_or(row))
    }

    async fn log(&self, entry: ActivityLogEntry, device_id: Option<Uuid>) -> SimResult<()> {
        let entry = match device_id {
            Some(id) => entry.from_device(id),
            None => entry,
        };
        self.source.mutate(self.owner, Mutation::Insert(entry)).await?;
        Ok(())
    }
}
