//! Local-origin writes with optimistic apply and rollback.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::collection::SyncedCollection;
use super::event::ChangeEvent;
use super::source::{Mutation, RemoteSource};
use super::{SyncError, SyncResult};
use crate::config::{MutationStrategy, StockThresholds, SyncConfig};
use crate::models::{ActivityLogEntry, Entity, MedicationSchedule, OwnerId, StockTier};
use crate::notify::{Feedback, Notifier, Permission};

/// A delete the user has been asked to confirm.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingDelete<E: Entity> {
    entity: E,
    prompt: String,
}

impl<E: Entity> PendingDelete<E> {
    pub fn id(&self) -> Uuid {
        self.entity.id()
    }

    pub fn entity(&self) -> &E {
        &self.entity
    }

    /// Confirmation text naming the row.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }
}

/// Issues writes on behalf of the local user and keeps the mirror honest.
///
/// Under [`MutationStrategy::Optimistic`] the mirror changes before the
/// remote confirms and is restored from a snapshot if the write fails. Under
/// [`MutationStrategy::AwaitConfirmation`] the mirror is left for the change
/// feed to update. Either way a failed write leaves the mirror as it was.
pub struct OptimisticMutator<'n> {
    strategy: MutationStrategy,
    thresholds: StockThresholds,
    notifier: &'n dyn Notifier,
    feedback: &'n dyn Feedback,
    /// (schedule, tier) alerts already raised since the last restock
    fired_alerts: HashSet<(Uuid, StockTier)>,
}

impl<'n> OptimisticMutator<'n> {
    pub fn new(config: &SyncConfig, notifier: &'n dyn Notifier, feedback: &'n dyn Feedback) -> Self {
        Self {
            strategy: config.mutation_strategy,
            thresholds: config.stock,
            notifier,
            feedback,
            fired_alerts: HashSet::new(),
        }
    }

    pub fn strategy(&self) -> MutationStrategy {
        self.strategy
    }

    pub async fn create<S, E>(
        &mut self,
        collection: &mut SyncedCollection<'_, S, E>,
        entity: E,
    ) -> SyncResult<E>
    where
        S: RemoteSource<E>,
        E: Entity,
    {
        self.check_owner(collection.owner(), &entity)?;
        let message = format!("{} added", entity.label());
        let stored = self.write(collection, Mutation::Insert(entity.clone()), &message).await?;
        Ok(stored.unwrap_or(entity))
    }

    pub async fn update<S, E>(
        &mut self,
        collection: &mut SyncedCollection<'_, S, E>,
        entity: E,
    ) -> SyncResult<E>
    where
        S: RemoteSource<E>,
        E: Entity,
    {
        self.check_owner(collection.owner(), &entity)?;
        let message = format!("{} updated", entity.label());
        let stored = self.write(collection, Mutation::Update(entity.clone()), &message).await?;
        Ok(stored.unwrap_or(entity))
    }

    /// First step of a delete: look the row up and build the prompt. Nothing
    /// is written.
    pub fn request_delete<S, E>(
        &self,
        collection: &SyncedCollection<'_, S, E>,
        id: Uuid,
    ) -> SyncResult<PendingDelete<E>>
    where
        S: RemoteSource<E>,
        E: Entity,
    {
        let entity = collection.get(id).cloned().ok_or(SyncError::NotFound(id))?;
        Ok(PendingDelete {
            prompt: entity.delete_prompt(),
            entity,
        })
    }

    /// Second step of a delete, after the user confirmed.
    pub async fn confirm_delete<S, E>(
        &mut self,
        collection: &mut SyncedCollection<'_, S, E>,
        pending: PendingDelete<E>,
    ) -> SyncResult<()>
    where
        S: RemoteSource<E>,
        E: Entity,
    {
        let message = format!("{} deleted", pending.entity.label());
        self.write(collection, Mutation::Delete(pending.id()), &message).await?;
        Ok(())
    }

    /// `pending -> taken`. Logs the dispense, notifies, and raises a stock
    /// alert if the new count crossed a threshold.
    pub async fn mark_taken<S>(
        &mut self,
        schedules: &mut SyncedCollection<'_, S, MedicationSchedule>,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> SyncResult<MedicationSchedule>
    where
        S: RemoteSource<MedicationSchedule> + RemoteSource<ActivityLogEntry>,
    {
        let before = self.lookup(schedules, id)?;
        let after = self.inline(before.mark_taken(now))?;
        self.write(schedules, Mutation::Update(after.clone()), "Medication marked as taken")
            .await?;

        let source = schedules.source();
        let owner = schedules.owner();
        log_activity(source, owner, ActivityLogEntry::dispensed(&after).at(now)).await;

        if self.notifier.permission() == Permission::Granted {
            self.notifier
                .show("Medication Taken", &format!("{} has been marked as taken", after.label()));
        }

        if let Some(alert) = self.stock_alert(&before, &after, now) {
            log_activity(source, owner, alert).await;
        }
        Ok(after)
    }

    /// `taken -> pending`: one pill back. Never raises alerts.
    pub async fn mark_untaken<S>(
        &mut self,
        schedules: &mut SyncedCollection<'_, S, MedicationSchedule>,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> SyncResult<MedicationSchedule>
    where
        S: RemoteSource<MedicationSchedule>,
    {
        let before = self.lookup(schedules, id)?;
        let after = self.inline(before.mark_untaken(now))?;
        self.write(schedules, Mutation::Update(after.clone()), "Medication marked as not taken")
            .await?;
        Ok(after)
    }

    /// `pending -> missed`, for clock- or device-driven misses.
    pub async fn mark_missed<S>(
        &mut self,
        schedules: &mut SyncedCollection<'_, S, MedicationSchedule>,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> SyncResult<MedicationSchedule>
    where
        S: RemoteSource<MedicationSchedule> + RemoteSource<ActivityLogEntry>,
    {
        let before = self.lookup(schedules, id)?;
        let after = self.inline(before.mark_missed(now))?;
        self.write(schedules, Mutation::Update(after.clone()), "Dose marked as missed")
            .await?;

        let entry = ActivityLogEntry::missed(&after).at(now);
        log_activity(schedules.source(), schedules.owner(), entry).await;
        Ok(after)
    }

    /// Set a new pill count. Refilling above the low threshold re-arms the
    /// schedule's stock alerts.
    pub async fn restock<S>(
        &mut self,
        schedules: &mut SyncedCollection<'_, S, MedicationSchedule>,
        id: Uuid,
        count: u32,
        now: DateTime<Utc>,
    ) -> SyncResult<MedicationSchedule>
    where
        S: RemoteSource<MedicationSchedule>,
    {
        let mut after = self.lookup(schedules, id)?;
        after.current_stock = count;
        after.updated_at = now;
        let message = format!("{} restocked to {}", after.medication_name, count);
        self.write(schedules, Mutation::Update(after.clone()), &message)
            .await?;

        if !self.thresholds.is_low(count) {
            self.fired_alerts.retain(|(schedule, _)| *schedule != id);
        }
        Ok(after)
    }

    /// Whether an alert for this schedule and tier is armed.
    pub fn alert_armed(&self, schedule_id: Uuid, tier: StockTier) -> bool {
        !self.fired_alerts.contains(&(schedule_id, tier))
    }

    fn stock_alert(
        &mut self,
        before: &MedicationSchedule,
        after: &MedicationSchedule,
        now: DateTime<Utc>,
    ) -> Option<ActivityLogEntry> {
        let tier = self
            .thresholds
            .crossed_into(before.current_stock, after.current_stock)?;
        if !self.fired_alerts.insert((after.id, tier)) {
            debug!(id = %after.id, tier = tier.as_str(), "Stock alert already raised");
            return None;
        }

        let entry = ActivityLogEntry::stock_alert(after, tier).at(now);
        info!(id = %after.id, tier = tier.as_str(), stock = after.current_stock, "Stock alert");
        if self.notifier.permission() == Permission::Granted {
            self.notifier.show("Low Stock Alert", &entry.description);
        }
        Some(entry)
    }

    fn lookup<S>(
        &self,
        schedules: &SyncedCollection<'_, S, MedicationSchedule>,
        id: Uuid,
    ) -> SyncResult<MedicationSchedule>
    where
        S: RemoteSource<MedicationSchedule>,
    {
        match schedules.get(id) {
            Some(schedule) => Ok(schedule.clone()),
            None => {
                let err = SyncError::NotFound(id);
                self.feedback.error(&err.to_string());
                Err(err)
            }
        }
    }

    fn inline<T, F: Into<SyncError>>(&self, result: Result<T, F>) -> SyncResult<T> {
        result.map_err(|e| {
            let err = e.into();
            self.feedback.error(&err.to_string());
            err
        })
    }

    fn check_owner<E: Entity>(&self, owner: OwnerId, entity: &E) -> SyncResult<()> {
        if entity.owner_id() == owner {
            return Ok(());
        }
        let err = SyncError::Unauthorized(format!(
            "{} belongs to another owner",
            E::TABLE
        ));
        self.feedback.error(&err.to_string());
        Err(err)
    }

    async fn write<S, E>(
        &self,
        collection: &mut SyncedCollection<'_, S, E>,
        mutation: Mutation<E>,
        success: &str,
    ) -> SyncResult<Option<E>>
    where
        S: RemoteSource<E>,
        E: Entity,
    {
        if collection.is_closed() {
            return Err(SyncError::Closed);
        }
        let owner = collection.owner();
        let optimistic = self.strategy == MutationStrategy::Optimistic;
        let id = mutation.id();
        let operation = mutation.operation();

        let snapshot = if optimistic {
            let snapshot = collection.mirror().snapshot();
            collection.mirror_mut().apply(&mutation.as_event());
            Some(snapshot)
        } else {
            None
        };

        match collection.source().mutate(owner, mutation).await {
            Ok(stored) => {
                if let (true, Some(row)) = (optimistic, stored.as_ref()) {
                    collection.mirror_mut().apply(&ChangeEvent::update(row.clone()));
                }
                debug!(table = %E::TABLE, owner = %owner, id = %id, operation, "Write confirmed");
                self.feedback.success(success);
                Ok(stored)
            }
            Err(e) => {
                if let Some(snapshot) = snapshot {
                    collection.mirror_mut().restore(snapshot);
                }
                let err = SyncError::from(e);
                warn!(table = %E::TABLE, owner = %owner, id = %id, operation, error = %err, "Write failed");
                self.feedback.error(&err.to_string());
                Err(err)
            }
        }
    }
}

/// Append an activity entry. Failures are logged, never surfaced.
async fn log_activity<S>(source: &S, owner: OwnerId, entry: ActivityLogEntry)
where
    S: RemoteSource<ActivityLogEntry>,
{
    let event_type = entry.event_type;
    if let Err(e) = source.mutate(owner, Mutation::Insert(entry)).await {
        warn!(owner = %owner, event_type = %event_type, error = %e, "Could not record activity");
    }
}
