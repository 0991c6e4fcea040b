use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::obviation::{ids, obviate_per_tenant};
use super::occurrences::{self, OccurrenceDiff};
use super::upsert::UpsertPlan;
use super::{fetch_for_tenant, skip_record, OfferingMap, Puller, SyncContext, SyncError};
use super::{SyncResult, TenantMap};
use crate::models::{Entity, Id, Offering, OfferingKey, Room, RoomKey, Schedule};
use crate::source::payload::SchedulePayload;
use crate::source::RecordKind;

/// Schedules, the rooms they name and the occurrences they generate.
///
/// The output is the set of room ids still referenced, consumed by
/// [`obviate_rooms`] once every phase of the run has finished.
pub(crate) struct SchedulesPuller {
    pub tenants: Arc<TenantMap>,
    pub offerings: Arc<OfferingMap>,
}

struct Resolved<'r> {
    title: &'r str,
    payload: SchedulePayload,
    offering: Offering,
}

impl SchedulesPuller {
    async fn resolve<'r>(
        &self,
        ctx: &SyncContext,
        tenant_id: Id,
        title: &'r str,
        payload: SchedulePayload,
    ) -> SyncResult<Resolved<'r>> {
        let key = OfferingKey::new(tenant_id, payload.course_code.trim());
        let unresolved = || SyncError::UnresolvedPrerequisite {
            kind: RecordKind::Schedule,
            title: title.to_string(),
            prerequisite: format!("offering {}", payload.course_code.trim()),
        };

        let offering_id = self.offerings.id_of(&key).ok_or_else(unresolved)?;
        let offering = ctx
            .store
            .offerings
            .find_by_id(offering_id)
            .await?
            .ok_or_else(unresolved)?;

        Ok(Resolved {
            title,
            payload,
            offering,
        })
    }

    async fn pull_tenant(
        &self,
        ctx: &SyncContext,
        tenant_id: Id,
        rooms_used: &mut HashSet<Id>,
    ) -> SyncResult<Vec<Id>> {
        let Some(key) = self.tenants.get(tenant_id) else {
            return Ok(Vec::new());
        };
        let Some(tenant) = ctx.store.tenants.find_by_id(tenant_id).await? else {
            tracing::warn!("Tenant {} vanished before its schedules were pulled", key);
            return Ok(Vec::new());
        };
        let tz = occurrences::zone(&tenant.timezone);
        let records = fetch_for_tenant(ctx, RecordKind::Schedule, key).await?;

        let mut resolved = Vec::new();
        for record in &records {
            let result = match record.payload::<SchedulePayload>() {
                Ok(payload) => self.resolve(ctx, tenant_id, &record.title, payload).await,
                Err(e) => Err(e.into()),
            };
            match result {
                Ok(r) => resolved.push(r),
                Err(e) => skip_record(RecordKind::Schedule, &record.title, &e),
            }
        }

        let mut rooms = UpsertPlan::new();
        let mut room_names = HashSet::new();
        for r in &resolved {
            if let Some(name) = r.payload.room_name() {
                if room_names.insert(name) {
                    rooms.stage(r.title, Room::new(tenant_id, name));
                }
            }
        }
        let room_ids: HashMap<RoomKey, Id> = rooms
            .apply(ctx.store.rooms.as_ref(), ctx.options.verbose)
            .await?
            .into_rows()
            .into_iter()
            .map(|room| (room.key(), room.id))
            .collect();

        let mut plan = UpsertPlan::new();
        let mut offerings = HashMap::new();
        for r in resolved {
            let mut schedule = Schedule::new(
                r.offering.id,
                r.payload.day,
                r.payload.start_time,
                r.payload.end_time,
            );
            schedule.room_id = r.payload.room_name().and_then(|name| {
                room_ids
                    .get(&RoomKey {
                        tenant_id,
                        name: name.to_string(),
                    })
                    .copied()
            });
            schedule.comments = r.payload.comments.clone();
            plan.stage(r.title, schedule);
            offerings.insert(r.offering.id, r.offering);
        }

        let applied = plan
            .apply(ctx.store.schedules.as_ref(), ctx.options.verbose)
            .await?;

        let mut total = OccurrenceDiff::default();
        for schedule in applied.rows() {
            rooms_used.extend(schedule.room_id);
            let Some(offering) = offerings.get(&schedule.offering_id) else {
                continue;
            };
            let diff = occurrences::reconcile(&ctx.store, schedule, offering, tz).await?;
            total.created += diff.created;
            total.updated += diff.updated;
            total.obviated += diff.obviated;
        }
        tracing::info!(
            "Occurrences of tenant {}: {} created, {} updated, {} obviated",
            key,
            total.created,
            total.updated,
            total.obviated
        );

        Ok(applied.ids())
    }
}

#[async_trait]
impl Puller for SchedulesPuller {
    type Output = HashSet<Id>;

    fn kind(&self) -> RecordKind {
        RecordKind::Schedule
    }

    async fn pull(&self, ctx: &SyncContext) -> SyncResult<(Vec<Id>, HashSet<Id>)> {
        let mut rooms_used = HashSet::new();
        let mut pulled = Vec::new();
        for tenant_id in self.tenants.ids() {
            pulled.extend(self.pull_tenant(ctx, tenant_id, &mut rooms_used).await?);
        }
        Ok((pulled, rooms_used))
    }

    /// Obviates stale schedules together with their generated occurrences.
    async fn obviate(&self, ctx: &SyncContext, keep: &HashSet<Id>) -> SyncResult<Vec<Id>> {
        let store = &ctx.store;
        let offerings = self.offerings.as_ref();
        let obviated = obviate_per_tenant(
            &self.tenants,
            |tenant_id| async move {
                let mut live = Vec::new();
                for offering_id in offerings.ids_in(tenant_id) {
                    live.extend(store.schedules.find_live_in(offering_id).await?);
                }
                Ok::<_, SyncError>(live)
            },
            store.schedules.as_ref(),
            keep,
        )
        .await?;

        let count = occurrences::obviate_for_schedules(store, &obviated).await?;
        if count > 0 {
            tracing::info!("Obviated {} occurrence(s) of removed schedules", count);
        }
        Ok(ids(&obviated))
    }
}

/// Obviates the rooms of the run's tenants no pulled schedule refers to.
pub(crate) async fn obviate_rooms(
    ctx: &SyncContext,
    tenants: &TenantMap,
    rooms_used: &HashSet<Id>,
) -> SyncResult<Vec<Id>> {
    let store = &ctx.store;
    let obviated = obviate_per_tenant(
        tenants,
        |tenant_id| async move {
            store
                .rooms
                .find_live_in(tenant_id)
                .await
                .map_err(SyncError::from)
        },
        store.rooms.as_ref(),
        rooms_used,
    )
    .await?;
    Ok(ids(&obviated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Occurrence, OccurrenceKey};
    use crate::store::{MemoryStore, Repository, Store, StoreError, StoreResult};
    use crate::sync::fixtures::Harness;
    use crate::sync::{Orchestrator, SyncOptions};
    use chrono::{DateTime, Utc};

    /// Occurrence table whose inserts always fail.
    struct ReadOnlyOccurrences(Arc<MemoryStore>);

    #[async_trait]
    impl Repository<Occurrence> for ReadOnlyOccurrences {
        async fn find_by_key(&self, key: &OccurrenceKey) -> StoreResult<Option<Occurrence>> {
            Repository::<Occurrence>::find_by_key(self.0.as_ref(), key).await
        }

        async fn find_by_id(&self, id: Id) -> StoreResult<Option<Occurrence>> {
            Repository::<Occurrence>::find_by_id(self.0.as_ref(), id).await
        }

        async fn find_live_in(&self, scope: Id) -> StoreResult<Vec<Occurrence>> {
            Repository::<Occurrence>::find_live_in(self.0.as_ref(), scope).await
        }

        async fn find_all_live(&self) -> StoreResult<Vec<Occurrence>> {
            Repository::<Occurrence>::find_all_live(self.0.as_ref()).await
        }

        async fn create_batch(&self, _items: Vec<Occurrence>) -> StoreResult<Vec<Occurrence>> {
            Err(StoreError::Backend("attempt to write a readonly database".to_string()))
        }

        async fn update_batch(&self, items: Vec<Occurrence>) -> StoreResult<Vec<Occurrence>> {
            Repository::<Occurrence>::update_batch(self.0.as_ref(), items).await
        }

        async fn restore_batch(&self, items: Vec<Occurrence>) -> StoreResult<Vec<Occurrence>> {
            Repository::<Occurrence>::restore_batch(self.0.as_ref(), items).await
        }

        async fn obviate_batch(&self, items: Vec<Occurrence>) -> StoreResult<Vec<Occurrence>> {
            Repository::<Occurrence>::obviate_batch(self.0.as_ref(), items).await
        }

        async fn purge_obviated(&self, before: DateTime<Utc>) -> StoreResult<u64> {
            Repository::<Occurrence>::purge_obviated(self.0.as_ref(), before).await
        }
    }

    #[tokio::test]
    async fn test_occurrence_write_failure_aborts_run() {
        let harness = Harness::new();
        harness.seed_scenario();

        let mut store = Store::from_backend(harness.backend.clone());
        store.occurrences = Arc::new(ReadOnlyOccurrences(harness.backend.clone()));
        let orchestrator =
            Orchestrator::new(store, harness.source.clone(), SyncOptions::default());

        let err = orchestrator.sync_all(None).await.unwrap_err();
        assert!(matches!(err, SyncError::Store(StoreError::Backend(_))));
        assert!(harness.backend.rows::<Occurrence>().await.is_empty());

        // The regular store picks up where the failed run stopped
        harness.orchestrator.sync_all(None).await.unwrap();
        assert_eq!(harness.backend.rows::<Occurrence>().await.len(), 13);
    }
}
