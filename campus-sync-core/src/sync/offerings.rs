use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::obviation::{ids, obviate_per_tenant, obviate_stale};
use super::occurrences;
use super::upsert::UpsertPlan;
use super::{fetch_for_tenant, skip_record, OfferingMap, Puller, SyncContext, SyncError};
use super::{SyncResult, TenantMap};
use crate::models::{Book, Entity, Id, Offering};
use crate::source::payload::OfferingPayload;
use crate::source::RecordKind;

/// Offerings and the books they reference.
///
/// Books are upserted first so offerings can point at their ids. Books are
/// never obviated.
pub(crate) struct OfferingsPuller {
    pub tenants: Arc<TenantMap>,
}

impl OfferingsPuller {
    async fn pull_tenant(
        &self,
        ctx: &SyncContext,
        tenant_id: Id,
        map: &mut OfferingMap,
    ) -> SyncResult<Vec<Id>> {
        let Some(key) = self.tenants.get(tenant_id) else {
            return Ok(Vec::new());
        };
        let records = fetch_for_tenant(ctx, RecordKind::Offering, key).await?;

        let mut payloads = Vec::new();
        for record in &records {
            let payload = record
                .payload::<OfferingPayload>()
                .map_err(SyncError::from)
                .and_then(|p| {
                    if p.first_date > p.last_date {
                        Err(SyncError::Record {
                            title: record.title.clone(),
                            message: format!(
                                "first date {} is after last date {}",
                                p.first_date, p.last_date
                            ),
                        })
                    } else {
                        Ok(p)
                    }
                });
            match payload {
                Ok(p) => payloads.push((record.title.as_str(), p)),
                Err(e) => skip_record(RecordKind::Offering, &record.title, &e),
            }
        }

        let mut books = UpsertPlan::new();
        for (title, payload) in &payloads {
            for book in &payload.books {
                let name = book.name.trim();
                if name.is_empty() {
                    continue;
                }
                let mut row = Book::new(tenant_id, name);
                row.publisher = book.publisher.clone();
                row.info = book.info.clone();
                books.stage(title, row);
            }
        }
        let book_ids: HashMap<String, Id> = books
            .apply(ctx.store.books.as_ref(), ctx.options.verbose)
            .await?
            .into_rows()
            .into_iter()
            .map(|b| (b.name, b.id))
            .collect();

        let mut plan = UpsertPlan::new();
        for (title, payload) in payloads {
            let mut offering = Offering::new(
                tenant_id,
                payload.code.trim(),
                payload.name.trim(),
                payload.first_date,
                payload.last_date,
            );
            offering.sub_name = payload.sub_name;
            offering.book_ids = payload
                .books
                .iter()
                .filter_map(|b| book_ids.get(b.name.trim()).copied())
                .collect();
            plan.stage(title, offering);
        }

        let applied = plan
            .apply(ctx.store.offerings.as_ref(), ctx.options.verbose)
            .await?;
        for offering in applied.rows() {
            map.insert(offering.id, offering.key());
        }
        Ok(applied.ids())
    }
}

#[async_trait]
impl Puller for OfferingsPuller {
    type Output = OfferingMap;

    fn kind(&self) -> RecordKind {
        RecordKind::Offering
    }

    async fn pull(&self, ctx: &SyncContext) -> SyncResult<(Vec<Id>, OfferingMap)> {
        let mut map = OfferingMap::new();
        let mut pulled = Vec::new();
        for tenant_id in self.tenants.ids() {
            pulled.extend(self.pull_tenant(ctx, tenant_id, &mut map).await?);
        }
        Ok((pulled, map))
    }

    async fn obviate(&self, ctx: &SyncContext, keep: &HashSet<Id>) -> SyncResult<Vec<Id>> {
        let store = &ctx.store;
        let obviated = obviate_per_tenant(
            &self.tenants,
            |tenant_id| async move {
                store
                    .offerings
                    .find_live_in(tenant_id)
                    .await
                    .map_err(SyncError::from)
            },
            store.offerings.as_ref(),
            keep,
        )
        .await?;

        // Schedules hang off offerings, not tenants, and would never be
        // candidates of the schedule phase again
        let none = HashSet::new();
        let mut schedules = Vec::new();
        for offering in &obviated {
            let live = store.schedules.find_live_in(offering.id).await?;
            schedules.extend(obviate_stale(store.schedules.as_ref(), live, &none).await?);
        }
        if !schedules.is_empty() {
            let count = occurrences::obviate_for_schedules(store, &schedules).await?;
            tracing::info!(
                "Obviated {} schedule(s) and {} occurrence(s) of removed offerings",
                schedules.len(),
                count
            );
        }

        Ok(ids(&obviated))
    }
}
