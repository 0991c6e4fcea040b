use async_trait::async_trait;
use std::collections::HashSet;

use super::obviation::{ids, obviate_stale};
use super::upsert::UpsertPlan;
use super::{skip_record, Puller, SyncContext, SyncError, SyncResult, TenantMap};
use crate::models::{Entity, Id, Tenant, TenantKey};
use crate::source::payload::TenantPayload;
use crate::source::RecordKind;

/// Root phase. Produces the tenant map every later phase is scoped by.
pub(crate) struct TenantsPuller {
    pub scope: Option<TenantKey>,
}

#[async_trait]
impl Puller for TenantsPuller {
    type Output = TenantMap;

    fn kind(&self) -> RecordKind {
        RecordKind::Tenant
    }

    async fn pull(&self, ctx: &SyncContext) -> SyncResult<(Vec<Id>, TenantMap)> {
        let records = ctx
            .source
            .fetch_records(RecordKind::Tenant, self.scope.as_ref())
            .await?;

        let mut plan = UpsertPlan::new();
        for record in &records {
            let payload: TenantPayload = match record.payload() {
                Ok(payload) => payload,
                Err(e) => {
                    skip_record(RecordKind::Tenant, &record.title, &SyncError::from(e));
                    continue;
                }
            };

            let code = payload.code.trim();
            if let Some(scope) = &self.scope {
                if code != scope.as_str() {
                    tracing::warn!(
                        "Ignoring tenant {} while syncing tenant {}",
                        code,
                        scope
                    );
                    continue;
                }
            }

            let mut tenant = Tenant::new(code, payload.name.trim())
                .with_timezone(payload.timezone.trim())
                .with_phone_country_code(payload.phone_country_code.trim());
            tenant.locale = payload.locale;
            plan.stage(&record.title, tenant);
        }

        let applied = plan
            .apply(ctx.store.tenants.as_ref(), ctx.options.verbose)
            .await?;
        let map: TenantMap = applied.rows().map(|t| (t.id, t.key())).collect();

        if let Some(scope) = &self.scope {
            if map.is_empty() {
                tracing::warn!("Tenant {} was not found in the source", scope);
            }
        }

        Ok((applied.ids(), map))
    }

    async fn obviate(&self, ctx: &SyncContext, keep: &HashSet<Id>) -> SyncResult<Vec<Id>> {
        if let Some(scope) = &self.scope {
            tracing::warn!(
                "Not obviating tenants while syncing only tenant {}",
                scope
            );
            return Ok(Vec::new());
        }

        let live = ctx.store.tenants.find_all_live().await?;
        let obviated = obviate_stale(ctx.store.tenants.as_ref(), live, keep).await?;
        Ok(ids(&obviated))
    }
}
