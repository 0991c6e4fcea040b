use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

use super::linker::Linker;
use super::people::obviate_people;
use super::{fetch_for_tenant, skip_record, OfferingMap, Puller, SyncContext, SyncError};
use super::{SyncResult, TenantMap};
use crate::models::{Id, RoleCategory};
use crate::source::payload::StaffPayload;
use crate::source::{RawRecord, RecordKind};

pub(crate) struct StaffPuller {
    pub tenants: Arc<TenantMap>,
    pub offerings: Arc<OfferingMap>,
}

async fn put_staff(linker: &Linker<'_>, record: &RawRecord) -> SyncResult<Id> {
    let payload: StaffPayload = record.payload()?;
    if !payload.role.is_staff() {
        return Err(SyncError::Record {
            title: record.title.clone(),
            message: format!("{} is not a staff role", payload.role),
        });
    }

    let phone = linker.normalize(&payload.phone);
    if phone.is_empty() {
        return Err(SyncError::Record {
            title: record.title.clone(),
            message: "missing phone".to_string(),
        });
    }

    let identity = linker.put_identity(&phone, 0).await?;
    let person = linker
        .put_person(
            &identity,
            &payload.first_name,
            &payload.last_name,
            0,
            &record.title,
        )
        .await?;

    linker.assign_role(person.id, payload.role).await?;
    linker.set_default_password(identity, payload.role).await?;
    linker.link_tenant(person.id).await?;
    linker
        .sync_enrollments(person.id, &payload.course_codes, &record.title)
        .await?;

    Ok(person.id)
}

#[async_trait]
impl Puller for StaffPuller {
    type Output = ();

    fn kind(&self) -> RecordKind {
        RecordKind::Staff
    }

    async fn pull(&self, ctx: &SyncContext) -> SyncResult<(Vec<Id>, ())> {
        let mut pulled = Vec::new();

        for (tenant_id, key) in self.tenants.iter() {
            let Some(tenant) = ctx.store.tenants.find_by_id(tenant_id).await? else {
                tracing::warn!("Tenant {} vanished before its staff were pulled", key);
                continue;
            };
            let linker = Linker::new(ctx, &tenant, &self.offerings);

            for record in fetch_for_tenant(ctx, RecordKind::Staff, key).await? {
                match put_staff(&linker, &record).await {
                    Ok(id) => pulled.push(id),
                    Err(e) => skip_record(RecordKind::Staff, &record.title, &e),
                }
            }
        }

        Ok((pulled, ()))
    }

    async fn obviate(&self, ctx: &SyncContext, keep: &HashSet<Id>) -> SyncResult<Vec<Id>> {
        obviate_people(ctx, &self.tenants, RoleCategory::Staff, keep).await
    }
}
