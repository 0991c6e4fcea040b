use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

use super::linker::Linker;
use super::people::obviate_people;
use super::{fetch_for_tenant, skip_record, OfferingMap, Puller, SyncContext, SyncError};
use super::{SyncResult, TenantMap};
use crate::models::{Id, Person, Role, RoleCategory};
use crate::source::payload::ClientPayload;
use crate::source::{RawRecord, RecordKind};

/// Students and their guardians.
pub(crate) struct ClientsPuller {
    pub tenants: Arc<TenantMap>,
    pub offerings: Arc<OfferingMap>,
}

/// Dependence order of a student sharing `guardians[0]`'s phone.
///
/// A dependent of any guardian with the same name keeps its order; otherwise
/// the student gets the next free order of the primary guardian.
async fn dependence_order(
    linker: &Linker<'_>,
    ctx: &SyncContext,
    guardians: &[Person],
    full_name: &str,
) -> SyncResult<i32> {
    let wanted = full_name.to_lowercase();
    let mut next = 1;

    for (i, guardian) in guardians.iter().enumerate() {
        for dependent_id in ctx.store.links.dependents(guardian.id).await? {
            let Some(dependent) = ctx.store.people.find_by_id(dependent_id).await? else {
                continue;
            };
            if dependent.full_name().to_lowercase() == wanted
                && dependent.phone == guardians[0].phone
            {
                return Ok(dependent.dependence_order);
            }
            if i == 0 {
                next = next.max(dependent.dependence_order + 1);
            }
        }
    }

    tracing::debug!(
        "New dependent {} of tenant {} gets order {}",
        full_name,
        linker.tenant.code,
        next
    );
    Ok(next)
}

async fn put_client(
    linker: &Linker<'_>,
    ctx: &SyncContext,
    record: &RawRecord,
) -> SyncResult<Vec<Id>> {
    let payload: ClientPayload = record.payload()?;
    let mut guardians = Vec::new();

    for guardian in payload.guardians() {
        let phone = linker.normalize(&guardian.phone);
        if phone.is_empty() {
            tracing::warn!(
                "Guardian {} {} of \"{}\" has no phone, ignoring",
                guardian.first_name,
                guardian.last_name,
                record.title
            );
            continue;
        }

        let identity = linker.put_identity(&phone, 0).await?;
        let person = linker
            .put_person(
                &identity,
                &guardian.first_name,
                &guardian.last_name,
                0,
                &record.title,
            )
            .await?;
        linker.assign_role(person.id, Role::Parent).await?;
        linker.link_tenant(person.id).await?;
        guardians.push(person);
    }

    let (identity, order) = match payload.own_phone() {
        Some(raw) => {
            let phone = linker.normalize(raw);
            (linker.put_identity(&phone, 0).await?, 0)
        }
        None => {
            let Some(primary) = guardians.first() else {
                return Err(SyncError::Record {
                    title: record.title.clone(),
                    message: "dependent student has no guardian with a phone".to_string(),
                });
            };
            let order = dependence_order(linker, ctx, &guardians, &payload.full_name()).await?;
            (linker.put_identity(&primary.phone, order).await?, order)
        }
    };

    let student = linker
        .put_person(
            &identity,
            &payload.first_name,
            &payload.last_name,
            order,
            &record.title,
        )
        .await?;
    linker.assign_role(student.id, Role::Student).await?;
    linker.link_tenant(student.id).await?;
    linker
        .sync_enrollments(student.id, &payload.course_codes, &record.title)
        .await?;

    let mut pulled: Vec<Id> = guardians.iter().map(|g| g.id).collect();
    for guardian in &guardians {
        linker.link_dependent(guardian.id, student.id).await?;
    }
    pulled.push(student.id);
    Ok(pulled)
}

#[async_trait]
impl Puller for ClientsPuller {
    type Output = ();

    fn kind(&self) -> RecordKind {
        RecordKind::Client
    }

    async fn pull(&self, ctx: &SyncContext) -> SyncResult<(Vec<Id>, ())> {
        let mut pulled = Vec::new();
        let mut seen = HashSet::new();

        for (tenant_id, key) in self.tenants.iter() {
            let Some(tenant) = ctx.store.tenants.find_by_id(tenant_id).await? else {
                tracing::warn!("Tenant {} vanished before its clients were pulled", key);
                continue;
            };
            let linker = Linker::new(ctx, &tenant, &self.offerings);

            for record in fetch_for_tenant(ctx, RecordKind::Client, key).await? {
                match put_client(&linker, ctx, &record).await {
                    // Guardians of several students show up more than once
                    Ok(ids) => pulled.extend(ids.into_iter().filter(|id| seen.insert(*id))),
                    Err(e) => skip_record(RecordKind::Client, &record.title, &e),
                }
            }
        }

        Ok((pulled, ()))
    }

    async fn obviate(&self, ctx: &SyncContext, keep: &HashSet<Id>) -> SyncResult<Vec<Id>> {
        obviate_people(ctx, &self.tenants, RoleCategory::Client, keep).await
    }
}
