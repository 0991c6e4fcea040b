//! Obviation of people, with the mixed-role exemption.

use std::collections::HashSet;

use super::obviation::{ids, obviate_stale};
use super::{SyncContext, SyncResult, TenantMap};
use crate::models::{Id, Role, RoleCategory};

/// Obviates the people of `category` that were not pulled.
///
/// Only people holding a role of `category` are candidates. A candidate
/// whose roles all belong to `category` is obviated and left with the
/// `none` role. A candidate that also holds roles of the other category
/// stays live and only loses its `category` roles.
pub(crate) async fn obviate_people(
    ctx: &SyncContext,
    tenants: &TenantMap,
    category: RoleCategory,
    keep: &HashSet<Id>,
) -> SyncResult<Vec<Id>> {
    let store = &ctx.store;
    let mut seen = HashSet::new();
    let mut obviated = Vec::new();

    for tenant_id in tenants.ids() {
        let mut candidates = Vec::new();

        for person in store.people.find_live_in(tenant_id).await? {
            if keep.contains(&person.id) || !seen.insert(person.id) {
                continue;
            }

            let roles = store.links.roles(person.id).await?;
            let (ours, others): (Vec<Role>, Vec<Role>) = roles
                .iter()
                .copied()
                .filter(|r| *r != Role::None)
                .partition(|r| r.category() == Some(category));
            if ours.is_empty() {
                continue;
            }

            if others.is_empty() {
                store.links.remove_roles(person.id, &ours).await?;
                store.links.assign_roles(person.id, &[Role::None]).await?;
                candidates.push(person);
            } else {
                tracing::warn!(
                    "Skipped removal of {} ({}) due to mixed roles, dropping {:?} only",
                    person.full_name(),
                    person.id,
                    ours
                );
                store.links.remove_roles(person.id, &ours).await?;
            }
        }

        let rows = obviate_stale(store.people.as_ref(), candidates, keep).await?;
        obviated.extend(ids(&rows));
    }

    Ok(obviated)
}
