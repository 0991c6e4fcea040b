//! Soft-delete of rows that vanished from the source.

use std::collections::HashSet;
use std::future::Future;

use super::{SyncResult, TenantMap};
use crate::models::{Entity, Id};
use crate::store::Repository;

/// Obviates the live rows of `live` that are not in `keep`.
///
/// Already obviated rows are never candidates, so repeated runs leave
/// their stamps untouched. Returns the rows as stored after the call.
pub(crate) async fn obviate_stale<E: Entity>(
    repo: &dyn Repository<E>,
    live: Vec<E>,
    keep: &HashSet<Id>,
) -> SyncResult<Vec<E>> {
    let candidates: Vec<E> = live
        .into_iter()
        .filter(|row| !row.is_obviated() && !keep.contains(&row.id()))
        .collect();

    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    for row in &candidates {
        tracing::info!("Obviating {} {}", E::KIND, row.key());
    }
    Ok(repo.obviate_batch(candidates).await?)
}

/// Runs [`obviate_stale`] once per tenant of the run.
///
/// `finder` lists the live rows a tenant owns. Rows reported under more than
/// one tenant are obviated once.
pub(crate) async fn obviate_per_tenant<E, F, Fut>(
    tenants: &TenantMap,
    finder: F,
    repo: &dyn Repository<E>,
    keep: &HashSet<Id>,
) -> SyncResult<Vec<E>>
where
    E: Entity,
    F: Fn(Id) -> Fut,
    Fut: Future<Output = SyncResult<Vec<E>>>,
{
    let mut seen = HashSet::new();
    let mut obviated = Vec::new();

    for tenant_id in tenants.ids() {
        let live: Vec<E> = finder(tenant_id)
            .await?
            .into_iter()
            .filter(|row| seen.insert(row.id()))
            .collect();
        obviated.extend(obviate_stale(repo, live, keep).await?);
    }

    Ok(obviated)
}

pub(crate) fn ids<E: Entity>(rows: &[E]) -> Vec<Id> {
    rows.iter().map(Entity::id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Room, TenantKey};
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_only_unkept_live_rows_are_obviated() {
        let store = MemoryStore::new();
        let rooms = Repository::<Room>::create_batch(
            &store,
            vec![Room::new(1, "A"), Room::new(1, "B"), Room::new(2, "C")],
        )
        .await
        .unwrap();

        let tenants: TenantMap = vec![(1, TenantKey::new("1"))].into_iter().collect();
        let keep: HashSet<Id> = [rooms[0].id].into_iter().collect();

        let obviated = obviate_per_tenant::<Room, _, _>(
            &tenants,
            |tenant_id| {
                let store = &store;
                async move {
                    Repository::<Room>::find_live_in(store, tenant_id)
                        .await
                        .map_err(crate::sync::SyncError::from)
                }
            },
            &store,
            &keep,
        )
        .await
        .unwrap();

        assert_eq!(ids(&obviated), vec![rooms[1].id]);

        let stored = store.rows::<Room>().await;
        assert!(!stored[0].is_obviated());
        assert!(stored[1].is_obviated());
        // Other tenants are out of reach
        assert!(!stored[2].is_obviated());
    }

    #[tokio::test]
    async fn test_second_pass_leaves_stamps_alone() {
        let store = MemoryStore::new();
        let rooms = Repository::<Room>::create_batch(&store, vec![Room::new(1, "A")])
            .await
            .unwrap();
        let keep = HashSet::new();

        let first = obviate_stale::<Room>(&store, rooms.clone(), &keep).await.unwrap();
        let stamp = first[0].obviated_at;

        let stored = store.rows::<Room>().await;
        let second = obviate_stale::<Room>(&store, stored, &keep).await.unwrap();
        assert!(second.is_empty());
        assert_eq!(store.rows::<Room>().await[0].obviated_at, stamp);
    }
}
