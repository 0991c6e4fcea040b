//! In-memory store backend.
//!
//! All tables live behind one `tokio::sync::Mutex`, so concurrent phases
//! sharing the store have their writes serialized.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tokio::sync::Mutex;

use super::{IdentityStore, PersonLinks, Repository, StoreError, StoreResult};
use crate::models::{
    Book, Entity, Id, Identity, Occurrence, Offering, Person, Role, Room, Schedule, Tenant,
};

/// Tables and relation rows of a [`MemoryStore`].
#[derive(Debug, Default)]
pub struct MemoryState {
    next_id: Id,
    tenants: BTreeMap<Id, Tenant>,
    offerings: BTreeMap<Id, Offering>,
    books: BTreeMap<Id, Book>,
    schedules: BTreeMap<Id, Schedule>,
    rooms: BTreeMap<Id, Room>,
    occurrences: BTreeMap<Id, Occurrence>,
    people: BTreeMap<Id, Person>,
    identities: BTreeMap<Id, Identity>,
    person_roles: BTreeSet<(Id, Role)>,
    person_tenants: BTreeSet<(Id, Id)>,
    person_offerings: BTreeSet<(Id, Id)>,
    guardianships: BTreeSet<(Id, Id)>,
}

impl MemoryState {
    fn next_id(&mut self) -> Id {
        self.next_id += 1;
        self.next_id
    }
}

/// Binds an entity to its table inside [`MemoryState`].
pub trait MemoryTable: Entity {
    fn table(state: &MemoryState) -> &BTreeMap<Id, Self>;

    fn table_mut(state: &mut MemoryState) -> &mut BTreeMap<Id, Self>;

    fn in_scope(state: &MemoryState, row: &Self, scope: Id) -> bool;

    /// Drops relation rows of purged ids.
    fn on_purge(_state: &mut MemoryState, _ids: &[Id]) {}
}

impl MemoryTable for Tenant {
    fn table(state: &MemoryState) -> &BTreeMap<Id, Self> {
        &state.tenants
    }

    fn table_mut(state: &mut MemoryState) -> &mut BTreeMap<Id, Self> {
        &mut state.tenants
    }

    fn in_scope(_state: &MemoryState, row: &Self, scope: Id) -> bool {
        row.id == scope
    }
}

impl MemoryTable for Offering {
    fn table(state: &MemoryState) -> &BTreeMap<Id, Self> {
        &state.offerings
    }

    fn table_mut(state: &mut MemoryState) -> &mut BTreeMap<Id, Self> {
        &mut state.offerings
    }

    fn in_scope(_state: &MemoryState, row: &Self, scope: Id) -> bool {
        row.tenant_id == scope
    }
}

impl MemoryTable for Book {
    fn table(state: &MemoryState) -> &BTreeMap<Id, Self> {
        &state.books
    }

    fn table_mut(state: &mut MemoryState) -> &mut BTreeMap<Id, Self> {
        &mut state.books
    }

    fn in_scope(_state: &MemoryState, row: &Self, scope: Id) -> bool {
        row.tenant_id == scope
    }
}

impl MemoryTable for Schedule {
    fn table(state: &MemoryState) -> &BTreeMap<Id, Self> {
        &state.schedules
    }

    fn table_mut(state: &mut MemoryState) -> &mut BTreeMap<Id, Self> {
        &mut state.schedules
    }

    fn in_scope(_state: &MemoryState, row: &Self, scope: Id) -> bool {
        row.offering_id == scope
    }
}

impl MemoryTable for Room {
    fn table(state: &MemoryState) -> &BTreeMap<Id, Self> {
        &state.rooms
    }

    fn table_mut(state: &mut MemoryState) -> &mut BTreeMap<Id, Self> {
        &mut state.rooms
    }

    fn in_scope(_state: &MemoryState, row: &Self, scope: Id) -> bool {
        row.tenant_id == scope
    }
}

impl MemoryTable for Occurrence {
    fn table(state: &MemoryState) -> &BTreeMap<Id, Self> {
        &state.occurrences
    }

    fn table_mut(state: &mut MemoryState) -> &mut BTreeMap<Id, Self> {
        &mut state.occurrences
    }

    fn in_scope(_state: &MemoryState, row: &Self, scope: Id) -> bool {
        row.schedule_id == Some(scope)
    }
}

impl MemoryTable for Person {
    fn table(state: &MemoryState) -> &BTreeMap<Id, Self> {
        &state.people
    }

    fn table_mut(state: &mut MemoryState) -> &mut BTreeMap<Id, Self> {
        &mut state.people
    }

    fn in_scope(state: &MemoryState, row: &Self, scope: Id) -> bool {
        state.person_tenants.contains(&(row.id, scope))
    }

    fn on_purge(state: &mut MemoryState, ids: &[Id]) {
        let purged: HashSet<Id> = ids.iter().copied().collect();
        state.person_roles.retain(|(p, _)| !purged.contains(p));
        state.person_tenants.retain(|(p, _)| !purged.contains(p));
        state.person_offerings.retain(|(p, _)| !purged.contains(p));
        state
            .guardianships
            .retain(|(g, d)| !purged.contains(g) && !purged.contains(d));
    }
}

/// Store backend keeping everything in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every row of a kind, live or obviated, in id order.
    pub async fn rows<E: MemoryTable>(&self) -> Vec<E> {
        let state = self.state.lock().await;
        E::table(&state).values().cloned().collect()
    }

    pub async fn identities(&self) -> Vec<Identity> {
        let state = self.state.lock().await;
        state.identities.values().cloned().collect()
    }

    fn stamp<E: MemoryTable>(
        state: &mut MemoryState,
        items: Vec<E>,
        at: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<E>> {
        let table = E::table_mut(state);
        if let Some(missing) = items.iter().find(|i| !table.contains_key(&i.id())) {
            return Err(StoreError::NotFound {
                kind: E::KIND,
                id: missing.id(),
            });
        }

        let mut stamped = Vec::with_capacity(items.len());
        for item in items {
            if let Some(row) = table.get_mut(&item.id()) {
                match at {
                    // Keep the original stamp of rows that are already obviated
                    Some(_) if row.is_obviated() => {}
                    _ => row.set_obviated_at(at),
                }
                stamped.push(row.clone());
            }
        }
        Ok(stamped)
    }
}

#[async_trait]
impl<E: MemoryTable> Repository<E> for MemoryStore {
    async fn find_by_key(&self, key: &E::Key) -> StoreResult<Option<E>> {
        let state = self.state.lock().await;
        Ok(E::table(&state).values().find(|r| &r.key() == key).cloned())
    }

    async fn find_by_id(&self, id: Id) -> StoreResult<Option<E>> {
        let state = self.state.lock().await;
        Ok(E::table(&state).get(&id).cloned())
    }

    async fn find_live_in(&self, scope: Id) -> StoreResult<Vec<E>> {
        let state = self.state.lock().await;
        Ok(E::table(&state)
            .values()
            .filter(|r| !r.is_obviated() && E::in_scope(&state, r, scope))
            .cloned()
            .collect())
    }

    async fn find_all_live(&self) -> StoreResult<Vec<E>> {
        let state = self.state.lock().await;
        Ok(E::table(&state)
            .values()
            .filter(|r| !r.is_obviated())
            .cloned()
            .collect())
    }

    async fn create_batch(&self, items: Vec<E>) -> StoreResult<Vec<E>> {
        let mut state = self.state.lock().await;

        let mut keys: HashSet<E::Key> = E::table(&state).values().map(|r| r.key()).collect();
        for item in &items {
            if !keys.insert(item.key()) {
                return Err(StoreError::DuplicateKey {
                    kind: E::KIND,
                    key: item.key().to_string(),
                });
            }
        }

        let mut created = Vec::with_capacity(items.len());
        for mut item in items {
            let id = state.next_id();
            item.set_id(id);
            E::table_mut(&mut state).insert(id, item.clone());
            created.push(item);
        }
        Ok(created)
    }

    async fn update_batch(&self, items: Vec<E>) -> StoreResult<Vec<E>> {
        let mut state = self.state.lock().await;

        let table = E::table(&state);
        for item in &items {
            if !table.contains_key(&item.id()) {
                return Err(StoreError::NotFound {
                    kind: E::KIND,
                    id: item.id(),
                });
            }
            let key = item.key();
            if table.values().any(|r| r.id() != item.id() && r.key() == key) {
                return Err(StoreError::DuplicateKey {
                    kind: E::KIND,
                    key: key.to_string(),
                });
            }
        }

        let table = E::table_mut(&mut state);
        let mut updated = Vec::with_capacity(items.len());
        for mut item in items {
            let stamp = table.get(&item.id()).and_then(|r| r.obviated_at());
            item.set_obviated_at(stamp);
            table.insert(item.id(), item.clone());
            updated.push(item);
        }
        Ok(updated)
    }

    async fn restore_batch(&self, items: Vec<E>) -> StoreResult<Vec<E>> {
        let mut state = self.state.lock().await;
        Self::stamp(&mut state, items, None)
    }

    async fn obviate_batch(&self, items: Vec<E>) -> StoreResult<Vec<E>> {
        let mut state = self.state.lock().await;
        Self::stamp(&mut state, items, Some(Utc::now()))
    }

    async fn purge_obviated(&self, before: DateTime<Utc>) -> StoreResult<u64> {
        let mut state = self.state.lock().await;

        let ids: Vec<Id> = E::table(&state)
            .values()
            .filter(|r| r.obviated_at().is_some_and(|at| at < before))
            .map(|r| r.id())
            .collect();

        let table = E::table_mut(&mut state);
        for id in &ids {
            table.remove(id);
        }
        E::on_purge(&mut state, &ids);

        Ok(ids.len() as u64)
    }
}

#[async_trait]
impl PersonLinks for MemoryStore {
    async fn roles(&self, person: Id) -> StoreResult<BTreeSet<Role>> {
        let state = self.state.lock().await;
        Ok(state
            .person_roles
            .iter()
            .filter(|(p, _)| *p == person)
            .map(|(_, r)| *r)
            .collect())
    }

    async fn assign_roles(&self, person: Id, roles: &[Role]) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        for role in roles {
            state.person_roles.insert((person, *role));
        }
        Ok(())
    }

    async fn remove_roles(&self, person: Id, roles: &[Role]) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        for role in roles {
            state.person_roles.remove(&(person, *role));
        }
        Ok(())
    }

    async fn tenants(&self, person: Id) -> StoreResult<BTreeSet<Id>> {
        let state = self.state.lock().await;
        Ok(state
            .person_tenants
            .iter()
            .filter(|(p, _)| *p == person)
            .map(|(_, t)| *t)
            .collect())
    }

    async fn add_tenant(&self, person: Id, tenant: Id) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state.person_tenants.insert((person, tenant));
        Ok(())
    }

    async fn offerings(&self, person: Id) -> StoreResult<BTreeSet<Id>> {
        let state = self.state.lock().await;
        Ok(state
            .person_offerings
            .iter()
            .filter(|(p, _)| *p == person)
            .map(|(_, o)| *o)
            .collect())
    }

    async fn enroll(&self, person: Id, offerings: &[Id]) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        for offering in offerings {
            state.person_offerings.insert((person, *offering));
        }
        Ok(())
    }

    async fn unenroll(&self, person: Id, offerings: &[Id]) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        for offering in offerings {
            state.person_offerings.remove(&(person, *offering));
        }
        Ok(())
    }

    async fn dependents(&self, guardian: Id) -> StoreResult<Vec<Id>> {
        let state = self.state.lock().await;
        Ok(state
            .guardianships
            .iter()
            .filter(|(g, _)| *g == guardian)
            .map(|(_, d)| *d)
            .collect())
    }

    async fn link_dependent(&self, guardian: Id, dependent: Id) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state.guardianships.insert((guardian, dependent));
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn find_by_user_name(&self, user_name: &str) -> StoreResult<Option<Identity>> {
        let state = self.state.lock().await;
        Ok(state
            .identities
            .values()
            .find(|i| i.user_name == user_name)
            .cloned())
    }

    async fn find_identity(&self, id: Id) -> StoreResult<Option<Identity>> {
        let state = self.state.lock().await;
        Ok(state.identities.get(&id).cloned())
    }

    async fn create_identity(&self, mut identity: Identity) -> StoreResult<Identity> {
        let mut state = self.state.lock().await;
        if state
            .identities
            .values()
            .any(|i| i.user_name == identity.user_name)
        {
            return Err(StoreError::DuplicateKey {
                kind: "identities",
                key: identity.user_name,
            });
        }
        identity.id = state.next_id();
        state.identities.insert(identity.id, identity.clone());
        Ok(identity)
    }

    async fn update_identity(&self, identity: Identity) -> StoreResult<Identity> {
        let mut state = self.state.lock().await;
        match state.identities.get_mut(&identity.id) {
            Some(row) => {
                *row = identity.clone();
                Ok(identity)
            }
            None => Err(StoreError::NotFound {
                kind: "identities",
                id: identity.id,
            }),
        }
    }

    async fn purge_orphans(&self) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        let referenced: HashSet<Id> = state.people.values().map(|p| p.identity_id).collect();
        let before = state.identities.len();
        state.identities.retain(|id, _| referenced.contains(id));
        Ok((before - state.identities.len()) as u64)
    }
}
