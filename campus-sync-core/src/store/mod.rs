//! Store contract consumed by the reconciliation engine.
//!
//! Every entity kind is served by a [`Repository`]; person relations and
//! identity records have their own traits. [`Store`] bundles them as shared
//! trait objects so the engine never depends on a concrete backend.

mod memory;

pub use memory::{MemoryState, MemoryStore, MemoryTable};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

use crate::models::{
    Book, Entity, Id, Identity, Occurrence, Offering, Person, Role, Room, Schedule, Tenant,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} row {id} not found")]
    NotFound { kind: &'static str, id: Id },

    #[error("{kind} key {key} is already taken")]
    DuplicateKey { kind: &'static str, key: String },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Per-kind persistence operations.
///
/// Batch calls are atomic: either every item is written or none is.
#[async_trait]
pub trait Repository<E: Entity>: Send + Sync {
    /// Finds the row with `key`, live or obviated.
    async fn find_by_key(&self, key: &E::Key) -> StoreResult<Option<E>>;

    async fn find_by_id(&self, id: Id) -> StoreResult<Option<E>>;

    /// Live rows owned by `scope`: the tenant for tenants, offerings, books,
    /// rooms and people, the offering for schedules, the schedule for
    /// occurrences.
    async fn find_live_in(&self, scope: Id) -> StoreResult<Vec<E>>;

    async fn find_all_live(&self) -> StoreResult<Vec<E>>;

    /// Inserts rows and returns them with their assigned ids.
    async fn create_batch(&self, items: Vec<E>) -> StoreResult<Vec<E>>;

    /// Overwrites every field except the obviation stamp.
    async fn update_batch(&self, items: Vec<E>) -> StoreResult<Vec<E>>;

    /// Clears the obviation stamp.
    async fn restore_batch(&self, items: Vec<E>) -> StoreResult<Vec<E>>;

    /// Soft-deletes rows by stamping them with the current time.
    async fn obviate_batch(&self, items: Vec<E>) -> StoreResult<Vec<E>>;

    /// Hard-deletes rows obviated before `before`.
    async fn purge_obviated(&self, before: DateTime<Utc>) -> StoreResult<u64>;
}

/// Relation rows hanging off a person.
#[async_trait]
pub trait PersonLinks: Send + Sync {
    async fn roles(&self, person: Id) -> StoreResult<BTreeSet<Role>>;

    async fn assign_roles(&self, person: Id, roles: &[Role]) -> StoreResult<()>;

    async fn remove_roles(&self, person: Id, roles: &[Role]) -> StoreResult<()>;

    async fn tenants(&self, person: Id) -> StoreResult<BTreeSet<Id>>;

    async fn add_tenant(&self, person: Id, tenant: Id) -> StoreResult<()>;

    async fn offerings(&self, person: Id) -> StoreResult<BTreeSet<Id>>;

    async fn enroll(&self, person: Id, offerings: &[Id]) -> StoreResult<()>;

    async fn unenroll(&self, person: Id, offerings: &[Id]) -> StoreResult<()>;

    async fn dependents(&self, guardian: Id) -> StoreResult<Vec<Id>>;

    async fn link_dependent(&self, guardian: Id, dependent: Id) -> StoreResult<()>;
}

/// External identity records.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_user_name(&self, user_name: &str) -> StoreResult<Option<Identity>>;

    async fn find_identity(&self, id: Id) -> StoreResult<Option<Identity>>;

    async fn create_identity(&self, identity: Identity) -> StoreResult<Identity>;

    async fn update_identity(&self, identity: Identity) -> StoreResult<Identity>;

    /// Deletes identity records no person row refers to.
    async fn purge_orphans(&self) -> StoreResult<u64>;
}

/// Every repository the engine needs, behind shared trait objects.
#[derive(Clone)]
pub struct Store {
    pub tenants: Arc<dyn Repository<Tenant>>,
    pub offerings: Arc<dyn Repository<Offering>>,
    pub books: Arc<dyn Repository<Book>>,
    pub schedules: Arc<dyn Repository<Schedule>>,
    pub rooms: Arc<dyn Repository<Room>>,
    pub occurrences: Arc<dyn Repository<Occurrence>>,
    pub people: Arc<dyn Repository<Person>>,
    pub links: Arc<dyn PersonLinks>,
    pub identities: Arc<dyn IdentityStore>,
}

impl Store {
    /// Builds a store whose repositories are all served by one backend.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: Repository<Tenant>
            + Repository<Offering>
            + Repository<Book>
            + Repository<Schedule>
            + Repository<Room>
            + Repository<Occurrence>
            + Repository<Person>
            + PersonLinks
            + IdentityStore
            + 'static,
    {
        Self {
            tenants: backend.clone(),
            offerings: backend.clone(),
            books: backend.clone(),
            schedules: backend.clone(),
            rooms: backend.clone(),
            occurrences: backend.clone(),
            people: backend.clone(),
            links: backend.clone(),
            identities: backend,
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}
