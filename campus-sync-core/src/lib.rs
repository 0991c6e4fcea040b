//! Campus Sync Core Library
//!
//! Domain models, store and source contracts, and the reconciliation engine
//! that mirrors content-source records into a multi-tenant store.

pub mod models;
pub mod source;
pub mod store;
pub mod sync;

pub use models::{
    Book, BookKey, Entity, Id, Identity, Occurrence, OccurrenceKey, OccurrenceStatus, Offering,
    OfferingKey, Person, Role, RoleCategory, Room, RoomKey, Schedule, ScheduleKey, Tenant,
    TenantKey,
};
pub use source::{RawRecord, RecordKind, SourceAdapter, SourceError, StaticSource};
pub use store::{
    IdentityStore, MemoryStore, PersonLinks, Repository, Store, StoreError, StoreResult,
};
pub use sync::{
    CleanupReport, Orchestrator, PhaseOutcome, RunReport, SyncContext, SyncError, SyncOptions,
    SyncResult,
};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
