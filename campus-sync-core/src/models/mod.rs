mod book;
mod identity;
mod occurrence;
mod offering;
mod person;
mod role;
mod room;
mod schedule;
mod tenant;

pub use book::{Book, BookKey};
pub use identity::Identity;
pub use occurrence::{Occurrence, OccurrenceKey, OccurrenceStatus};
pub use offering::{Offering, OfferingKey};
pub use person::Person;
pub use role::{Role, RoleCategory};
pub use room::{Room, RoomKey};
pub use schedule::{Schedule, ScheduleKey};
pub use tenant::{Tenant, TenantKey};

use chrono::{DateTime, Utc};
use std::fmt;
use std::hash::Hash;

/// Store-assigned row identifier.
pub type Id = i64;

/// A row kind the reconciliation engine can match, upsert and obviate.
///
/// Every entity has a natural key that is unique within its owning scope.
/// Rows are either live (`obviated_at` is `None`) or obviated.
pub trait Entity: Clone + fmt::Debug + Send + Sync + 'static {
    type Key: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static;

    /// Plural, lowercase name used in log lines.
    const KIND: &'static str;

    fn id(&self) -> Id;

    fn set_id(&mut self, id: Id);

    fn key(&self) -> Self::Key;

    fn obviated_at(&self) -> Option<DateTime<Utc>>;

    fn set_obviated_at(&mut self, at: Option<DateTime<Utc>>);

    fn is_obviated(&self) -> bool {
        self.obviated_at().is_some()
    }

    /// Takes over the identity of `existing`: the store id and obviation
    /// stamp are kept, every other field comes from `self`.
    fn merged_into(mut self, existing: &Self) -> Self {
        self.set_id(existing.id());
        self.set_obviated_at(existing.obviated_at());
        self
    }
}
