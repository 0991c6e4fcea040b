use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Entity, Id};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BookKey {
    pub tenant_id: Id,
    pub name: String,
}

impl fmt::Display for BookKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.name)
    }
}

/// Reference material linked to offerings.
///
/// Books are append-only: they are updated in place when they reappear but
/// never obviated, so the obviation accessors are no-ops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: Id,
    pub tenant_id: Id,
    pub name: String,
    pub publisher: Option<String>,
    pub info: Option<String>,
}

impl Book {
    pub fn new(tenant_id: Id, name: impl Into<String>) -> Self {
        Self {
            id: 0,
            tenant_id,
            name: name.into(),
            publisher: None,
            info: None,
        }
    }
}

impl Entity for Book {
    type Key = BookKey;
    const KIND: &'static str = "books";

    fn id(&self) -> Id {
        self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }

    fn key(&self) -> BookKey {
        BookKey {
            tenant_id: self.tenant_id,
            name: self.name.clone(),
        }
    }

    fn obviated_at(&self) -> Option<DateTime<Utc>> {
        None
    }

    fn set_obviated_at(&mut self, _at: Option<DateTime<Utc>>) {}
}
