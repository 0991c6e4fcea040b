use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Entity, Id};

/// Natural key of an offering: the owning tenant plus the offering code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OfferingKey {
    pub tenant_id: Id,
    pub code: String,
}

impl OfferingKey {
    pub fn new(tenant_id: Id, code: impl Into<String>) -> Self {
        Self {
            tenant_id,
            code: code.into(),
        }
    }
}

impl fmt::Display for OfferingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.code)
    }
}

/// A course offered by a tenant over a date range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offering {
    pub id: Id,
    pub tenant_id: Id,
    pub code: String,
    pub name: String,
    pub sub_name: Option<String>,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    /// Reference material used by the offering.
    pub book_ids: Vec<Id>,
    pub obviated_at: Option<DateTime<Utc>>,
}

impl Offering {
    pub fn new(
        tenant_id: Id,
        code: impl Into<String>,
        name: impl Into<String>,
        first_date: NaiveDate,
        last_date: NaiveDate,
    ) -> Self {
        Self {
            id: 0,
            tenant_id,
            code: code.into(),
            name: name.into(),
            sub_name: None,
            first_date,
            last_date,
            book_ids: Vec::new(),
            obviated_at: None,
        }
    }
}

impl Entity for Offering {
    type Key = OfferingKey;
    const KIND: &'static str = "offerings";

    fn id(&self) -> Id {
        self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }

    fn key(&self) -> OfferingKey {
        OfferingKey::new(self.tenant_id, self.code.clone())
    }

    fn obviated_at(&self) -> Option<DateTime<Utc>> {
        self.obviated_at
    }

    fn set_obviated_at(&mut self, at: Option<DateTime<Utc>>) {
        self.obviated_at = at;
    }
}
