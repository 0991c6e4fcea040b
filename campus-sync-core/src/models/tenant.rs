use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Entity, Id};

/// Natural key of a tenant: its short external code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantKey(String);

impl TenantKey {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An organization. Owns every other entity transitively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Id,
    pub code: String,
    pub name: String,
    /// IANA time zone name, e.g. `Europe/Athens`.
    pub timezone: String,
    pub locale: String,
    /// Prefix for phone numbers written without one, e.g. `+30`.
    pub phone_country_code: String,
    pub obviated_at: Option<DateTime<Utc>>,
}

impl Tenant {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: 0,
            code: code.into(),
            name: name.into(),
            timezone: "UTC".to_string(),
            locale: "en-US".to_string(),
            phone_country_code: String::new(),
            obviated_at: None,
        }
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    pub fn with_phone_country_code(mut self, code: impl Into<String>) -> Self {
        self.phone_country_code = code.into();
        self
    }
}

impl Entity for Tenant {
    type Key = TenantKey;
    const KIND: &'static str = "tenants";

    fn id(&self) -> Id {
        self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }

    fn key(&self) -> TenantKey {
        TenantKey::new(self.code.clone())
    }

    fn obviated_at(&self) -> Option<DateTime<Utc>> {
        self.obviated_at
    }

    fn set_obviated_at(&mut self, at: Option<DateTime<Utc>>) {
        self.obviated_at = at;
    }
}
