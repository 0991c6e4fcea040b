use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Entity, Id};

/// A person known to one tenant.
///
/// The natural key is the linked identity record. Roles, memberships,
/// enrollments and guardian links are stored as separate relation rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: Id,
    pub identity_id: Id,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    /// 0 for people with their own phone, 1.. for dependents sharing a
    /// guardian's phone.
    pub dependence_order: i32,
    pub obviated_at: Option<DateTime<Utc>>,
}

impl Person {
    pub fn new(
        identity_id: Id,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        phone: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            identity_id,
            first_name: first_name.into(),
            last_name: last_name.into(),
            phone: phone.into(),
            dependence_order: 0,
            obviated_at: None,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }

    pub fn is_dependent(&self) -> bool {
        self.dependence_order > 0
    }
}

impl Entity for Person {
    type Key = Id;
    const KIND: &'static str = "people";

    fn id(&self) -> Id {
        self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }

    fn key(&self) -> Id {
        self.identity_id
    }

    fn obviated_at(&self) -> Option<DateTime<Utc>> {
        self.obviated_at
    }

    fn set_obviated_at(&mut self, at: Option<DateTime<Utc>>) {
        self.obviated_at = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_name_trims_parts() {
        let person = Person::new(1, " Ada ", "Lovelace ", "+301");
        assert_eq!(person.full_name(), "Ada Lovelace");
    }
}
