use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Entity, Id};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoomKey {
    pub tenant_id: Id,
    pub name: String,
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: Id,
    pub tenant_id: Id,
    pub name: String,
    pub obviated_at: Option<DateTime<Utc>>,
}

impl Room {
    pub fn new(tenant_id: Id, name: impl Into<String>) -> Self {
        Self {
            id: 0,
            tenant_id,
            name: name.into(),
            obviated_at: None,
        }
    }
}

impl Entity for Room {
    type Key = RoomKey;
    const KIND: &'static str = "rooms";

    fn id(&self) -> Id {
        self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }

    fn key(&self) -> RoomKey {
        RoomKey {
            tenant_id: self.tenant_id,
            name: self.name.clone(),
        }
    }

    fn obviated_at(&self) -> Option<DateTime<Utc>> {
        self.obviated_at
    }

    fn set_obviated_at(&mut self, at: Option<DateTime<Utc>>) {
        self.obviated_at = at;
    }
}
