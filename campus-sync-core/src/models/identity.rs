use serde::{Deserialize, Serialize};

use super::Id;

/// External identity (login) record backing a person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Id,
    /// Unique, tenant-scoped contact key, e.g. `42_306900000000`.
    pub user_name: String,
    pub phone: String,
    pub phone_confirmed: bool,
    pub password_hash: Option<String>,
}

impl Identity {
    pub fn new(user_name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            id: 0,
            user_name: user_name.into(),
            phone: phone.into(),
            phone_confirmed: false,
            password_hash: None,
        }
    }
}
