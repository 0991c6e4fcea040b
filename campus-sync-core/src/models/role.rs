use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Category a role belongs to. Drives the obviation exemption rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleCategory {
    Client,
    Staff,
}

impl fmt::Display for RoleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleCategory::Client => write!(f, "client"),
            RoleCategory::Staff => write!(f, "staff"),
        }
    }
}

/// A role assignment tag on a person.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Placeholder left on obviated people.
    None,
    Student,
    Parent,
    Teacher,
    Secretary,
    SchoolAdmin,
    SchoolOwner,
}

impl Role {
    pub fn category(self) -> Option<RoleCategory> {
        match self {
            Role::None => None,
            Role::Student | Role::Parent => Some(RoleCategory::Client),
            Role::Teacher | Role::Secretary | Role::SchoolAdmin | Role::SchoolOwner => {
                Some(RoleCategory::Staff)
            }
        }
    }

    pub fn is_staff(self) -> bool {
        self.category() == Some(RoleCategory::Staff)
    }

    pub fn is_client(self) -> bool {
        self.category() == Some(RoleCategory::Client)
    }

    /// Roles that log into the back office and therefore get a password.
    pub fn is_backend(self) -> bool {
        matches!(self, Role::SchoolAdmin | Role::SchoolOwner)
    }

    /// The only legal overlap between categories is a staff role together
    /// with the guardian (`Parent`) role.
    pub fn may_coexist_with(self, other: Role) -> bool {
        (self.is_staff() && other == Role::Parent) || (self == Role::Parent && other.is_staff())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::None => write!(f, "none"),
            Role::Student => write!(f, "student"),
            Role::Parent => write!(f, "parent"),
            Role::Teacher => write!(f, "teacher"),
            Role::Secretary => write!(f, "secretary"),
            Role::SchoolAdmin => write!(f, "school_admin"),
            Role::SchoolOwner => write!(f, "school_owner"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Role::None),
            "student" => Ok(Role::Student),
            "parent" => Ok(Role::Parent),
            "teacher" => Ok(Role::Teacher),
            "secretary" => Ok(Role::Secretary),
            "school_admin" => Ok(Role::SchoolAdmin),
            "school_owner" => Ok(Role::SchoolOwner),
            _ => Err(format!(
                "Invalid role '{}'. Valid options: none, student, parent, teacher, secretary, school_admin, school_owner",
                s
            )),
        }
    }
}
