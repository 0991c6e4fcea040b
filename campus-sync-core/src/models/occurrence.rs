use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{Entity, Id};

/// Origin of an occurrence row.
///
/// Only `Scheduled` rows were generated from a schedule and stay under the
/// engine's authority; the others were created or edited by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OccurrenceStatus {
    Scheduled,
    Manual,
    Canceled,
}

impl fmt::Display for OccurrenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OccurrenceStatus::Scheduled => write!(f, "scheduled"),
            OccurrenceStatus::Manual => write!(f, "manual"),
            OccurrenceStatus::Canceled => write!(f, "canceled"),
        }
    }
}

impl FromStr for OccurrenceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "scheduled" => Ok(OccurrenceStatus::Scheduled),
            "manual" => Ok(OccurrenceStatus::Manual),
            "canceled" => Ok(OccurrenceStatus::Canceled),
            _ => Err(format!(
                "Invalid occurrence status '{}'. Valid options: scheduled, manual, canceled",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OccurrenceKey {
    pub offering_id: Id,
    pub start_at: DateTime<Utc>,
}

impl fmt::Display for OccurrenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.offering_id, self.start_at.to_rfc3339())
    }
}

/// A single dated instance of a schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Occurrence {
    pub id: Id,
    pub offering_id: Id,
    pub schedule_id: Option<Id>,
    pub room_id: Option<Id>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub status: OccurrenceStatus,
    pub obviated_at: Option<DateTime<Utc>>,
}

impl Occurrence {
    pub fn is_scheduled(&self) -> bool {
        self.status == OccurrenceStatus::Scheduled
    }
}

impl Entity for Occurrence {
    type Key = OccurrenceKey;
    const KIND: &'static str = "occurrences";

    fn id(&self) -> Id {
        self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }

    fn key(&self) -> OccurrenceKey {
        OccurrenceKey {
            offering_id: self.offering_id,
            start_at: self.start_at,
        }
    }

    fn obviated_at(&self) -> Option<DateTime<Utc>> {
        self.obviated_at
    }

    fn set_obviated_at(&mut self, at: Option<DateTime<Utc>>) {
        self.obviated_at = at;
    }
}
