use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Entity, Id};

/// Natural key of a schedule: offering, weekday and start time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduleKey {
    pub offering_id: Id,
    pub day: Weekday,
    pub start_time: NaiveTime,
}

impl fmt::Display for ScheduleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} on {} at {}",
            self.offering_id,
            self.day,
            self.start_time.format("%H:%M")
        )
    }
}

/// A weekly recurring time slot of an offering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Id,
    pub offering_id: Id,
    pub room_id: Option<Id>,
    pub day: Weekday,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub comments: Option<String>,
    pub obviated_at: Option<DateTime<Utc>>,
}

impl Schedule {
    pub fn new(offering_id: Id, day: Weekday, start_time: NaiveTime, end_time: NaiveTime) -> Self {
        Self {
            id: 0,
            offering_id,
            room_id: None,
            day,
            start_time,
            end_time,
            comments: None,
            obviated_at: None,
        }
    }
}

impl Entity for Schedule {
    type Key = ScheduleKey;
    const KIND: &'static str = "schedules";

    fn id(&self) -> Id {
        self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }

    fn key(&self) -> ScheduleKey {
        ScheduleKey {
            offering_id: self.offering_id,
            day: self.day,
            start_time: self.start_time,
        }
    }

    fn obviated_at(&self) -> Option<DateTime<Utc>> {
        self.obviated_at
    }

    fn set_obviated_at(&mut self, at: Option<DateTime<Utc>>) {
        self.obviated_at = at;
    }
}
