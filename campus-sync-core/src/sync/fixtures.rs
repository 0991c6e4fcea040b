//! Records and harness shared by the engine tests.

use serde_json::json;
use std::sync::Arc;

use super::{Orchestrator, SyncContext, SyncOptions};
use crate::models::Role;
use crate::source::{RawRecord, RecordKind, StaticSource};
use crate::store::{MemoryStore, Store};

pub(crate) struct Harness {
    pub backend: Arc<MemoryStore>,
    pub source: Arc<StaticSource>,
    pub orchestrator: Orchestrator,
}

impl Harness {
    pub fn new() -> Self {
        let backend = Arc::new(MemoryStore::new());
        let source = Arc::new(StaticSource::new());
        let orchestrator = Orchestrator::new(
            Store::from_backend(backend.clone()),
            source.clone(),
            SyncOptions::default(),
        );
        Self {
            backend,
            source,
            orchestrator,
        }
    }

    pub fn context(&self) -> SyncContext {
        self.orchestrator.context().clone()
    }

    /// Tenant `42` with `MATH1` on Mondays 10:00-11:00 in room `R1`.
    pub fn seed_scenario(&self) {
        self.source
            .set(RecordKind::Tenant, vec![tenant("42", "Acme", "UTC")]);
        self.source.set(
            RecordKind::Offering,
            vec![offering("42", "MATH1", "2024-01-01", "2024-03-31")],
        );
        self.source.set(
            RecordKind::Schedule,
            vec![schedule("42", "MATH1", "Monday", "10:00", "11:00", Some("R1"))],
        );
    }
}

pub(crate) fn tenant(code: &str, name: &str, timezone: &str) -> RawRecord {
    RawRecord::new(
        name,
        Some(code),
        json!({
            "code": code,
            "name": name,
            "timezone": timezone,
            "phone_country_code": "+30"
        }),
    )
}

pub(crate) fn offering(tenant: &str, code: &str, first: &str, last: &str) -> RawRecord {
    RawRecord::new(
        code,
        Some(tenant),
        json!({
            "code": code,
            "name": format!("Course {}", code),
            "first_date": first,
            "last_date": last,
            "books": [{ "name": format!("{} handbook", code) }]
        }),
    )
}

pub(crate) fn schedule(
    tenant: &str,
    course: &str,
    day: &str,
    start: &str,
    end: &str,
    room: Option<&str>,
) -> RawRecord {
    RawRecord::new(
        format!("{} {} {}", course, day, start),
        Some(tenant),
        json!({
            "course_code": course,
            "day": day,
            "start_time": start,
            "end_time": end,
            "room": room
        }),
    )
}

pub(crate) fn staff(tenant: &str, first: &str, phone: &str, role: Role) -> RawRecord {
    RawRecord::new(
        first,
        Some(tenant),
        json!({
            "first_name": first,
            "last_name": "Staff",
            "phone": phone,
            "role": role,
            "course_codes": []
        }),
    )
}

/// A student with their own phone.
pub(crate) fn student(tenant: &str, first: &str, phone: &str) -> RawRecord {
    RawRecord::new(
        first,
        Some(tenant),
        json!({
            "first_name": first,
            "last_name": "Student",
            "phone": phone
        }),
    )
}

/// A student sharing the phone of their guardian.
pub(crate) fn dependent(
    tenant: &str,
    first: &str,
    guardian: &str,
    guardian_phone: &str,
) -> RawRecord {
    RawRecord::new(
        first,
        Some(tenant),
        json!({
            "first_name": first,
            "last_name": "Student",
            "parent1": {
                "first_name": guardian,
                "last_name": "Guardian",
                "phone": guardian_phone
            }
        }),
    )
}
