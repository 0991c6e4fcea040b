//! Typed field payloads per record kind.

use chrono::{NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Deserializer};

use crate::models::Role;

#[derive(Debug, Clone, Deserialize)]
pub struct TenantPayload {
    pub code: String,
    pub name: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default)]
    pub phone_country_code: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_locale() -> String {
    "en-US".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookPayload {
    pub name: String,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub info: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OfferingPayload {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub sub_name: Option<String>,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    #[serde(default)]
    pub books: Vec<BookPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulePayload {
    pub course_code: String,
    #[serde(deserialize_with = "weekday")]
    pub day: Weekday,
    #[serde(deserialize_with = "time_of_day")]
    pub start_time: NaiveTime,
    #[serde(deserialize_with = "time_of_day")]
    pub end_time: NaiveTime,
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub comments: Option<String>,
}

impl SchedulePayload {
    pub fn room_name(&self) -> Option<&str> {
        self.room.as_deref().map(str::trim).filter(|n| !n.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StaffPayload {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub role: Role,
    #[serde(default)]
    pub course_codes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GuardianPayload {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
}

/// A student together with up to two guardians.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientPayload {
    pub first_name: String,
    pub last_name: String,
    /// Own phone of a self-determined student. Dependents share their
    /// guardian's phone and leave this empty.
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub course_codes: Vec<String>,
    #[serde(default)]
    pub parent1: Option<GuardianPayload>,
    #[serde(default)]
    pub parent2: Option<GuardianPayload>,
}

impl ClientPayload {
    pub fn own_phone(&self) -> Option<&str> {
        self.phone.as_deref().map(str::trim).filter(|p| !p.is_empty())
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }

    pub fn guardians(&self) -> impl Iterator<Item = &GuardianPayload> {
        self.parent1.iter().chain(self.parent2.iter())
    }
}

fn weekday<'de, D>(deserializer: D) -> Result<Weekday, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.trim()
        .parse::<Weekday>()
        .map_err(|_| serde::de::Error::custom(format!("invalid weekday '{}'", raw)))
}

fn time_of_day<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|_| serde::de::Error::custom(format!("invalid time of day '{}'", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schedule_payload_accepts_short_times_and_day_names() {
        let payload: SchedulePayload = serde_json::from_value(json!({
            "course_code": "MATH1",
            "day": "monday",
            "start_time": "10:00",
            "end_time": "11:30:00",
            "room": "  R1 "
        }))
        .unwrap();

        assert_eq!(payload.day, Weekday::Mon);
        assert_eq!(payload.start_time, NaiveTime::from_hms_opt(10, 0, 0).unwrap());
        assert_eq!(payload.end_time, NaiveTime::from_hms_opt(11, 30, 0).unwrap());
        assert_eq!(payload.room_name(), Some("R1"));
    }

    #[test]
    fn test_schedule_payload_rejects_bad_day() {
        let result = serde_json::from_value::<SchedulePayload>(json!({
            "course_code": "MATH1",
            "day": "someday",
            "start_time": "10:00",
            "end_time": "11:00"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_client_payload_guardians() {
        let payload: ClientPayload = serde_json::from_value(json!({
            "first_name": "Nick",
            "last_name": "Papas",
            "phone": "",
            "parent2": { "first_name": "Maria", "last_name": "Papa", "phone": "6900000001" }
        }))
        .unwrap();

        assert_eq!(payload.own_phone(), None);
        assert_eq!(payload.guardians().count(), 1);
        assert_eq!(payload.full_name(), "Nick Papas");
    }

    #[test]
    fn test_tenant_payload_defaults() {
        let payload: TenantPayload =
            serde_json::from_value(json!({ "code": "42", "name": "Acme" })).unwrap();
        assert_eq!(payload.timezone, "UTC");
        assert_eq!(payload.phone_country_code, "");
    }
}
