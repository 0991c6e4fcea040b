//! Content-source contract.
//!
//! A source hands out raw records per kind, optionally filtered to a single
//! tenant. Each record carries a tenant-correlating code and a JSON field
//! payload that is decoded into the typed payloads in [`payload`].

pub mod payload;
mod static_source;

pub use static_source::StaticSource;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::models::TenantKey;

/// Kinds of records a source serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Tenant,
    Offering,
    Schedule,
    Staff,
    Client,
}

impl RecordKind {
    pub const ALL: [RecordKind; 5] = [
        RecordKind::Tenant,
        RecordKind::Offering,
        RecordKind::Schedule,
        RecordKind::Staff,
        RecordKind::Client,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Tenant => "tenant",
            RecordKind::Offering => "offering",
            RecordKind::Schedule => "schedule",
            RecordKind::Staff => "staff",
            RecordKind::Client => "client",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tenant" | "tenants" => Ok(RecordKind::Tenant),
            "offering" | "offerings" => Ok(RecordKind::Offering),
            "schedule" | "schedules" => Ok(RecordKind::Schedule),
            "staff" => Ok(RecordKind::Staff),
            "client" | "clients" => Ok(RecordKind::Client),
            _ => Err(format!(
                "Invalid record kind '{}'. Valid options: tenant, offering, schedule, staff, client",
                s
            )),
        }
    }
}

/// A record as served by the content source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Identifier of the record inside the source.
    #[serde(default)]
    pub source_id: String,
    /// Human-readable title, used in log lines.
    pub title: String,
    /// Code of the tenant the record belongs to.
    #[serde(default)]
    pub tenant: Option<String>,
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl RawRecord {
    pub fn new(title: impl Into<String>, tenant: Option<&str>, fields: serde_json::Value) -> Self {
        let fields = match fields {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Self {
            source_id: String::new(),
            title: title.into(),
            tenant: tenant.map(str::to_string),
            fields,
        }
    }

    /// Decodes the field payload into a typed payload.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, SourceError> {
        serde_json::from_value(serde_json::Value::Object(self.fields.clone())).map_err(|e| {
            SourceError::Payload {
                title: self.title.clone(),
                message: e.to_string(),
            }
        })
    }

    /// True unless the record names a different tenant.
    ///
    /// Records without a tenant field are trusted to have been filtered by
    /// the source.
    pub fn belongs_to(&self, tenant: &TenantKey) -> bool {
        self.tenant
            .as_deref()
            .map_or(true, |code| code == tenant.as_str())
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    /// The whole fetch failed; aborts the phase.
    #[error("Failed to fetch {kind} records: {message}")]
    Fetch { kind: RecordKind, message: String },

    /// One record could not be decoded; the record is skipped.
    #[error("Malformed record \"{title}\": {message}")]
    Payload { title: String, message: String },
}

/// The content source the engine pulls from.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch_records(
        &self,
        kind: RecordKind,
        tenant: Option<&TenantKey>,
    ) -> Result<Vec<RawRecord>, SourceError>;
}
