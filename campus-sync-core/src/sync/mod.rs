//! The reconciliation engine.
//!
//! Each record kind has a puller that fetches the current source records,
//! upserts them by natural key and obviates the rows that disappeared. The
//! [`Orchestrator`] runs the pullers in dependency order:
//!
//! ```text
//! tenants -> offerings -> { schedules, staff, clients } -> rooms
//! ```
//!
//! The braced phases only read the maps produced by the earlier phases and
//! pull concurrently. People hold roles of both the staff and the client
//! category, so staff and client obviation run after the join, staff first.

mod clients;
mod error;
mod linker;
mod maps;
mod obviation;
mod occurrences;
mod offerings;
mod orchestrator;
mod people;
mod schedules;
mod staff;
mod tenants;
mod upsert;

#[cfg(test)]
pub(crate) mod fixtures;

pub use error::{SyncError, SyncResult};
pub use linker::{hash_password, normalize_phone, user_name};
pub use maps::{IdMap, OfferingMap, TenantMap, TenantScope};
pub use occurrences::{expand, localize};
pub use orchestrator::Orchestrator;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

use crate::models::{Id, TenantKey};
use crate::source::{RawRecord, RecordKind, SourceAdapter};
use crate::store::Store;

/// Run-wide switches.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Log every created and updated row, not just the phase totals.
    pub verbose: bool,
    /// Password given to back-office staff that have none.
    pub default_password: Option<String>,
}

/// What every phase gets to work with.
#[derive(Clone)]
pub struct SyncContext {
    pub store: Store,
    pub source: Arc<dyn SourceAdapter>,
    pub options: SyncOptions,
}

impl SyncContext {
    pub fn new(store: Store, source: Arc<dyn SourceAdapter>, options: SyncOptions) -> Self {
        Self {
            store,
            source,
            options,
        }
    }
}

/// Result of one phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseOutcome {
    pub kind: RecordKind,
    pub pulled_ids: Vec<Id>,
    pub obviated_ids: Vec<Id>,
}

/// Result of a full run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub scope: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub phases: Vec<PhaseOutcome>,
    pub rooms_obviated: Vec<Id>,
}

impl RunReport {
    pub fn phase(&self, kind: RecordKind) -> Option<&PhaseOutcome> {
        self.phases.iter().find(|p| p.kind == kind)
    }
}

/// Rows removed by a cleanup sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub older_than_days: i64,
    pub tenants: u64,
    pub offerings: u64,
    pub schedules: u64,
    pub rooms: u64,
    pub occurrences: u64,
    pub people: u64,
    pub identities: u64,
}

impl CleanupReport {
    pub fn total(&self) -> u64 {
        self.tenants
            + self.offerings
            + self.schedules
            + self.rooms
            + self.occurrences
            + self.people
            + self.identities
    }
}

/// One phase of a run: fetch, upsert, obviate.
#[async_trait]
pub(crate) trait Puller: Send + Sync {
    /// Data handed to later phases.
    type Output: Send;

    fn kind(&self) -> RecordKind;

    /// Fetches and upserts; returns the ids of every row pulled.
    async fn pull(&self, ctx: &SyncContext) -> SyncResult<(Vec<Id>, Self::Output)>;

    /// Obviates the rows of the run's tenants that were not pulled.
    async fn obviate(&self, ctx: &SyncContext, keep: &HashSet<Id>) -> SyncResult<Vec<Id>>;

    async fn put(&self, ctx: &SyncContext) -> SyncResult<(PhaseOutcome, Self::Output)> {
        let (pulled_ids, output) = self.start(ctx).await?;
        let outcome = self.finish(ctx, pulled_ids).await?;
        Ok((outcome, output))
    }

    async fn start(&self, ctx: &SyncContext) -> SyncResult<(Vec<Id>, Self::Output)> {
        tracing::info!("Pulling {} records", self.kind());
        self.pull(ctx).await
    }

    /// Obviates whatever `pull` did not return and reports the phase.
    async fn finish(&self, ctx: &SyncContext, pulled_ids: Vec<Id>) -> SyncResult<PhaseOutcome> {
        let kind = self.kind();
        let keep: HashSet<Id> = pulled_ids.iter().copied().collect();
        let obviated_ids = self.obviate(ctx, &keep).await?;

        tracing::info!(
            "Finished {}: {} pulled, {} obviated",
            kind,
            pulled_ids.len(),
            obviated_ids.len()
        );
        Ok(PhaseOutcome {
            kind,
            pulled_ids,
            obviated_ids,
        })
    }
}

/// Fetches the records of one tenant, dropping any the source mislabeled.
pub(crate) async fn fetch_for_tenant(
    ctx: &SyncContext,
    kind: RecordKind,
    tenant: &TenantKey,
) -> SyncResult<Vec<RawRecord>> {
    let records = ctx.source.fetch_records(kind, Some(tenant)).await?;
    let total = records.len();
    let records: Vec<RawRecord> = records.into_iter().filter(|r| r.belongs_to(tenant)).collect();
    if records.len() < total {
        tracing::warn!(
            "Dropped {} {} record(s) belonging to another tenant than {}",
            total - records.len(),
            kind,
            tenant
        );
    }
    Ok(records)
}

pub(crate) fn skip_record(kind: RecordKind, title: &str, err: &SyncError) {
    tracing::error!("Skipping {} record \"{}\": {}", kind, title, err);
}
