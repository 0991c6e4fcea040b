use chrono::{Duration, Utc};
use std::sync::Arc;

use super::clients::ClientsPuller;
use super::offerings::OfferingsPuller;
use super::schedules::{obviate_rooms, SchedulesPuller};
use super::staff::StaffPuller;
use super::tenants::TenantsPuller;
use super::{CleanupReport, OfferingMap, PhaseOutcome, Puller, RunReport, SyncContext};
use super::{SyncError, SyncOptions, SyncResult, TenantMap, TenantScope};
use crate::models::{Entity, Tenant, TenantKey};
use crate::source::{RecordKind, SourceAdapter};
use crate::store::Store;

/// Runs the pullers in dependency order.
#[derive(Clone)]
pub struct Orchestrator {
    ctx: SyncContext,
}

impl Orchestrator {
    pub fn new(store: Store, source: Arc<dyn SourceAdapter>, options: SyncOptions) -> Self {
        Self {
            ctx: SyncContext::new(store, source, options),
        }
    }

    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    /// Runs every phase for the whole catalog or a single tenant.
    ///
    /// A phase-level error aborts the run. Writes of completed phases stay,
    /// the next run picks up from there.
    pub async fn sync_all(&self, scope: Option<&str>) -> SyncResult<RunReport> {
        let scope = TenantScope::parse(scope)?;
        let started_at = Utc::now();
        tracing::info!(
            "Starting sync of {}",
            scope
                .as_ref()
                .map(|s| format!("tenant {}", s))
                .unwrap_or_else(|| "all tenants".to_string())
        );

        let tenants_puller = TenantsPuller {
            scope: scope.clone(),
        };
        let (tenant_phase, tenants) = tenants_puller.put(&self.ctx).await?;
        let tenants = Arc::new(tenants);

        let offerings_puller = OfferingsPuller {
            tenants: tenants.clone(),
        };
        let (offering_phase, offerings) = offerings_puller.put(&self.ctx).await?;
        let offerings = Arc::new(offerings);

        let schedules = SchedulesPuller {
            tenants: tenants.clone(),
            offerings: offerings.clone(),
        };
        let staff = StaffPuller {
            tenants: tenants.clone(),
            offerings: offerings.clone(),
        };
        let clients = ClientsPuller {
            tenants: tenants.clone(),
            offerings: offerings.clone(),
        };

        let ((schedule_phase, rooms_used), (staff_ids, ()), (client_ids, ())) = tokio::try_join!(
            schedules.put(&self.ctx),
            staff.start(&self.ctx),
            clients.start(&self.ctx),
        )?;

        // Both people phases strip roles off the same rows
        let staff_phase = staff.finish(&self.ctx, staff_ids).await?;
        let client_phase = clients.finish(&self.ctx, client_ids).await?;

        let rooms_obviated = obviate_rooms(&self.ctx, &tenants, &rooms_used).await?;
        if !rooms_obviated.is_empty() {
            tracing::info!("Obviated {} unused room(s)", rooms_obviated.len());
        }

        let report = RunReport {
            scope: scope.map(|s| s.to_string()),
            started_at,
            finished_at: Utc::now(),
            phases: vec![
                tenant_phase,
                offering_phase,
                schedule_phase,
                staff_phase,
                client_phase,
            ],
            rooms_obviated,
        };
        tracing::info!(
            "Sync finished in {}ms",
            (report.finished_at - report.started_at).num_milliseconds()
        );
        Ok(report)
    }

    /// Runs the phase of a single kind.
    ///
    /// Prerequisite maps are read from the live rows of the store.
    pub async fn sync_kind(
        &self,
        kind: RecordKind,
        scope: Option<&str>,
    ) -> SyncResult<PhaseOutcome> {
        let scope = TenantScope::parse(scope)?;

        if kind == RecordKind::Tenant {
            let (outcome, _) = TenantsPuller { scope }.put(&self.ctx).await?;
            return Ok(outcome);
        }

        let tenants = Arc::new(self.load_tenants(scope.as_ref()).await?);
        if kind == RecordKind::Offering {
            let (outcome, _) = OfferingsPuller { tenants }.put(&self.ctx).await?;
            return Ok(outcome);
        }

        let offerings = Arc::new(self.load_offerings(&tenants).await?);
        let outcome = match kind {
            RecordKind::Schedule => {
                let puller = SchedulesPuller {
                    tenants: tenants.clone(),
                    offerings,
                };
                let (outcome, rooms_used) = puller.put(&self.ctx).await?;
                let rooms = obviate_rooms(&self.ctx, &tenants, &rooms_used).await?;
                if !rooms.is_empty() {
                    tracing::info!("Obviated {} unused room(s)", rooms.len());
                }
                outcome
            }
            RecordKind::Staff => StaffPuller { tenants, offerings }.put(&self.ctx).await?.0,
            _ => ClientsPuller { tenants, offerings }.put(&self.ctx).await?.0,
        };
        Ok(outcome)
    }

    /// Hard-deletes rows obviated more than `older_than_days` ago, then the
    /// identity records no person refers to.
    pub async fn cleanup(&self, older_than_days: i64) -> SyncResult<CleanupReport> {
        if older_than_days < 0 {
            return Err(SyncError::Validation(format!(
                "older_than_days must not be negative, got {}",
                older_than_days
            )));
        }

        let store = &self.ctx.store;
        let before = Utc::now() - Duration::days(older_than_days);

        // Children first
        let report = CleanupReport {
            older_than_days,
            occurrences: store.occurrences.purge_obviated(before).await?,
            schedules: store.schedules.purge_obviated(before).await?,
            rooms: store.rooms.purge_obviated(before).await?,
            offerings: store.offerings.purge_obviated(before).await?,
            people: store.people.purge_obviated(before).await?,
            tenants: store.tenants.purge_obviated(before).await?,
            identities: store.identities.purge_orphans().await?,
        };

        tracing::info!(
            "Cleanup removed {} row(s) obviated before {}",
            report.total(),
            before.to_rfc3339()
        );
        Ok(report)
    }

    async fn load_tenants(&self, scope: Option<&TenantKey>) -> SyncResult<TenantMap> {
        let tenants = &self.ctx.store.tenants;
        match scope {
            Some(key) => match tenants.find_by_key(key).await? {
                Some(tenant) if !tenant.is_obviated() => Ok([(tenant.id, tenant.key())]
                    .into_iter()
                    .collect()),
                _ => Err(SyncError::Validation(format!("unknown tenant '{}'", key))),
            },
            None => Ok(tenants
                .find_all_live()
                .await?
                .into_iter()
                .map(|t: Tenant| (t.id, t.key()))
                .collect()),
        }
    }

    async fn load_offerings(&self, tenants: &TenantMap) -> SyncResult<OfferingMap> {
        let mut map = OfferingMap::new();
        for tenant_id in tenants.ids() {
            for offering in self.ctx.store.offerings.find_live_in(tenant_id).await? {
                map.insert(offering.id, offering.key());
            }
        }
        Ok(map)
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("options", &self.ctx.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Identity, Occurrence, OccurrenceStatus, Offering, Person, Role, Room, Schedule,
    };
    use crate::store::PersonLinks;
    use crate::sync::fixtures::{self, Harness};
    use chrono::{DateTime, TimeZone, Timelike};

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    async fn person_named(harness: &Harness, first: &str) -> Person {
        harness
            .backend
            .rows::<Person>()
            .await
            .into_iter()
            .find(|p| p.first_name == first)
            .unwrap()
    }

    #[tokio::test]
    async fn test_scenario_generates_and_updates_occurrences() {
        let harness = Harness::new();
        harness.seed_scenario();

        let report = harness.orchestrator.sync_all(None).await.unwrap();
        assert_eq!(report.phase(RecordKind::Schedule).unwrap().pulled_ids.len(), 1);

        let rooms = harness.backend.rows::<Room>().await;
        assert_eq!(rooms.len(), 1);
        let first_run = harness.backend.rows::<Occurrence>().await;
        assert_eq!(first_run.len(), 13);
        assert!(first_run.iter().all(|o| o.status == OccurrenceStatus::Scheduled));
        assert!(first_run.iter().all(|o| !o.is_obviated()));
        assert!(first_run.iter().all(|o| o.room_id == Some(rooms[0].id)));
        assert_eq!(first_run[0].start_at, utc(2024, 1, 1, 10));

        harness.source.set(
            RecordKind::Schedule,
            vec![fixtures::schedule(
                "42",
                "MATH1",
                "Monday",
                "10:00",
                "11:30",
                Some("R1"),
            )],
        );
        harness.orchestrator.sync_all(None).await.unwrap();

        let second_run = harness.backend.rows::<Occurrence>().await;
        assert_eq!(second_run.len(), 13);
        for (before, after) in first_run.iter().zip(&second_run) {
            assert_eq!(before.id, after.id);
            assert_eq!(after.end_at.hour(), 11);
            assert_eq!(after.end_at.minute(), 30);
            assert!(!after.is_obviated());
        }
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let harness = Harness::new();
        harness.seed_scenario();
        harness.source.set(
            RecordKind::Staff,
            vec![fixtures::staff("42", "Tess", "6900000001", Role::Teacher)],
        );
        harness.source.set(
            RecordKind::Client,
            vec![
                fixtures::student("42", "Sam", "6900000002"),
                fixtures::dependent("42", "Dora", "Gus", "6900000003"),
            ],
        );

        harness.orchestrator.sync_all(None).await.unwrap();
        let people = harness.backend.rows::<Person>().await;
        let occurrences = harness.backend.rows::<Occurrence>().await;
        let offerings = harness.backend.rows::<Offering>().await;
        let identities = harness.backend.identities().await;
        assert_eq!(people.len(), 4);

        let report = harness.orchestrator.sync_all(None).await.unwrap();
        assert!(report.phases.iter().all(|p| p.obviated_ids.is_empty()));
        assert!(report.rooms_obviated.is_empty());
        assert_eq!(harness.backend.rows::<Person>().await, people);
        assert_eq!(harness.backend.rows::<Occurrence>().await, occurrences);
        assert_eq!(harness.backend.rows::<Offering>().await, offerings);
        assert_eq!(harness.backend.identities().await, identities);
    }

    #[tokio::test]
    async fn test_reappearing_record_restores_same_row() {
        let harness = Harness::new();
        harness.seed_scenario();
        let tess = fixtures::staff("42", "Tess", "6900000001", Role::Teacher);
        harness.source.set(RecordKind::Staff, vec![tess.clone()]);
        harness.orchestrator.sync_all(None).await.unwrap();
        let original = person_named(&harness, "Tess").await;

        harness.source.set(RecordKind::Staff, vec![]);
        let report = harness.orchestrator.sync_all(None).await.unwrap();
        assert_eq!(
            report.phase(RecordKind::Staff).unwrap().obviated_ids,
            vec![original.id]
        );
        let roles = harness.backend.roles(original.id).await.unwrap();
        assert_eq!(roles.into_iter().collect::<Vec<_>>(), vec![Role::None]);

        harness.source.set(RecordKind::Staff, vec![tess]);
        harness.orchestrator.sync_all(None).await.unwrap();

        let people = harness.backend.rows::<Person>().await;
        assert_eq!(people.len(), 1);
        assert_eq!(people[0].id, original.id);
        assert!(!people[0].is_obviated());
        let roles = harness.backend.roles(original.id).await.unwrap();
        assert_eq!(roles.into_iter().collect::<Vec<_>>(), vec![Role::Teacher]);
    }

    #[tokio::test]
    async fn test_schedule_of_unknown_offering_is_skipped() {
        let harness = Harness::new();
        harness.seed_scenario();
        harness.source.push(
            RecordKind::Schedule,
            fixtures::schedule("42", "NOPE", "Tuesday", "09:00", "10:00", None),
        );

        let report = harness.orchestrator.sync_all(None).await.unwrap();

        let schedules = harness.backend.rows::<Schedule>().await;
        assert_eq!(schedules.len(), 1);
        assert_eq!(
            report.phase(RecordKind::Schedule).unwrap().pulled_ids,
            vec![schedules[0].id]
        );
    }

    #[tokio::test]
    async fn test_mixed_role_person_is_not_obviated() {
        let harness = Harness::new();
        harness.seed_scenario();
        // The teacher is also the guardian of a student
        harness.source.set(
            RecordKind::Staff,
            vec![fixtures::staff("42", "Tess", "6900000001", Role::Teacher)],
        );
        harness.source.set(
            RecordKind::Client,
            vec![fixtures::dependent("42", "Dora", "Tess", "6900000001")],
        );
        harness.orchestrator.sync_all(None).await.unwrap();

        let tess = person_named(&harness, "Tess").await;
        let roles = harness.backend.roles(tess.id).await.unwrap();
        assert_eq!(
            roles.into_iter().collect::<Vec<_>>(),
            vec![Role::Parent, Role::Teacher]
        );

        harness.source.set(RecordKind::Staff, vec![]);
        let report = harness.orchestrator.sync_all(None).await.unwrap();

        assert!(report.phase(RecordKind::Staff).unwrap().obviated_ids.is_empty());
        let tess = person_named(&harness, "Tess").await;
        assert!(!tess.is_obviated());
        let roles = harness.backend.roles(tess.id).await.unwrap();
        assert_eq!(roles.into_iter().collect::<Vec<_>>(), vec![Role::Parent]);
    }

    #[tokio::test]
    async fn test_person_dropped_from_both_sources_is_obviated() {
        let harness = Harness::new();
        harness.seed_scenario();
        harness.source.set(
            RecordKind::Staff,
            vec![fixtures::staff("42", "Tess", "6900000001", Role::Teacher)],
        );
        harness.source.set(
            RecordKind::Client,
            vec![fixtures::dependent("42", "Dora", "Tess", "6900000001")],
        );
        harness.orchestrator.sync_all(None).await.unwrap();
        let tess = person_named(&harness, "Tess").await;

        harness.source.set(RecordKind::Staff, vec![]);
        harness.source.set(RecordKind::Client, vec![]);
        let report = harness.orchestrator.sync_all(None).await.unwrap();

        assert!(report.phase(RecordKind::Staff).unwrap().obviated_ids.is_empty());
        let client_phase = report.phase(RecordKind::Client).unwrap();
        assert!(client_phase.obviated_ids.contains(&tess.id));
        assert_eq!(client_phase.obviated_ids.len(), 2);

        let tess = person_named(&harness, "Tess").await;
        assert!(tess.is_obviated());
        let roles = harness.backend.roles(tess.id).await.unwrap();
        assert_eq!(roles.into_iter().collect::<Vec<_>>(), vec![Role::None]);
    }

    #[tokio::test]
    async fn test_removed_offering_retires_its_schedules() {
        let harness = Harness::new();
        harness.seed_scenario();
        harness.orchestrator.sync_all(None).await.unwrap();

        harness.source.set(RecordKind::Offering, vec![]);
        harness.source.set(RecordKind::Schedule, vec![]);
        let report = harness.orchestrator.sync_all(None).await.unwrap();

        assert_eq!(report.phase(RecordKind::Offering).unwrap().obviated_ids.len(), 1);
        assert_eq!(report.rooms_obviated.len(), 1);
        let schedules = harness.backend.rows::<Schedule>().await;
        assert_eq!(schedules.len(), 1);
        assert!(schedules[0].is_obviated());
        let occurrences = harness.backend.rows::<Occurrence>().await;
        assert_eq!(occurrences.len(), 13);
        assert!(occurrences.iter().all(|o| o.is_obviated()));

        // Coming back restores the same rows
        harness.seed_scenario();
        harness.orchestrator.sync_all(None).await.unwrap();
        let schedules = harness.backend.rows::<Schedule>().await;
        assert_eq!(schedules.len(), 1);
        assert!(!schedules[0].is_obviated());
        let restored = harness.backend.rows::<Occurrence>().await;
        assert_eq!(restored.len(), 13);
        assert!(restored.iter().all(|o| !o.is_obviated()));
    }

    #[tokio::test]
    async fn test_dependents_share_guardian_phone() {
        let harness = Harness::new();
        harness.seed_scenario();
        harness.source.set(
            RecordKind::Client,
            vec![
                fixtures::dependent("42", "Dora", "Gus", "6900000003"),
                fixtures::dependent("42", "Dino", "Gus", "6900000003"),
            ],
        );
        harness.orchestrator.sync_all(None).await.unwrap();
        harness.orchestrator.sync_all(None).await.unwrap();

        let dora = person_named(&harness, "Dora").await;
        let dino = person_named(&harness, "Dino").await;
        let gus = person_named(&harness, "Gus").await;
        assert_eq!(dora.dependence_order, 1);
        assert_eq!(dino.dependence_order, 2);
        assert_eq!(dora.phone, gus.phone);
        assert_eq!(harness.backend.rows::<Person>().await.len(), 3);

        let mut dependents = harness.backend.dependents(gus.id).await.unwrap();
        dependents.sort_unstable();
        assert_eq!(dependents, vec![dora.id, dino.id]);

        let names: Vec<String> = harness
            .backend
            .identities()
            .await
            .into_iter()
            .map(|i: Identity| i.user_name)
            .collect();
        assert!(names.contains(&"42_306900000003_2".to_string()));

        // Students are enrolled everywhere when no course is named
        let enrolled = harness.backend.offerings(dora.id).await.unwrap();
        assert_eq!(enrolled.len(), 1);
        assert!(harness.backend.offerings(gus.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_occurrences_follow_daylight_saving() {
        let harness = Harness::new();
        harness.source.set(
            RecordKind::Tenant,
            vec![fixtures::tenant("42", "Acme", "Europe/Athens")],
        );
        harness.source.set(
            RecordKind::Offering,
            vec![fixtures::offering("42", "MATH1", "2024-03-18", "2024-04-08")],
        );
        harness.source.set(
            RecordKind::Schedule,
            vec![fixtures::schedule("42", "MATH1", "Monday", "10:00", "11:00", None)],
        );

        harness.orchestrator.sync_all(None).await.unwrap();

        let starts: Vec<DateTime<Utc>> = harness
            .backend
            .rows::<Occurrence>()
            .await
            .into_iter()
            .map(|o| o.start_at)
            .collect();
        assert_eq!(
            starts,
            vec![
                utc(2024, 3, 18, 8),
                utc(2024, 3, 25, 8),
                utc(2024, 4, 1, 7),
                utc(2024, 4, 8, 7),
            ]
        );
    }

    #[tokio::test]
    async fn test_single_tenant_run_leaves_other_tenants_alone() {
        let harness = Harness::new();
        harness.source.set(
            RecordKind::Tenant,
            vec![
                fixtures::tenant("42", "Acme", "UTC"),
                fixtures::tenant("7", "Other", "UTC"),
            ],
        );
        harness.source.set(
            RecordKind::Offering,
            vec![
                fixtures::offering("42", "MATH1", "2024-01-01", "2024-03-31"),
                fixtures::offering("7", "MATH1", "2024-01-01", "2024-03-31"),
            ],
        );
        harness.orchestrator.sync_all(None).await.unwrap();
        assert_eq!(harness.backend.rows::<Offering>().await.len(), 2);

        harness.source.set(
            RecordKind::Tenant,
            vec![fixtures::tenant("42", "Acme", "UTC")],
        );
        harness.source.set(
            RecordKind::Offering,
            vec![fixtures::offering("42", "MATH1", "2024-01-01", "2024-03-31")],
        );
        let report = harness.orchestrator.sync_all(Some("42")).await.unwrap();

        assert_eq!(report.scope.as_deref(), Some("42"));
        assert!(report.phase(RecordKind::Tenant).unwrap().obviated_ids.is_empty());
        assert!(report.phase(RecordKind::Offering).unwrap().obviated_ids.is_empty());
        assert!(harness
            .backend
            .rows::<Tenant>()
            .await
            .iter()
            .all(|t| !t.is_obviated()));
        assert!(harness
            .backend
            .rows::<Offering>()
            .await
            .iter()
            .all(|o| !o.is_obviated()));

        // A whole-catalog run retires the tenant that left the source
        let report = harness.orchestrator.sync_all(None).await.unwrap();
        assert_eq!(report.phase(RecordKind::Tenant).unwrap().obviated_ids.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_phase_aborts_run_and_keeps_earlier_writes() {
        let harness = Harness::new();
        harness.seed_scenario();
        harness.source.fail(RecordKind::Offering, true);

        let err = harness.orchestrator.sync_all(None).await.unwrap_err();
        assert!(matches!(err, SyncError::Source(_)));
        assert_eq!(harness.backend.rows::<Tenant>().await.len(), 1);
        assert!(harness.backend.rows::<Schedule>().await.is_empty());

        harness.source.fail(RecordKind::Offering, false);
        harness.orchestrator.sync_all(None).await.unwrap();
        assert_eq!(harness.backend.rows::<Occurrence>().await.len(), 13);
    }

    #[tokio::test]
    async fn test_malformed_scope_is_rejected_before_any_phase() {
        let harness = Harness::new();
        harness.seed_scenario();

        let err = harness
            .orchestrator
            .sync_all(Some("42 OR 1=1"))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(harness.backend.rows::<Tenant>().await.is_empty());
    }

    #[tokio::test]
    async fn test_sync_kind_uses_stored_prerequisites() {
        let harness = Harness::new();
        harness.seed_scenario();

        let err = harness
            .orchestrator
            .sync_kind(RecordKind::Schedule, Some("42"))
            .await
            .unwrap_err();
        assert!(err.is_validation());

        harness
            .orchestrator
            .sync_kind(RecordKind::Tenant, None)
            .await
            .unwrap();
        harness
            .orchestrator
            .sync_kind(RecordKind::Offering, None)
            .await
            .unwrap();
        let outcome = harness
            .orchestrator
            .sync_kind(RecordKind::Schedule, Some("42"))
            .await
            .unwrap();

        assert_eq!(outcome.kind, RecordKind::Schedule);
        assert_eq!(outcome.pulled_ids.len(), 1);
        assert_eq!(harness.backend.rows::<Occurrence>().await.len(), 13);
    }

    #[tokio::test]
    async fn test_cleanup_purges_obviated_rows_and_orphan_identities() {
        let harness = Harness::new();
        harness.seed_scenario();
        harness.source.set(
            RecordKind::Staff,
            vec![fixtures::staff("42", "Tess", "6900000001", Role::Teacher)],
        );
        harness.orchestrator.sync_all(None).await.unwrap();

        harness.source.set(RecordKind::Staff, vec![]);
        harness.orchestrator.sync_all(None).await.unwrap();

        let kept = harness.orchestrator.cleanup(30).await.unwrap();
        assert_eq!(kept.total(), 0);

        assert!(harness.orchestrator.cleanup(-1).await.unwrap_err().is_validation());

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let report = harness.orchestrator.cleanup(0).await.unwrap();
        assert_eq!(report.people, 1);
        assert_eq!(report.identities, 1);
        assert!(harness.backend.rows::<Person>().await.is_empty());
        assert!(harness.backend.identities().await.is_empty());
    }
}
