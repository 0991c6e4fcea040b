//! Expansion of weekly schedules into dated occurrences.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Offset, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use std::collections::HashSet;

use super::obviation::obviate_stale;
use super::SyncResult;
use crate::models::{Entity, Id, Occurrence, OccurrenceKey, OccurrenceStatus, Offering, Schedule};
use crate::store::Store;

/// Every date in `[first, last]` falling on `day`.
pub fn expand(first: NaiveDate, last: NaiveDate, day: Weekday) -> Vec<NaiveDate> {
    let offset = (7 + day.num_days_from_monday() as i64
        - first.weekday().num_days_from_monday() as i64)
        % 7;
    let mut dates = Vec::new();
    let mut date = first + Duration::days(offset);
    while date <= last {
        dates.push(date);
        date += Duration::days(7);
    }
    dates
}

/// Resolves a wall-clock time in `tz` to an instant.
///
/// Each date uses the offset in force on that date. Ambiguous times take the
/// earlier instant; times inside a spring-forward gap are moved forward by
/// the gap length.
pub fn localize(date: NaiveDate, time: NaiveTime, tz: Tz) -> DateTime<Utc> {
    let local = date.and_time(time);
    if let Some(instant) = tz.from_local_datetime(&local).earliest() {
        return instant.with_timezone(&Utc);
    }

    // Inside a gap: apply the offset in force just before it
    let before = tz
        .from_local_datetime(&(local - Duration::hours(3)))
        .earliest()
        .map(|dt| dt.offset().fix().local_minus_utc())
        .unwrap_or(0);
    Utc.from_utc_datetime(&(local - Duration::seconds(before as i64)))
}

/// Parses an IANA zone name, falling back to UTC.
pub fn zone(name: &str) -> Tz {
    match name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            tracing::warn!("Unknown time zone '{}', using UTC", name);
            Tz::UTC
        }
    }
}

/// Counts of occurrence rows written for one schedule.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct OccurrenceDiff {
    pub created: usize,
    pub updated: usize,
    pub obviated: usize,
}

/// Brings the occurrences of `schedule` in line with its offering's dates.
///
/// Rows whose status is not `scheduled` were edited by hand and are never
/// touched.
pub(crate) async fn reconcile(
    store: &Store,
    schedule: &Schedule,
    offering: &Offering,
    tz: Tz,
) -> SyncResult<OccurrenceDiff> {
    let mut creates = Vec::new();
    let mut updates = Vec::new();
    let mut restores = Vec::new();
    let mut keep = HashSet::new();

    for date in expand(offering.first_date, offering.last_date, schedule.day) {
        let start_at = localize(date, schedule.start_time, tz);
        let end_date = if schedule.end_time < schedule.start_time {
            date + Duration::days(1)
        } else {
            date
        };
        let end_at = localize(end_date, schedule.end_time, tz);

        let key = OccurrenceKey {
            offering_id: offering.id,
            start_at,
        };
        match store.occurrences.find_by_key(&key).await? {
            None => creates.push(Occurrence {
                id: 0,
                offering_id: offering.id,
                schedule_id: Some(schedule.id),
                room_id: schedule.room_id,
                start_at,
                end_at,
                status: OccurrenceStatus::Scheduled,
                obviated_at: None,
            }),
            Some(existing) if existing.is_scheduled() => {
                keep.insert(existing.id);
                if existing.is_obviated() {
                    restores.push(existing.id);
                }
                let mut row = existing;
                row.schedule_id = Some(schedule.id);
                row.room_id = schedule.room_id;
                row.end_at = end_at;
                updates.push(row);
            }
            Some(existing) => {
                tracing::debug!(
                    "Leaving {} occurrence {} of offering {} untouched",
                    existing.status,
                    existing.id,
                    offering.code
                );
            }
        }
    }

    let mut diff = OccurrenceDiff {
        created: creates.len(),
        updated: updates.len(),
        obviated: 0,
    };

    if !creates.is_empty() {
        let created = store.occurrences.create_batch(creates).await?;
        keep.extend(created.iter().map(|o| o.id));
    }
    if !updates.is_empty() {
        let updated = store.occurrences.update_batch(updates).await?;
        let to_restore: Vec<Occurrence> = updated
            .into_iter()
            .filter(|o| restores.contains(&o.id))
            .collect();
        if !to_restore.is_empty() {
            store.occurrences.restore_batch(to_restore).await?;
        }
    }

    let stale: Vec<Occurrence> = store
        .occurrences
        .find_live_in(schedule.id)
        .await?
        .into_iter()
        .filter(Occurrence::is_scheduled)
        .collect();
    diff.obviated = obviate_stale(store.occurrences.as_ref(), stale, &keep)
        .await?
        .len();

    Ok(diff)
}

/// Obviates the `scheduled` occurrences of obviated schedules.
pub(crate) async fn obviate_for_schedules(
    store: &Store,
    schedules: &[Schedule],
) -> SyncResult<usize> {
    let keep: HashSet<Id> = HashSet::new();
    let mut count = 0;
    for schedule in schedules {
        let live: Vec<Occurrence> = store
            .occurrences
            .find_live_in(schedule.id())
            .await?
            .into_iter()
            .filter(Occurrence::is_scheduled)
            .collect();
        count += obviate_stale(store.occurrences.as_ref(), live, &keep)
            .await?
            .len();
    }
    Ok(count)
}
