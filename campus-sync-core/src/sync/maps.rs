//! Identifier maps handed from one phase to the next.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use super::{SyncError, SyncResult};
use crate::models::{Id, OfferingKey, TenantKey};

/// Store id to natural key map produced by a phase.
///
/// Maps are built once by the phase that owns the kind and only read
/// afterwards.
#[derive(Debug, Clone)]
pub struct IdMap<K> {
    by_id: BTreeMap<Id, K>,
    by_key: HashMap<K, Id>,
}

impl<K: Clone + Eq + Hash> IdMap<K> {
    pub fn new() -> Self {
        Self {
            by_id: BTreeMap::new(),
            by_key: HashMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, id: Id, key: K) {
        if let Some(old) = self.by_id.insert(id, key.clone()) {
            self.by_key.remove(&old);
        }
        self.by_key.insert(key, id);
    }

    pub fn get(&self, id: Id) -> Option<&K> {
        self.by_id.get(&id)
    }

    pub fn id_of(&self, key: &K) -> Option<Id> {
        self.by_key.get(key).copied()
    }

    pub fn ids(&self) -> impl Iterator<Item = Id> + '_ {
        self.by_id.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Id, &K)> {
        self.by_id.iter().map(|(id, key)| (*id, key))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl<K: Clone + Eq + Hash> Default for IdMap<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone + Eq + Hash> FromIterator<(Id, K)> for IdMap<K> {
    fn from_iter<I: IntoIterator<Item = (Id, K)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (id, key) in iter {
            map.insert(id, key);
        }
        map
    }
}

pub type TenantMap = IdMap<TenantKey>;

pub type OfferingMap = IdMap<OfferingKey>;

impl OfferingMap {
    /// Ids of the offerings owned by `tenant_id`.
    pub fn ids_in(&self, tenant_id: Id) -> Vec<Id> {
        self.iter()
            .filter(|(_, key)| key.tenant_id == tenant_id)
            .map(|(id, _)| id)
            .collect()
    }
}

const MAX_SCOPE_LEN: usize = 64;

/// Parses the optional tenant scope of a run.
pub struct TenantScope;

impl TenantScope {
    /// `None` and blank input mean the whole catalog.
    pub fn parse(raw: Option<&str>) -> SyncResult<Option<TenantKey>> {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(None);
        };

        if raw.len() > MAX_SCOPE_LEN {
            return Err(SyncError::Validation(format!(
                "tenant scope is longer than {} characters",
                MAX_SCOPE_LEN
            )));
        }

        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(SyncError::Validation(format!(
                "tenant scope '{}' contains invalid characters",
                raw
            )));
        }

        Ok(Some(TenantKey::new(raw)))
    }
}
