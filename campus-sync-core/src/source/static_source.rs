use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use super::{RawRecord, RecordKind, SourceAdapter, SourceError};
use crate::models::TenantKey;

/// In-memory source holding a fixed record set per kind.
///
/// Records can be replaced between runs, and a kind can be made to fail,
/// which makes the source handy for embedding and for tests.
#[derive(Debug, Default)]
pub struct StaticSource {
    records: RwLock<HashMap<RecordKind, Vec<RawRecord>>>,
    failing: RwLock<HashSet<RecordKind>>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces every record of `kind`.
    pub fn set(&self, kind: RecordKind, records: Vec<RawRecord>) {
        let mut all = self.records.write().unwrap_or_else(|e| e.into_inner());
        all.insert(kind, records);
    }

    pub fn push(&self, kind: RecordKind, record: RawRecord) {
        let mut all = self.records.write().unwrap_or_else(|e| e.into_inner());
        all.entry(kind).or_default().push(record);
    }

    /// Makes every fetch of `kind` fail until cleared.
    pub fn fail(&self, kind: RecordKind, failing: bool) {
        let mut set = self.failing.write().unwrap_or_else(|e| e.into_inner());
        if failing {
            set.insert(kind);
        } else {
            set.remove(&kind);
        }
    }
}

#[async_trait]
impl SourceAdapter for StaticSource {
    async fn fetch_records(
        &self,
        kind: RecordKind,
        tenant: Option<&TenantKey>,
    ) -> Result<Vec<RawRecord>, SourceError> {
        if self
            .failing
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&kind)
        {
            return Err(SourceError::Fetch {
                kind,
                message: "source unavailable".to_string(),
            });
        }

        let all = self.records.read().unwrap_or_else(|e| e.into_inner());
        let records = all.get(&kind).cloned().unwrap_or_default();

        Ok(match tenant {
            Some(key) => records
                .into_iter()
                .filter(|r| r.tenant.as_deref() == Some(key.as_str()))
                .collect(),
            None => records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_filters_by_tenant() {
        let source = StaticSource::new();
        source.push(RecordKind::Offering, RawRecord::new("a", Some("1"), json!({})));
        source.push(RecordKind::Offering, RawRecord::new("b", Some("2"), json!({})));

        let all = source.fetch_records(RecordKind::Offering, None).await.unwrap();
        assert_eq!(all.len(), 2);

        let only = source
            .fetch_records(RecordKind::Offering, Some(&TenantKey::new("2")))
            .await
            .unwrap();
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].title, "b");
    }

    #[tokio::test]
    async fn test_failing_kind() {
        let source = StaticSource::new();
        source.fail(RecordKind::Staff, true);
        assert!(source.fetch_records(RecordKind::Staff, None).await.is_err());

        source.fail(RecordKind::Staff, false);
        assert!(source.fetch_records(RecordKind::Staff, None).await.is_ok());
    }
}
