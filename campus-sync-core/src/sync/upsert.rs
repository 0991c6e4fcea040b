//! Key resolution and batch upsert.

use std::collections::HashMap;

use super::SyncResult;
use crate::models::{Entity, Id};
use crate::store::Repository;

/// Rows written by [`UpsertPlan::apply`].
#[derive(Debug)]
pub(crate) struct Applied<E> {
    pub created: Vec<E>,
    pub updated: Vec<E>,
    pub restored: usize,
}

impl<E: Entity> Applied<E> {
    pub fn rows(&self) -> impl Iterator<Item = &E> {
        self.created.iter().chain(self.updated.iter())
    }

    pub fn ids(&self) -> Vec<Id> {
        self.rows().map(Entity::id).collect()
    }

    pub fn into_rows(self) -> Vec<E> {
        let mut rows = self.created;
        rows.extend(self.updated);
        rows
    }
}

/// Incoming rows of one kind, deduplicated by natural key.
///
/// Each staged row becomes a create when no stored row has its key, and an
/// update merged onto the stored row otherwise. Stored rows that were
/// obviated are restored together with the update.
pub(crate) struct UpsertPlan<E: Entity> {
    staged: Vec<(String, E)>,
    index: HashMap<E::Key, usize>,
}

impl<E: Entity> UpsertPlan<E> {
    pub fn new() -> Self {
        Self {
            staged: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Stages `entity`, replacing an earlier row with the same key.
    pub fn stage(&mut self, title: &str, entity: E) {
        let key = entity.key();
        match self.index.get(&key) {
            Some(&slot) => {
                tracing::warn!(
                    "Duplicate {} key {} in \"{}\", replacing \"{}\"",
                    E::KIND,
                    key,
                    title,
                    self.staged[slot].0
                );
                self.staged[slot] = (title.to_string(), entity);
            }
            None => {
                self.index.insert(key, self.staged.len());
                self.staged.push((title.to_string(), entity));
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Resolves every staged row against the store and writes the result in
    /// at most three batch calls.
    ///
    /// A failed key lookup only skips its row; failed batch calls abort.
    pub async fn apply(self, repo: &dyn Repository<E>, verbose: bool) -> SyncResult<Applied<E>> {
        let mut creates = Vec::new();
        let mut updates = Vec::new();
        let mut restore_ids = Vec::new();

        for (title, entity) in self.staged {
            let key = entity.key();
            match repo.find_by_key(&key).await {
                Ok(None) => {
                    if verbose {
                        tracing::info!("Creating {} \"{}\" ({})", E::KIND, title, key);
                    }
                    creates.push(entity);
                }
                Ok(Some(existing)) => {
                    if existing.is_obviated() {
                        tracing::info!("Restoring {} \"{}\" ({})", E::KIND, title, key);
                        restore_ids.push(existing.id());
                    } else if verbose {
                        tracing::info!("Updating {} \"{}\" ({})", E::KIND, title, key);
                    }
                    updates.push(entity.merged_into(&existing));
                }
                Err(e) => {
                    tracing::error!("Skipping {} \"{}\": {}", E::KIND, title, e);
                }
            }
        }

        let created = if creates.is_empty() {
            Vec::new()
        } else {
            repo.create_batch(creates).await?
        };

        let mut updated = if updates.is_empty() {
            Vec::new()
        } else {
            repo.update_batch(updates).await?
        };

        let restored = restore_ids.len();
        if restored > 0 {
            let to_restore: Vec<E> = updated
                .iter()
                .filter(|row| restore_ids.contains(&row.id()))
                .cloned()
                .collect();
            let restored_rows = repo.restore_batch(to_restore).await?;
            for row in restored_rows {
                if let Some(slot) = updated.iter_mut().find(|u| u.id() == row.id()) {
                    *slot = row;
                }
            }
        }

        Ok(Applied {
            created,
            updated,
            restored,
        })
    }
}
