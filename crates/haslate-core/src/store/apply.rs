// ── Store mutations ──
//
// Remote snapshots, remote changes, local sensor readings and staleness.
// Each operation builds the next map from the current one under the writer
// lock and publishes it in a single swap.

use std::collections::HashSet;
use std::sync::Arc;

use super::{EntityMap, EntityStore};
use crate::error::CoreError;
use crate::model::{EntityEntry, EntityId, EntityState, Origin};

impl EntityStore {
    /// Replace the whole remote subset with `states`.
    ///
    /// Local entries are untouched. Remote ids missing from `states` are
    /// removed. Listeners hear about ids that were added, changed, removed
    /// or un-staled; an identical snapshot notifies nobody.
    pub fn apply_snapshot<I>(&self, states: I)
    where
        I: IntoIterator<Item = EntityState>,
    {
        let writer = self.lock_writer();
        let current = self.entries.load_full();

        let mut next: EntityMap = current
            .iter()
            .filter(|(_, e)| e.origin == Origin::Local)
            .map(|(id, e)| (id.clone(), e.clone()))
            .collect();
        let mut affected = Vec::new();
        let mut seen = HashSet::new();

        for state in states {
            if state.id.is_local() {
                tracing::warn!(id = %state.id, "ignoring hub entity in the local namespace");
                continue;
            }
            let id = state.id.clone();
            let entry = match current.get(&id) {
                Some(prev)
                    if prev.origin == Origin::Remote && !prev.is_stale && *prev.state == state =>
                {
                    prev.clone()
                }
                _ => {
                    affected.push(id.clone());
                    EntityEntry {
                        state: Arc::new(state),
                        is_stale: false,
                        origin: Origin::Remote,
                    }
                }
            };
            seen.insert(id.clone());
            next.insert(id, entry);
        }

        for (id, entry) in current.iter() {
            if entry.origin == Origin::Remote && !seen.contains(id) {
                affected.push(id.clone());
            }
        }

        tracing::debug!(
            entities = seen.len(),
            affected = affected.len(),
            "applied remote snapshot"
        );
        self.commit(&writer, next, &affected);
    }

    /// Insert or replace one remote entry. Ids never seen before are valid
    /// insertions. Always notifies.
    pub fn apply_change(&self, state: EntityState) -> Result<(), CoreError> {
        if state.id.is_local() {
            return Err(CoreError::ReservedNamespace { id: state.id });
        }
        let writer = self.lock_writer();
        let mut next = EntityMap::clone(&self.entries.load());
        let id = state.id.clone();
        next.insert(
            id.clone(),
            EntityEntry {
                state: Arc::new(state),
                is_stale: false,
                origin: Origin::Remote,
            },
        );
        self.commit(&writer, next, std::slice::from_ref(&id));
        Ok(())
    }

    /// Record a local sensor reading. Returns whether it differed from the
    /// previous reading; unchanged readings notify nobody.
    pub fn apply_local(&self, state: EntityState) -> Result<bool, CoreError> {
        if !state.id.is_local() {
            return Err(CoreError::NotLocal { id: state.id });
        }
        let writer = self.lock_writer();
        let current = self.entries.load();
        if let Some(prev) = current.get(&state.id) {
            if prev.state.same_reading(&state) {
                return Ok(false);
            }
        }

        let mut next = EntityMap::clone(&current);
        let id = state.id.clone();
        next.insert(
            id.clone(),
            EntityEntry {
                state: Arc::new(state),
                is_stale: false,
                origin: Origin::Local,
            },
        );
        self.commit(&writer, next, std::slice::from_ref(&id));
        Ok(true)
    }

    /// Flag every remote entry stale. Cleared by the next snapshot or by a
    /// fresh change for that entity.
    pub fn mark_remote_stale(&self) {
        let writer = self.lock_writer();
        let current = self.entries.load();
        let mut next = EntityMap::clone(&current);
        let mut affected = Vec::new();

        for (id, entry) in &mut next {
            if entry.origin == Origin::Remote && !entry.is_stale {
                entry.is_stale = true;
                affected.push(id.clone());
            }
        }

        if !affected.is_empty() {
            tracing::debug!(count = affected.len(), "marked remote entities stale");
        }
        self.commit(&writer, next, &affected);
    }

    /// Ids of every entry, for diagnostics.
    pub fn ids(&self) -> Vec<EntityId> {
        self.entries.load().keys().cloned().collect()
    }
}
