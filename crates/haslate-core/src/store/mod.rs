// ── Entity store ──
//
// Single authoritative mapping from EntityId to the latest observed state.
// Readers load an immutable map through `ArcSwap` and never block; writers
// are serialized by one mutex, which also guards the change listeners so
// every notification for a write completes before the next write starts.

mod apply;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;
use tokio::sync::watch;

use crate::model::{EntityEntry, EntityId};

type EntityMap = HashMap<EntityId, EntityEntry>;
type ChangeListener = Box<dyn Fn(&EntityId) + Send + Sync>;

/// Handle returned by [`EntityStore::on_change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct Writer {
    listeners: Vec<(ListenerId, ChangeListener)>,
    next_listener: u64,
}

pub struct EntityStore {
    entries: ArcSwap<EntityMap>,
    writer: Mutex<Writer>,
    version: watch::Sender<u64>,
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            entries: ArcSwap::from_pointee(HashMap::new()),
            writer: Mutex::new(Writer::default()),
            version,
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Current entry for `id`. Absence is normal: not yet observed, or not
    /// an entity the hub knows.
    pub fn get(&self, id: &EntityId) -> Option<EntityEntry> {
        self.entries.load().get(id).cloned()
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entries.load().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.load().is_empty()
    }

    /// Version counter bumped once per mutating operation that changed
    /// something.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    // ── Listeners ────────────────────────────────────────────────────

    /// Register a callback invoked once per affected id after each
    /// mutation. Callbacks run inside the write section: they must not
    /// write to the store or register listeners.
    pub fn on_change<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&EntityId) + Send + Sync + 'static,
    {
        let mut writer = self.lock_writer();
        let id = ListenerId(writer.next_listener);
        writer.next_listener += 1;
        writer.listeners.push((id, Box::new(callback)));
        id
    }

    /// Returns `false` if the listener was already gone.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut writer = self.lock_writer();
        let before = writer.listeners.len();
        writer.listeners.retain(|(lid, _)| *lid != id);
        writer.listeners.len() != before
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn lock_writer(&self) -> MutexGuard<'_, Writer> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish `next` and notify listeners about `affected`. Called with
    /// the writer lock held.
    fn commit(&self, writer: &Writer, next: EntityMap, affected: &[EntityId]) {
        self.entries.store(Arc::new(next));
        if affected.is_empty() {
            return;
        }
        self.version.send_modify(|v| *v += 1);
        for id in affected {
            for (_, listener) in &writer.listeners {
                listener(id);
            }
        }
    }
}
