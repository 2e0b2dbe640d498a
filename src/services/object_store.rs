//! In-memory store of managed workloads.
//!
//! Shared by the resync, watch and scale workers; one mutex guards the
//! map. Mutations happen under the lock, readers take a snapshot and
//! release, so a tick sees a consistent view without blocking watches.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::domain::models::object::{Object, ObjectKey, SavedState, WorkloadKind};

#[derive(Default)]
pub struct ObjectStore {
    objects: Mutex<HashMap<ObjectKey, Object>>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ObjectKey, Object>> {
        self.objects.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Insert or replace an object.
    ///
    /// The prior entry's saved state is kept when the incoming object has
    /// none, so a resync observation never clobbers a just-saved state.
    pub fn upsert(&self, mut obj: Object) {
        let mut objects = self.lock();
        if obj.state.is_none() {
            if let Some(prior) = objects.get(&obj.key()) {
                obj.state = prior.state;
            }
        }
        objects.insert(obj.key(), obj);
    }

    /// Remove an object; returns whether it was present.
    pub fn remove(&self, key: &ObjectKey) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Record a saved replica snapshot on a stored object.
    pub fn set_state(&self, key: &ObjectKey, state: SavedState) {
        if let Some(obj) = self.lock().get_mut(key) {
            obj.state = Some(state);
        }
    }

    /// Stable-ordered copy of all objects for one tick.
    pub fn snapshot(&self) -> Vec<Object> {
        let mut objects: Vec<Object> = self.lock().values().cloned().collect();
        objects.sort_by(|a, b| (a.kind, &a.uid).cmp(&(b.kind, &b.uid)));
        objects
    }

    /// Drop entries belonging to a scanner (kind plus namespace scope)
    /// whose key is absent from a fresh listing. Returns how many were
    /// removed.
    pub fn remove_stale(
        &self,
        kind: WorkloadKind,
        namespace: Option<&str>,
        fresh: &HashSet<ObjectKey>,
    ) -> usize {
        let mut objects = self.lock();
        let before = objects.len();
        objects.retain(|key, obj| {
            key.kind != kind
                || namespace.is_some_and(|ns| obj.namespace != ns)
                || fresh.contains(key)
        });
        before - objects.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
