//! Trigger port and registry.
//!
//! A trigger is a named side effect fired when a rule that lists its id
//! fires. The effect is opaque to the scale loop, which deduplicates ids
//! within a tick and swallows individual failures.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

#[async_trait]
pub trait Trigger: Send + Sync {
    async fn fire(&self) -> anyhow::Result<()>;
}

/// Process-wide mapping `id → trigger`, built once at startup.
#[derive(Default)]
pub struct TriggerRegistry {
    triggers: HashMap<String, Arc<dyn Trigger>>,
}

impl std::fmt::Debug for TriggerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerRegistry")
            .field("ids", &self.triggers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a trigger, replacing any previous one with the same id.
    pub fn insert(&mut self, id: impl Into<String>, trigger: Arc<dyn Trigger>) {
        self.triggers.insert(id.into(), trigger);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Trigger>> {
        self.triggers.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }
}
