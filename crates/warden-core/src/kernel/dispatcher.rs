//! Handler registry - resolves task kinds to handler implementations.

use std::collections::BTreeMap;
use std::sync::Arc;

use agent_core::TaskKind;

use crate::handlers::{self, TaskHandler};

/// Kind -> handler map. Built once, then frozen inside the scheduler.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<TaskKind, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in handler.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for handler in handlers::builtin() {
            registry.register(handler);
        }
        registry
    }

    /// Register a handler under its own kind, returning the one it replaces.
    pub fn register(&mut self, handler: Arc<dyn TaskHandler>) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.insert(handler.kind(), handler)
    }

    pub fn unregister(&mut self, kind: TaskKind) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.remove(&kind)
    }

    pub fn get(&self, kind: TaskKind) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(&kind).cloned()
    }

    pub fn contains(&self, kind: TaskKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = TaskKind> + '_ {
        self.handlers.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.handlers.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_kind() {
        let registry = HandlerRegistry::with_defaults();
        assert_eq!(registry.len(), TaskKind::ALL.len());
        for kind in TaskKind::ALL {
            assert!(registry.contains(kind), "missing handler for {kind}");
        }
    }

    #[test]
    fn unregister_removes_kind() {
        let mut registry = HandlerRegistry::with_defaults();
        assert!(registry.unregister(TaskKind::Build).is_some());
        assert!(!registry.contains(TaskKind::Build));
        assert!(registry.get(TaskKind::Build).is_none());
    }
}
