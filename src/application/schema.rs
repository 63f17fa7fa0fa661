//! The application schema: task-type names mapped to handlers.

use std::collections::HashMap;
use std::sync::Arc;

use crate::port::handler::TaskHandler;

/// Mapping from task-type name to handler. The keys are the authoritative
/// set of request types a server accepts; anything else is answered with an
/// unknown-type ERR.
#[derive(Clone, Default)]
pub struct Schema {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `task_type`, replacing any previous one.
    pub fn register(
        mut self,
        task_type: impl Into<String>,
        handler: impl TaskHandler + 'static,
    ) -> Self {
        self.handlers.insert(task_type.into(), Arc::new(handler));
        self
    }

    pub fn handler(&self, task_type: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(task_type).cloned()
    }

    pub fn contains(&self, task_type: &str) -> bool {
        self.handlers.contains_key(task_type)
    }

    /// The registered task-type names, in no particular order.
    pub fn task_types(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema")
            .field("task_types", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
