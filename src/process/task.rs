//! Local capabilities and detached task execution.
//!
//! A task whose capability this process can run locally is handed to the
//! runtime's blocking pool and forgotten. There is no path back for a result.

use crate::messaging::Task;
use crate::structures::{AssociativeMap, TaggedValue};
use crate::types::Result;
use std::fmt;
use std::sync::Arc;

type CapabilityFn = dyn Fn(&[String]) + Send + Sync;

/// Something this process can execute on request.
pub struct LocalCapability {
    name: String,
    function: Arc<CapabilityFn>,
}

impl LocalCapability {
    pub fn new<F>(name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&[String]) + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            function: Arc::new(function),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for LocalCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalCapability")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Capability name → [`LocalCapability`].
#[derive(Debug, Default)]
pub struct CapabilityTable {
    entries: AssociativeMap,
}

impl CapabilityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, capability: LocalCapability) -> Result<()> {
        let name = capability.name.clone();
        self.entries.set(&name, &TaggedValue::object(capability))
    }

    pub fn find(&self, name: &str) -> Option<Arc<LocalCapability>> {
        self.entries.get(name).ok()?.downcast::<LocalCapability>().ok()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Run `task` on the blocking pool without waiting for it.
pub fn run_detached(task: Task, capability: Arc<LocalCapability>) {
    let name = task.capability.name.clone();
    tracing::debug!(
        "task_detached: capability={}, when={}, timeout={:?}",
        name,
        task.when,
        task.timeout
    );
    let function = Arc::clone(&capability.function);
    // Dropping the handle detaches the worker.
    drop(tokio::task::spawn_blocking(move || {
        function(task.capability.args.as_slice());
    }));
}
