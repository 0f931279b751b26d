//! Compiled-in implementation table.

use crate::process::{RunSummary, RunningProcess};
use crate::subsystems;
use crate::types::{Error, Result};
use futures::future::BoxFuture;
use std::collections::BTreeMap;

/// Subsystem entry point. Receives its fully wired process and runs until
/// told to quit.
pub type EntryPoint = fn(RunningProcess) -> BoxFuture<'static, Result<RunSummary>>;

/// Implementation name → entry point.
#[derive(Clone, Default)]
pub struct ImplementationTable {
    entries: BTreeMap<String, EntryPoint>,
}

impl std::fmt::Debug for ImplementationTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

impl ImplementationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table holding the built-in subsystems.
    pub fn builtin() -> Self {
        let mut table = Self::new();
        table.register(subsystems::identity::IMPLEMENTATION, subsystems::identity::entry);
        table.register(subsystems::network::IMPLEMENTATION, subsystems::network::entry);
        table
    }

    pub fn register(&mut self, name: impl Into<String>, entry: EntryPoint) {
        let name = name.into();
        if self.entries.insert(name.clone(), entry).is_some() {
            tracing::warn!("implementation_replaced: name={}", name);
        }
    }

    pub fn find_implementation(&self, name: &str) -> Result<EntryPoint> {
        self.entries
            .get(name)
            .copied()
            .ok_or_else(|| Error::not_found(format!("implementation '{}'", name)))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
