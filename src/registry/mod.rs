//! Process registry: which implementation runs for each subsystem category.
//!
//! The registry is persisted as `subsystems.cfg.json`:
//!
//! ```json
//! {"typename": "process_tracker",
//!  "subsystems": [{"identity": "id_proc"}, {"network": "udp_net_4"}]}
//! ```
//!
//! Implementation names resolve to entry points through the
//! [`ImplementationTable`], built once at startup.

mod implementations;

pub use implementations::{EntryPoint, ImplementationTable};

use crate::config::{from_document_json, to_document_json, ConfigDocument};
use crate::structures::{AssociativeMap, TaggedValue};
use crate::types::{Error, Result};
use crate::validation::validate_name;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Registry document file name.
pub const REGISTRY_FILENAME: &str = "subsystems.cfg.json";

/// Persisted form: an ordered list of single-entry objects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryDocument {
    pub subsystems: Vec<BTreeMap<String, String>>,
}

impl ConfigDocument for RegistryDocument {
    const TYPENAME: &'static str = "process_tracker";
}

/// Ordered map of category → implementation name.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    entries: AssociativeMap,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `category` to `implementation`, replacing any previous mapping.
    pub fn register(&mut self, category: &str, implementation: &str) -> Result<()> {
        validate_name(category, "category")?;
        validate_name(implementation, "implementation")?;
        self.entries
            .set(category, &TaggedValue::string(implementation))
    }

    pub fn implementation(&self, category: &str) -> Result<&str> {
        self.entries.get(category)?.as_str()
    }

    pub fn contains(&self, category: &str) -> bool {
        self.entries.contains_key(category)
    }

    /// `(category, implementation)` pairs in registration order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.entries
            .iter()
            .filter_map(|(category, value)| value.as_str().ok().map(|imp| (category, imp)))
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Independent copy for handing to subsystems.
    ///
    /// Entries were validated on the way in, so the only failure left is
    /// the copy's table allocation.
    pub fn snapshot(&self) -> Result<Self> {
        let mut copy = Self::new();
        for (category, value) in self.entries.iter() {
            copy.entries.set(category, value)?;
        }
        Ok(copy)
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    pub fn to_document(&self) -> RegistryDocument {
        RegistryDocument {
            subsystems: self
                .entries()
                .map(|(category, implementation)| {
                    BTreeMap::from([(category.to_string(), implementation.to_string())])
                })
                .collect(),
        }
    }

    /// Each list element must hold exactly one `category: implementation`
    /// pair. A repeated category keeps the last implementation.
    ///
    /// Entries that break this rule or carry an invalid name are skipped
    /// and reported in [`RegistryScan::failures`]; the rest still load.
    pub fn from_document(document: &RegistryDocument) -> RegistryScan {
        let mut scan = RegistryScan::default();
        for (position, entry) in document.subsystems.iter().enumerate() {
            let mut pairs = entry.iter();
            let outcome = match (pairs.next(), pairs.next()) {
                (Some((category, implementation)), None) => scan
                    .registry
                    .register(category, implementation)
                    .map_err(|e| Error::config_format(format!("subsystems[{}]: {}", position, e))),
                _ => Err(Error::config_format(format!(
                    "subsystems[{}] must hold exactly one entry",
                    position
                ))),
            };
            if let Err(e) = outcome {
                tracing::warn!("registry_entry_skipped: position={}, error={}", position, e);
                scan.failures.push((position, e));
            }
        }
        scan
    }

    pub fn to_file(&self, path: &Path) -> Result<()> {
        let json = to_document_json(&self.to_document())?;
        std::fs::write(path, serde_json::to_string_pretty(&json)?)?;
        tracing::debug!(
            "registry_written: path={}, entries={}",
            path.display(),
            self.len()
        );
        Ok(())
    }

    /// Read a registry document.
    ///
    /// An unreadable or malformed file is an error. Bad entries inside a
    /// well-formed document are not; see [`ProcessRegistry::from_document`].
    pub fn from_file(path: &Path) -> Result<RegistryScan> {
        let raw = std::fs::read_to_string(path)?;
        let json = serde_json::from_str(&raw)
            .map_err(|e| Error::config_format(format!("{}: {}", path.display(), e)))?;
        let document: RegistryDocument = from_document_json(json)?;
        Ok(Self::from_document(&document))
    }
}

/// Result of loading a registry document.
#[derive(Debug, Default)]
pub struct RegistryScan {
    pub registry: ProcessRegistry,
    /// Position in the `subsystems` list → why that entry was skipped.
    pub failures: Vec<(usize, Error)>,
}
