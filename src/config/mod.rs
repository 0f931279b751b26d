//! Configuration documents.
//!
//! Every category may have a `<category>.cfg.json` (or `.cfg.jsn`) document in
//! the config directory. The document's `"typename"` field selects a converter
//! from the [`ConfigRegistry`], which turns the JSON into a typed object stored
//! as a [`TaggedValue`] in the shared config map.
//!
//! The converter table is built explicitly at startup; there is no implicit
//! self-registration.

mod documents;

pub use documents::{ConfigDocument, GroupConfig, IdentityConfig, NetworkConfig};

use crate::registry::RegistryDocument;
use crate::structures::{AssociativeMap, TaggedValue};
use crate::types::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Field naming a document's converter.
pub const TYPENAME_FIELD: &str = "typename";

/// Recognized config file suffixes.
pub const CONFIG_SUFFIXES: [&str; 2] = [".cfg.json", ".cfg.jsn"];

type Decoder = fn(Value) -> Result<TaggedValue>;
type Encoder = fn(&TaggedValue) -> Result<Value>;

/// One converter table entry.
#[derive(Clone, Copy)]
pub struct ConfigConverter {
    pub typename: &'static str,
    /// In-memory size of the decoded document.
    pub payload_size: usize,
    pub from_json: Decoder,
    pub to_json: Encoder,
}

impl std::fmt::Debug for ConfigConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigConverter")
            .field("typename", &self.typename)
            .field("payload_size", &self.payload_size)
            .finish_non_exhaustive()
    }
}

fn decode<T: ConfigDocument>(value: Value) -> Result<TaggedValue> {
    let document: T = serde_json::from_value(value)
        .map_err(|e| Error::config_format(format!("{}: {}", T::TYPENAME, e)))?;
    Ok(TaggedValue::object(document))
}

fn encode<T: ConfigDocument>(value: &TaggedValue) -> Result<Value> {
    to_document_json(&*value.downcast::<T>()?)
}

/// Serialize `document` with its `"typename"` field.
pub fn to_document_json<T: ConfigDocument>(document: &T) -> Result<Value> {
    let mut json = serde_json::to_value(document)?;
    match json.as_object_mut() {
        Some(object) => {
            object.insert(
                TYPENAME_FIELD.to_string(),
                Value::String(T::TYPENAME.to_string()),
            );
            Ok(json)
        }
        None => Err(Error::config_format(format!(
            "{} does not serialize to an object",
            T::TYPENAME
        ))),
    }
}

/// Parse a document that must carry `T`'s typename.
pub fn from_document_json<T: ConfigDocument>(json: Value) -> Result<T> {
    let typename = json.get(TYPENAME_FIELD).and_then(Value::as_str);
    if typename != Some(T::TYPENAME) {
        return Err(Error::config_format(format!(
            "expected typename '{}', found {:?}",
            T::TYPENAME,
            typename
        )));
    }
    serde_json::from_value(json).map_err(|e| Error::config_format(format!("{}: {}", T::TYPENAME, e)))
}

/// Converter table keyed by typename.
#[derive(Debug, Clone, Default)]
pub struct ConfigRegistry {
    converters: HashMap<&'static str, ConfigConverter>,
}

impl ConfigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with every built-in document type.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register::<IdentityConfig>();
        registry.register::<NetworkConfig>();
        registry.register::<GroupConfig>();
        registry.register::<RegistryDocument>();
        registry
    }

    pub fn register<T: ConfigDocument>(&mut self) {
        self.converters.insert(
            T::TYPENAME,
            ConfigConverter {
                typename: T::TYPENAME,
                payload_size: std::mem::size_of::<T>(),
                from_json: decode::<T>,
                to_json: encode::<T>,
            },
        );
    }

    pub fn find(&self, typename: &str) -> Result<&ConfigConverter> {
        self.converters
            .get(typename)
            .ok_or_else(|| Error::config_not_registered(typename.to_string()))
    }

    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }

    /// Convert a parsed document through its typename's converter.
    pub fn decode(&self, json: Value) -> Result<(&'static str, TaggedValue)> {
        let typename = json
            .as_object()
            .ok_or_else(|| Error::config_format("document is not a JSON object"))?
            .get(TYPENAME_FIELD)
            .and_then(Value::as_str)
            .ok_or_else(|| Error::config_format("missing string field 'typename'"))?;
        let converter = self.find(typename)?;
        let value = (converter.from_json)(json)?;
        Ok((converter.typename, value))
    }

    /// Read and convert one document file.
    pub fn read_file(&self, path: &Path) -> Result<(&'static str, TaggedValue)> {
        let raw = std::fs::read_to_string(path)?;
        let json: Value = serde_json::from_str(&raw)
            .map_err(|e| Error::config_format(format!("{}: {}", path.display(), e)))?;
        self.decode(json)
    }

    /// Write a typed value back as a document through its converter.
    pub fn write_file(&self, typename: &str, value: &TaggedValue, path: &Path) -> Result<()> {
        let converter = self.find(typename)?;
        let json = (converter.to_json)(value)?;
        std::fs::write(path, serde_json::to_string_pretty(&json)?)?;
        Ok(())
    }

    /// Scan `dir` for config documents and convert each one.
    ///
    /// Files named `skip` are ignored. A missing directory yields an empty
    /// scan. Per-file failures are logged and counted, never fatal.
    pub fn load_directory(&self, dir: &Path, skip: &str) -> Result<ConfigScan> {
        let mut scan = ConfigScan::default();
        if !dir.is_dir() {
            tracing::warn!("config_dir_missing: path={}", dir.display());
            return Ok(scan);
        }

        let mut files: Vec<(String, PathBuf)> = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if file_name == skip {
                continue;
            }
            if let Some(category) = category_of(&file_name) {
                files.push((category.to_string(), entry.path()));
            }
        }
        files.sort();

        for (category, path) in files {
            match self.read_file(&path) {
                Ok((typename, value)) => {
                    tracing::debug!(
                        "config_loaded: category={}, typename={}",
                        category,
                        typename
                    );
                    scan.configs.set(&category, &value)?;
                }
                Err(e) => {
                    let code = e.code();
                    tracing::error!(
                        "config_load_failed: path={}, code={}, code_name={}, description={}, error={}",
                        path.display(),
                        code.number(),
                        code.as_str(),
                        code.describe(),
                        e
                    );
                    scan.failures.push((path, e));
                }
            }
        }
        Ok(scan)
    }
}

/// Category part of a config file name, if it has a recognized suffix.
pub fn category_of(file_name: &str) -> Option<&str> {
    CONFIG_SUFFIXES
        .iter()
        .find_map(|suffix| file_name.strip_suffix(suffix))
        .filter(|category| !category.is_empty())
}

/// Result of a directory scan.
#[derive(Debug, Default)]
pub struct ConfigScan {
    /// Category → decoded document object.
    pub configs: AssociativeMap,
    pub failures: Vec<(PathBuf, Error)>,
}
