//! Core types for the node runtime.
//!
//! This module provides foundational types used throughout the system:
//! - **IDs**: Strongly-typed identifiers (Category, ImplementationId, RunId)
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: Paths, cadences and queue limits

mod config;
mod errors;
mod ids;

pub use config::{
    Config, MessagingConfig, ObservabilityConfig, PathsConfig, RuntimeConfig, SupervisorConfig,
    CFG_PATH, DATA_PATH, ROOT_ENV_VAR,
};
pub use errors::{Error, ErrorCode, Result};
pub use ids::{Category, ImplementationId, RunId};
