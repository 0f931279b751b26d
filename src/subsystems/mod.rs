//! Built-in subsystem implementations.

pub mod identity;
pub mod network;
