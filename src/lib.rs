//! # AutonomousTrust Core - Node Orchestration Substrate
//!
//! Supervision and messaging for the subsystems of one fleet node:
//! - Reference-counted tagged values, dynamic arrays and an open-addressing map
//! - A persisted process registry mapping categories to implementations
//! - Typed message envelopes over non-blocking in-memory queues
//! - A cadence-paced runtime loop per subsystem
//! - A supervisor that spawns, monitors, drains and shuts subsystems down
//!
//! ## Architecture
//!
//! Every subsystem is an isolated task. Tasks share nothing but their queues
//! and a read-only configuration snapshot:
//! ```text
//!                  ┌──────────────────────────────┐
//!   extern_in  →   │          Supervisor          │   → extern_out
//!                  │  registry · configs · queues │
//!                  └──────┬─────────────────┬─────┘
//!              data/signal│                 │data/signal
//!                  ┌──────▼─────┐     ┌─────▼──────┐
//!                  │  identity  │ ──→ │  network   │
//!                  │ (id_proc)  │     │(udp_net_4) │
//!                  └────────────┘     └────────────┘
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod messaging;
pub mod process;
pub mod registry;
pub mod shutdown;
pub mod structures;
pub mod subsystems;
pub mod supervisor;
pub mod types;

// Internal utilities
pub mod observability;
pub mod validation;

pub use types::{Config, Error, Result};
