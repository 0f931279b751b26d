//! Subsystem runtime: cadence pacing, handler dispatch, detached tasks.

mod cadence;
mod runtime;
mod state;
mod task;

pub use cadence::Cadence;
pub use runtime::{
    reject, MessageHandler, ProcessChannels, ProcessContext, RunSummary, RunningProcess,
};
pub use state::{ProcessState, ProtocolState};
pub use task::{run_detached, CapabilityTable, LocalCapability};
