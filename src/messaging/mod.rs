//! Typed inter-subsystem messaging.
//!
//! Subsystems exchange [`Envelope`]s over non-blocking FIFO queues addressed
//! by [`QueueKey`]. Each category owns one data queue and one signal queue;
//! the supervisor owns its own data queue plus the external ingress and
//! egress queues.

mod envelope;
mod keys;
mod queue;
mod set;

pub use envelope::{
    Capabilities, Capability, Envelope, Group, MessageType, NetMessage, Payload,
    PeerCapabilities, Peers, PublicIdentity, Signal, Task, QUIT, SIGNAL_DESCR_LEN,
};
pub use keys::{random_queue_id, QueueKey};
pub use queue::{BrokerStats, Channel, QueueBroker, TypeSelector};
pub use set::QueueSet;

/// Supervisor's own data queue.
pub const SUPERVISOR_QUEUE: &str = "supervisor";

/// External ingress queue.
pub const EXTERN_IN_QUEUE: &str = "extern_in";

/// External egress queue.
pub const EXTERN_OUT_QUEUE: &str = "extern_out";

/// Name of the signal queue paired with `category`.
pub fn signal_queue_name(category: &str, suffix: &str) -> String {
    format!("{category}{suffix}")
}
