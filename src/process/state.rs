//! Runtime loop state and cached protocol state.

use crate::messaging::{Capability, Envelope, Group, Payload, PublicIdentity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Runtime loop state.
///
/// ```text
/// RUNNING → STOPPING
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Running,
    Stopping,
}

impl ProcessState {
    pub fn is_terminal(self) -> bool {
        self == ProcessState::Stopping
    }

    pub fn can_transition_to(self, to: ProcessState) -> bool {
        matches!((self, to), (ProcessState::Running, ProcessState::Stopping))
    }
}

/// Protocol facts a process has been told about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolState {
    pub group: Option<Group>,
    /// Known peers keyed by uuid.
    pub peers: BTreeMap<String, PublicIdentity>,
    /// Capabilities this node offers.
    pub capabilities: Vec<Capability>,
    /// Capabilities advertised by each peer.
    pub peer_capabilities: BTreeMap<String, Vec<Capability>>,
    /// Bumped on every update.
    pub phase: u64,
}

impl ProtocolState {
    /// Fold a protocol-state message into the cache.
    ///
    /// Returns `false` (leaving the cache untouched) for any other message type.
    pub fn apply(&mut self, envelope: &Envelope) -> bool {
        match envelope.payload() {
            Payload::Group(group) => {
                self.group = Some(group.clone());
            }
            Payload::Peers(peers) => {
                for peer in &peers.peers {
                    self.peers.insert(peer.uuid.clone(), peer.clone());
                }
            }
            Payload::Capabilities(caps) => {
                self.capabilities = caps.capabilities.clone();
            }
            Payload::PeerCapabilities(caps) => {
                self.peer_capabilities
                    .insert(caps.peer.clone(), caps.capabilities.clone());
            }
            Payload::Signal(_) | Payload::Task(_) | Payload::NetMessage(_) => return false,
        }
        self.phase += 1;
        true
    }
}
