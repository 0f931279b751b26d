//! Message envelope: a tagged union of every message kind exchanged between
//! subsystems.
//!
//! Each variant has a small integer tag used for selective retrieval and a
//! fixed in-memory size reported through [`Envelope::size`]. Encoding for the
//! wire and signing are handled elsewhere; queues move envelopes as-is.

use crate::types::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Maximum signal descriptor length in bytes.
pub const SIGNAL_DESCR_LEN: usize = 32;

/// Descriptor of the shutdown signal.
pub const QUIT: &str = "quit";

// =============================================================================
// Message Types
// =============================================================================

/// Type tag carried by every enqueued message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Signal = 1,
    Group = 2,
    Peers = 3,
    Capabilities = 4,
    PeerCapabilities = 5,
    Task = 6,
    #[serde(rename = "NET_MSG")]
    NetMessage = 7,
}

impl MessageType {
    pub const ALL: [MessageType; 7] = [
        MessageType::Signal,
        MessageType::Group,
        MessageType::Peers,
        MessageType::Capabilities,
        MessageType::PeerCapabilities,
        MessageType::Task,
        MessageType::NetMessage,
    ];

    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.tag() == tag)
            .ok_or_else(|| Error::invalid_argument(format!("unknown message tag {}", tag)))
    }

    pub fn name(self) -> &'static str {
        match self {
            MessageType::Signal => "SIGNAL",
            MessageType::Group => "GROUP",
            MessageType::Peers => "PEERS",
            MessageType::Capabilities => "CAPABILITIES",
            MessageType::PeerCapabilities => "PEER_CAPABILITIES",
            MessageType::Task => "TASK",
            MessageType::NetMessage => "NET_MSG",
        }
    }

    /// Fixed in-memory size of this variant's payload.
    pub fn payload_size(self) -> usize {
        match self {
            MessageType::Signal => std::mem::size_of::<Signal>(),
            MessageType::Group => std::mem::size_of::<Group>(),
            MessageType::Peers => std::mem::size_of::<Peers>(),
            MessageType::Capabilities => std::mem::size_of::<Capabilities>(),
            MessageType::PeerCapabilities => std::mem::size_of::<PeerCapabilities>(),
            MessageType::Task => std::mem::size_of::<Task>(),
            MessageType::NetMessage => std::mem::size_of::<NetMessage>(),
        }
    }

    /// Types that update cached protocol state instead of reaching handlers.
    pub fn is_protocol_state(self) -> bool {
        matches!(
            self,
            MessageType::Group
                | MessageType::Peers
                | MessageType::Capabilities
                | MessageType::PeerCapabilities
        )
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MessageType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name() == s)
            .ok_or_else(|| Error::invalid_argument(format!("unknown message type '{}'", s)))
    }
}

// =============================================================================
// Payloads
// =============================================================================

/// Control signal, e.g. `quit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSignal")]
pub struct Signal {
    descr: String,
    sig: i32,
}

/// Unchecked wire form, validated through [`Signal::new`].
#[derive(Deserialize)]
struct RawSignal {
    descr: String,
    sig: i32,
}

impl TryFrom<RawSignal> for Signal {
    type Error = Error;

    fn try_from(raw: RawSignal) -> Result<Self> {
        Signal::new(raw.descr, raw.sig)
    }
}

impl Signal {
    /// Descriptor longer than [`SIGNAL_DESCR_LEN`] bytes is rejected.
    pub fn new(descr: impl Into<String>, sig: i32) -> Result<Self> {
        let descr = descr.into();
        if descr.len() > SIGNAL_DESCR_LEN {
            return Err(Error::invalid_argument(format!(
                "signal descriptor exceeds {} bytes",
                SIGNAL_DESCR_LEN
            )));
        }
        Ok(Self { descr, sig })
    }

    pub fn quit() -> Self {
        Self {
            descr: QUIT.to_string(),
            sig: -1,
        }
    }

    pub fn descr(&self) -> &str {
        &self.descr
    }

    pub fn sig(&self) -> i32 {
        self.sig
    }

    pub fn is_quit(&self) -> bool {
        self.descr == QUIT
    }
}

/// Group membership announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub uuid: String,
    pub address: String,
}

/// Public half of a peer identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicIdentity {
    pub uuid: String,
    pub address: String,
    #[serde(with = "base64_bytes")]
    pub public_key: Vec<u8>,
}

/// Known peers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Peers {
    pub peers: Vec<PublicIdentity>,
}

/// A named capability a process can execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Capability {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }
}

/// Capabilities offered by this node.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    pub capabilities: Vec<Capability>,
}

/// Capabilities advertised by one peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerCapabilities {
    pub peer: String,
    pub capabilities: Vec<Capability>,
}

/// Request to run a capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub capability: Capability,
    pub when: DateTime<Utc>,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

/// Opaque, already-encoded message addressed to a process function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetMessage {
    /// Target process category.
    pub process: String,
    /// Target handler name in that process.
    pub function: String,
    #[serde(with = "base64_bytes")]
    pub obj: Vec<u8>,
    pub to_whom: Option<String>,
    pub from_whom: Option<String>,
    #[serde(default)]
    pub encrypt: bool,
    pub return_to: Option<String>,
}

impl NetMessage {
    pub fn new(process: impl Into<String>, function: impl Into<String>, obj: Vec<u8>) -> Self {
        Self {
            process: process.into(),
            function: function.into(),
            obj,
            to_whom: None,
            from_whom: None,
            encrypt: false,
            return_to: None,
        }
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Payload union.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "info", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Payload {
    Signal(Signal),
    Group(Group),
    Peers(Peers),
    Capabilities(Capabilities),
    PeerCapabilities(PeerCapabilities),
    Task(Task),
    #[serde(rename = "NET_MSG")]
    NetMessage(NetMessage),
}

impl Payload {
    pub fn message_type(&self) -> MessageType {
        match self {
            Payload::Signal(_) => MessageType::Signal,
            Payload::Group(_) => MessageType::Group,
            Payload::Peers(_) => MessageType::Peers,
            Payload::Capabilities(_) => MessageType::Capabilities,
            Payload::PeerCapabilities(_) => MessageType::PeerCapabilities,
            Payload::Task(_) => MessageType::Task,
            Payload::NetMessage(_) => MessageType::NetMessage,
        }
    }
}

// =============================================================================
// Envelope
// =============================================================================

/// Typed message plus its payload size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    payload: Payload,
    size: usize,
}

impl Envelope {
    pub fn new(payload: Payload) -> Self {
        let size = payload.message_type().payload_size();
        Self { payload, size }
    }

    pub fn signal(signal: Signal) -> Self {
        Self::new(Payload::Signal(signal))
    }

    pub fn quit() -> Self {
        Self::signal(Signal::quit())
    }

    pub fn net_message(message: NetMessage) -> Self {
        Self::new(Payload::NetMessage(message))
    }

    pub fn task(task: Task) -> Self {
        Self::new(Payload::Task(task))
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn message_type(&self) -> MessageType {
        self.payload.message_type()
    }

    /// Handler name this message is addressed to, if any.
    pub fn target_function(&self) -> Option<&str> {
        match &self.payload {
            Payload::NetMessage(msg) => Some(&msg.function),
            Payload::Task(task) => Some(&task.capability.name),
            _ => None,
        }
    }

    pub fn is_quit(&self) -> bool {
        matches!(&self.payload, Payload::Signal(signal) if signal.is_quit())
    }
}
