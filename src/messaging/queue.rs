//! In-memory message queues.
//!
//! Each queue is FIFO, and receiving never blocks: an empty queue (or no
//! message of the requested type) is `Ok(None)`, which drives cooperative
//! polling. A receive can select a single message type, in which case the
//! first message with that tag is taken and the rest keep their order.
//!
//! The broker hands out [`Channel`]s by [`QueueKey`]. Opening an existing key
//! attaches to the same queue, so a sender and a receiver only need to agree
//! on the key.

use super::envelope::{Envelope, MessageType};
use super::keys::QueueKey;
use crate::types::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Which messages a receive may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeSelector {
    Any,
    Only(MessageType),
}

impl TypeSelector {
    fn matches(self, envelope: &Envelope) -> bool {
        match self {
            TypeSelector::Any => true,
            TypeSelector::Only(t) => envelope.message_type() == t,
        }
    }
}

// =============================================================================
// Queue
// =============================================================================

#[derive(Debug)]
struct MessageQueue {
    key: QueueKey,
    messages: Mutex<VecDeque<Envelope>>,
    capacity: Option<usize>,
    closed: AtomicBool,
}

#[derive(Debug, Default)]
struct Counters {
    sent: AtomicU64,
    received: AtomicU64,
    rejected: AtomicU64,
}

/// Handle onto one queue. Cheap to clone; every clone sees the same queue.
#[derive(Debug, Clone)]
pub struct Channel {
    queue: Arc<MessageQueue>,
    counters: Arc<Counters>,
}

impl Channel {
    pub fn key(&self) -> &QueueKey {
        &self.queue.key
    }

    /// Queue name (last component of the key path).
    pub fn name(&self) -> &str {
        self.queue.key.name()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, VecDeque<Envelope>>> {
        self.queue
            .messages
            .lock()
            .map_err(|_| Error::internal(format!("queue {} lock poisoned", self.queue.key)))
    }

    /// Enqueue without blocking.
    ///
    /// Fails with [`Error::QueueFull`] at capacity and with
    /// [`Error::SystemCall`] once the queue has been closed.
    pub fn send(&self, envelope: Envelope) -> Result<()> {
        if self.queue.closed.load(Ordering::Acquire) {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(Error::system_call(format!("queue {} is closed", self.queue.key)));
        }
        let mut messages = self.lock()?;
        if let Some(capacity) = self.queue.capacity {
            if messages.len() >= capacity {
                drop(messages);
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                return Err(Error::queue_full(self.queue.key.to_string()));
            }
        }
        let message_type = envelope.message_type();
        messages.push_back(envelope);
        drop(messages);
        self.counters.sent.fetch_add(1, Ordering::Relaxed);

        tracing::trace!(
            "queue_send: queue={}, type={}",
            self.queue.key.name(),
            message_type
        );
        Ok(())
    }

    /// Take the first message accepted by `selector`, if any.
    pub fn try_recv(&self, selector: TypeSelector) -> Result<Option<Envelope>> {
        let mut messages = self.lock()?;
        let position = messages.iter().position(|env| selector.matches(env));
        let envelope = position.and_then(|i| messages.remove(i));
        drop(messages);
        if envelope.is_some() {
            self.counters.received.fetch_add(1, Ordering::Relaxed);
        }
        Ok(envelope)
    }

    pub fn len(&self) -> usize {
        self.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.queue.closed.load(Ordering::Acquire)
    }
}

// =============================================================================
// Broker
// =============================================================================

/// Statistics about broker usage.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerStats {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub sends_rejected: u64,
    pub open_queues: usize,
}

/// Registry of open queues keyed by [`QueueKey`].
#[derive(Debug)]
pub struct QueueBroker {
    queues: Mutex<HashMap<QueueKey, Arc<MessageQueue>>>,
    counters: Arc<Counters>,
    default_capacity: Option<usize>,
}

impl Default for QueueBroker {
    fn default() -> Self {
        Self::new(None)
    }
}

impl QueueBroker {
    /// Broker whose queues hold at most `default_capacity` messages.
    pub fn new(default_capacity: Option<usize>) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            counters: Arc::new(Counters::default()),
            default_capacity,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<QueueKey, Arc<MessageQueue>>>> {
        self.queues
            .lock()
            .map_err(|_| Error::internal("queue broker lock poisoned"))
    }

    /// Open `key`, creating the queue if needed.
    pub fn open(&self, key: &QueueKey) -> Result<Channel> {
        let mut queues = self.lock()?;
        let queue = match queues.get(key) {
            Some(queue) => Arc::clone(queue),
            None => {
                let queue = Arc::new(MessageQueue {
                    key: key.clone(),
                    messages: Mutex::new(VecDeque::new()),
                    capacity: self.default_capacity,
                    closed: AtomicBool::new(false),
                });
                queues.insert(key.clone(), Arc::clone(&queue));
                tracing::debug!("queue_opened: key={}", key);
                queue
            }
        };
        Ok(Channel {
            queue,
            counters: Arc::clone(&self.counters),
        })
    }

    /// Close `key`. Outstanding channels fail on send; pending messages are
    /// dropped.
    pub fn close(&self, key: &QueueKey) -> Result<()> {
        let queue = self
            .lock()?
            .remove(key)
            .ok_or_else(|| Error::not_found(format!("queue {}", key)))?;
        queue.closed.store(true, Ordering::Release);
        if let Ok(mut messages) = queue.messages.lock() {
            messages.clear();
        }
        tracing::debug!("queue_closed: key={}", key);
        Ok(())
    }

    /// Close every open queue. Returns how many were closed.
    pub fn close_all(&self) -> Result<usize> {
        let keys: Vec<QueueKey> = self.lock()?.keys().cloned().collect();
        for key in &keys {
            self.close(key)?;
        }
        Ok(keys.len())
    }

    pub fn is_open(&self, key: &QueueKey) -> bool {
        self.lock().map(|q| q.contains_key(key)).unwrap_or(false)
    }

    pub fn stats(&self) -> BrokerStats {
        BrokerStats {
            messages_sent: self.counters.sent.load(Ordering::Relaxed),
            messages_received: self.counters.received.load(Ordering::Relaxed),
            sends_rejected: self.counters.rejected.load(Ordering::Relaxed),
            open_queues: self.lock().map(|q| q.len()).unwrap_or(0),
        }
    }
}
