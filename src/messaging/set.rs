//! Named collection of channels.

use super::queue::Channel;
use crate::structures::{AssociativeMap, TaggedValue};
use crate::types::{Error, Result};

/// Channels addressable by queue name, iterated in insertion order.
#[derive(Debug, Default)]
pub struct QueueSet {
    channels: AssociativeMap,
}

impl QueueSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `channel` under its own queue name.
    pub fn insert(&mut self, channel: Channel) -> Result<()> {
        let name = channel.name().to_string();
        self.channels.set(&name, &TaggedValue::object(channel))
    }

    pub fn fetch(&self, name: &str) -> Result<Channel> {
        let channel = self
            .channels
            .get(name)
            .map_err(|_| Error::not_found(format!("queue '{}'", name)))?
            .downcast::<Channel>()?;
        Ok(Channel::clone(&channel))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.channels.keys()
    }

    /// Every channel in insertion order.
    pub fn channels(&self) -> Vec<Channel> {
        self.channels
            .iter()
            .filter_map(|(_, value)| value.downcast::<Channel>().ok())
            .map(|channel| Channel::clone(&channel))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
