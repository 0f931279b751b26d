//! Queue addressing.

use std::fmt;
use std::path::{Path, PathBuf};

/// Address of a message queue: a path under the configuration root plus a
/// per-queue identifier.
///
/// Two keys are the same queue iff both parts match, so independent runs
/// sharing a path stay apart as long as their identifiers differ.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueueKey {
    path: PathBuf,
    id: u32,
}

impl QueueKey {
    pub fn new(path: impl Into<PathBuf>, id: u32) -> Self {
        Self {
            path: path.into(),
            id,
        }
    }

    /// Key for queue `name` beneath `base`. A random identifier is used when
    /// `id` is `None`.
    pub fn derive(base: &Path, name: &str, id: Option<u32>) -> Self {
        Self::new(base.join(name), id.unwrap_or_else(random_queue_id))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Last path component, i.e. the queue name.
    pub fn name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }
}

impl fmt::Display for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{:08x}", self.path.display(), self.id)
    }
}

/// Fresh random queue identifier.
pub fn random_queue_id() -> u32 {
    uuid::Uuid::new_v4().as_u128() as u32
}
