//! Queue Registry - diagnostic view of live queues
//!
//! The queue calls these hooks after its own critical section is released.
//! They are best effort: an `Err` is logged and the queue operation still
//! succeeds.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use spin::RwLock;

use super::QueueId;
use crate::error::RegistryError;

/// What a registry learns about a queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueInfo {
    pub id: QueueId,
    pub name: String,
    pub capacity: usize,
    pub item_size: usize,
}

/// Observer notified on queue lifecycle events
pub trait QueueRegistry: Send + Sync {
    /// Channel created or replaced with a new geometry
    fn on_create(&self, queue: &QueueInfo) -> Result<(), RegistryError>;

    /// Name changed on an idempotent re-initialize
    fn on_rename(&self, queue: &QueueInfo) -> Result<(), RegistryError> {
        let _ = queue;
        Ok(())
    }

    /// Channel released
    fn on_destroy(&self, id: QueueId) -> Result<(), RegistryError>;
}

/// In-memory registry keyed by queue id
pub struct NameRegistry {
    entries: RwLock<BTreeMap<QueueId, QueueInfo>>,
    limit: Option<usize>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            limit: None,
        }
    }

    /// Registry refusing entries past `limit`
    pub fn with_limit(limit: usize) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            limit: Some(limit),
        }
    }

    pub fn get(&self, id: QueueId) -> Option<QueueInfo> {
        self.entries.read().get(&id).cloned()
    }

    /// First queue registered under `name`
    pub fn lookup(&self, name: &str) -> Option<QueueInfo> {
        self.entries
            .read()
            .values()
            .find(|info| info.name == name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// All entries, ordered by id
    pub fn snapshot(&self) -> Vec<QueueInfo> {
        self.entries.read().values().cloned().collect()
    }
}

impl Default for NameRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueRegistry for NameRegistry {
    fn on_create(&self, queue: &QueueInfo) -> Result<(), RegistryError> {
        let mut entries = self.entries.write();
        if let Some(limit) = self.limit {
            // Replacement of a known id never counts against the limit
            if !entries.contains_key(&queue.id) && entries.len() >= limit {
                return Err(RegistryError::Full { limit });
            }
        }
        entries.insert(queue.id, queue.clone());
        Ok(())
    }

    fn on_rename(&self, queue: &QueueInfo) -> Result<(), RegistryError> {
        match self.entries.write().get_mut(&queue.id) {
            Some(entry) => {
                entry.name = queue.name.clone();
                Ok(())
            }
            None => Err(RegistryError::UnknownQueue { id: queue.id.0 }),
        }
    }

    fn on_destroy(&self, id: QueueId) -> Result<(), RegistryError> {
        match self.entries.write().remove(&id) {
            Some(_) => Ok(()),
            None => Err(RegistryError::UnknownQueue { id: id.0 }),
        }
    }
}
