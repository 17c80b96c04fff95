//! In-memory channel catalog
//!
//! The live list is an immutable [`CatalogGeneration`] behind an `Arc`.
//! Publishing swaps the pointer; readers keep whatever generation they
//! cloned, so a list is always entirely old or entirely new.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::Channel;

/// One complete set of channels from a single ingestion run
#[derive(Debug)]
pub struct CatalogGeneration {
    number: u64,
    published_at: DateTime<Utc>,
    channels: Vec<Channel>,
    index: HashMap<String, usize>,
}

impl CatalogGeneration {
    fn new(number: u64, channels: Vec<Channel>) -> Self {
        let mut index = HashMap::with_capacity(channels.len());
        for (position, channel) in channels.iter().enumerate() {
            index.entry(channel.id.clone()).or_insert(position);
        }

        Self {
            number,
            published_at: Utc::now(),
            channels,
            index,
        }
    }

    /// Generation number, 0 for the empty startup generation
    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }

    /// Channels in source document order
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Channel> {
        self.index.get(id).and_then(|&position| self.channels.get(position))
    }
}

/// Process-wide holder of the live generation
#[derive(Debug)]
pub struct Catalog {
    current: RwLock<Arc<CatalogGeneration>>,
    /// Serializes publishers; readers never take it
    publish: Mutex<()>,
}

impl Catalog {
    /// Create an empty catalog (generation 0)
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(CatalogGeneration::new(0, Vec::new()))),
            publish: Mutex::new(()),
        }
    }

    /// Snapshot of the live generation
    pub fn list(&self) -> Arc<CatalogGeneration> {
        self.current.read().clone()
    }

    pub fn find_by_id(&self, id: &str) -> Option<Channel> {
        self.list().find_by_id(id).cloned()
    }

    /// Playable channel for an id. An empty stream URL counts as not found.
    pub fn resolve_channel(&self, id: &str) -> Option<Channel> {
        self.find_by_id(id)
            .filter(|channel| !channel.stream_url.is_empty())
    }

    /// Publish `channels` as the new live generation and return its number.
    ///
    /// Duplicate ids keep their first position for lookups. The index is
    /// built before the write lock is taken, so readers only wait for the swap.
    pub fn replace(&self, channels: Vec<Channel>) -> u64 {
        let _publishing = self.publish.lock();
        let number = self.generation() + 1;
        let next = Arc::new(CatalogGeneration::new(number, channels));

        *self.current.write() = next;
        number
    }

    pub fn len(&self) -> usize {
        self.list().len()
    }

    pub fn is_empty(&self) -> bool {
        self.list().is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.list().number()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}
