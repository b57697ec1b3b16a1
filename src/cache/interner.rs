//! Object ID Interning
//!
//! The statistics engine indexes its matrices by dense IDs. Storage
//! addresses (here: chunk indices of a volume) are mapped onto
//! `0..capacity` in first-seen order, and the mapping can be inverted for
//! any ID that comes back in prefetch or eviction advice.
//!
//! Once `capacity` distinct addresses have been interned, new addresses are
//! rejected with [`Error::IdSpaceExhausted`]. Existing mappings keep
//! resolving.

use std::ops::Range;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;

use super::element::ObjectId;
use crate::error::{Error, Result};

/// Default chunk granularity in bytes
pub const DEFAULT_CHUNK_SIZE: u64 = 1024;

/// Chunk indices covered by `length` bytes starting at `offset`
pub fn chunk_span(offset: u64, length: u64, chunk_size: u64) -> Range<u64> {
    if length == 0 || chunk_size == 0 {
        return 0..0;
    }
    let first = offset / chunk_size;
    let last = offset.saturating_add(length - 1) / chunk_size;
    first..last + 1
}

/// Bijection between storage addresses and dense object IDs
#[derive(Debug)]
pub struct ObjectInterner {
    capacity: u64,
    forward: DashMap<u64, ObjectId>,
    reverse: RwLock<Vec<u64>>,
}

impl ObjectInterner {
    /// Create an interner handing out IDs below `capacity`
    pub fn new(capacity: u64) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidConfig(
                "interner capacity must be at least 1".into(),
            ));
        }
        Ok(Self {
            capacity,
            forward: DashMap::new(),
            reverse: RwLock::new(Vec::new()),
        })
    }

    /// Dense ID for `address`, allocating one on first sight
    pub fn intern(&self, address: u64) -> Result<ObjectId> {
        match self.forward.entry(address) {
            Entry::Occupied(entry) => Ok(*entry.get()),
            Entry::Vacant(entry) => {
                let mut reverse = self.reverse.write();
                let next = reverse.len() as u64;
                if next >= self.capacity {
                    return Err(Error::IdSpaceExhausted {
                        capacity: self.capacity,
                    });
                }
                reverse.push(address);
                entry.insert(next);
                Ok(next)
            }
        }
    }

    /// Dense ID for an address already interned
    pub fn lookup(&self, address: u64) -> Option<ObjectId> {
        self.forward.get(&address).map(|id| *id)
    }

    /// Storage address behind a dense ID
    pub fn resolve(&self, id: ObjectId) -> Option<u64> {
        let index = usize::try_from(id).ok()?;
        self.reverse.read().get(index).copied()
    }

    /// Interned address count
    pub fn len(&self) -> usize {
        self.reverse.read().len()
    }

    /// Check if nothing was interned
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the dense ID space
    pub fn capacity(&self) -> u64 {
        self.capacity
    }
}
