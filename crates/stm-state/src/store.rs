//! Content-addressed block store
//!
//! [`Blockstore`] is the storage seam shared by the input tree, the output
//! tree and every state migration. Implementations must accept concurrent
//! readers and writers.

use crate::cid::{Cid, CidError};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Block storage keyed by content identifier
pub trait Blockstore: Send + Sync {
    /// Fetch a block
    ///
    /// # Errors
    /// Returns error if the backend fails; a missing block is `Ok(None)`.
    fn get(&self, cid: &Cid) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store a block, returning its identifier
    ///
    /// # Errors
    /// Returns error if the backend rejects the write
    fn put(&self, data: &[u8]) -> Result<Cid, StoreError>;

    /// Check whether a block is present
    ///
    /// # Errors
    /// Returns error if the backend fails
    fn has(&self, cid: &Cid) -> Result<bool, StoreError> {
        Ok(self.get(cid)?.is_some())
    }
}

impl<B: Blockstore + ?Sized> Blockstore for Arc<B> {
    fn get(&self, cid: &Cid) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(cid)
    }

    fn put(&self, data: &[u8]) -> Result<Cid, StoreError> {
        (**self).put(data)
    }

    fn has(&self, cid: &Cid) -> Result<bool, StoreError> {
        (**self).has(cid)
    }
}

/// Typed access on top of raw blocks (JSON encoding)
pub trait BlockstoreExt: Blockstore {
    /// Encode and store a value
    ///
    /// # Errors
    /// Returns error on encoding or backend failure
    fn put_obj<T: Serialize + ?Sized>(&self, value: &T) -> Result<Cid, StoreError> {
        let bytes = serde_json::to_vec(value)?;
        self.put(&bytes)
    }

    /// Load and decode a value
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if the block is absent, or a codec
    /// error if it does not decode as `T`
    fn get_obj<T: DeserializeOwned>(&self, cid: &Cid) -> Result<T, StoreError> {
        let bytes = self.get(cid)?.ok_or(StoreError::NotFound(*cid))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl<B: Blockstore + ?Sized> BlockstoreExt for B {}

/// In-memory block store
///
/// Sharded map, safe for concurrent use from many tasks.
#[derive(Debug, Default)]
pub struct MemoryBlockstore {
    blocks: DashMap<Cid, Arc<[u8]>>,
}

impl MemoryBlockstore {
    /// Create an empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blocks
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Check if the store is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl Blockstore for MemoryBlockstore {
    fn get(&self, cid: &Cid) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.blocks.get(cid).map(|b| b.value().to_vec()))
    }

    fn put(&self, data: &[u8]) -> Result<Cid, StoreError> {
        let cid = Cid::compute(data);
        self.blocks.entry(cid).or_insert_with(|| Arc::from(data));
        Ok(cid)
    }

    fn has(&self, cid: &Cid) -> Result<bool, StoreError> {
        Ok(self.blocks.contains_key(cid))
    }
}

/// Errors from block storage and state tree access
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Block not present
    #[error("block not found: {0}")]
    NotFound(Cid),

    /// Block failed to encode or decode
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Malformed identifier
    #[error("invalid cid: {0}")]
    InvalidCid(#[from] CidError),

    /// Block decoded but is not a valid tree node
    #[error("malformed node {cid}: {reason}")]
    Malformed { cid: Cid, reason: String },

    /// Backend failure
    #[error("store backend error: {0}")]
    Backend(String),
}
