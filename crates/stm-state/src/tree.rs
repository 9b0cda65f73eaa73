//! Actor state tree
//!
//! Maps [`Address`] to [`ActorRecord`]. The persisted form is a root node
//! holding 256 optional bucket links; an address lives in the bucket named by
//! the first byte of the blake3 digest of its id. Bucket entries are kept
//! sorted by address, so the flushed root depends only on the set of
//! entries and never on insertion order.

use crate::cid::Cid;
use crate::store::{Blockstore, BlockstoreExt, StoreError};
use crate::types::{ActorRecord, Address};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Number of buckets under the root node
pub const FANOUT: usize = 256;

const TREE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct RootNode {
    version: u32,
    buckets: Vec<Option<Cid>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct BucketNode {
    entries: Vec<(Address, ActorRecord)>,
}

type Bucket = BTreeMap<Address, ActorRecord>;

/// Handle on an actor state tree backed by a [`Blockstore`]
///
/// Modified buckets are held in memory until [`flush`](Self::flush).
pub struct StateTree {
    store: Arc<dyn Blockstore>,
    buckets: Vec<Option<Cid>>,
    dirty: BTreeMap<usize, Bucket>,
}

impl fmt::Debug for StateTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateTree")
            .field("linked_buckets", &self.buckets.iter().flatten().count())
            .field("dirty_buckets", &self.dirty.len())
            .finish()
    }
}

impl StateTree {
    /// Create an empty tree
    ///
    /// # Errors
    /// Infallible for the builtin layout; kept fallible for store-backed
    /// layouts that must write an initial node.
    pub fn new(store: Arc<dyn Blockstore>) -> Result<Self, StoreError> {
        Ok(Self {
            store,
            buckets: vec![None; FANOUT],
            dirty: BTreeMap::new(),
        })
    }

    /// Load a tree from its root identifier
    ///
    /// # Errors
    /// Returns error if the root block is missing or malformed
    pub fn load(store: Arc<dyn Blockstore>, root: &Cid) -> Result<Self, StoreError> {
        let node: RootNode = store.get_obj(root)?;
        if node.version != TREE_VERSION || node.buckets.len() != FANOUT {
            return Err(StoreError::Malformed {
                cid: *root,
                reason: format!(
                    "version {} with {} buckets",
                    node.version,
                    node.buckets.len()
                ),
            });
        }
        Ok(Self {
            store,
            buckets: node.buckets,
            dirty: BTreeMap::new(),
        })
    }

    /// Store backing this tree
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Blockstore> {
        &self.store
    }

    /// Look up an actor
    ///
    /// # Errors
    /// Returns error if the bucket block cannot be loaded
    pub fn get_actor(&self, address: &Address) -> Result<Option<ActorRecord>, StoreError> {
        let idx = bucket_index(address);
        if let Some(bucket) = self.dirty.get(&idx) {
            return Ok(bucket.get(address).copied());
        }
        Ok(self.load_bucket(idx)?.get(address).copied())
    }

    /// Insert or overwrite an actor
    ///
    /// # Errors
    /// Returns error if the existing bucket block cannot be loaded
    pub fn set_actor(&mut self, address: Address, actor: ActorRecord) -> Result<(), StoreError> {
        let idx = bucket_index(&address);
        if !self.dirty.contains_key(&idx) {
            let bucket = self.load_bucket(idx)?;
            self.dirty.insert(idx, bucket);
        }
        self.dirty.entry(idx).or_default().insert(address, actor);
        Ok(())
    }

    /// Visit every actor, bucket by bucket
    ///
    /// The order is stable for a given root but not sorted by address.
    /// Stops at the first error returned by `visit` and propagates it.
    ///
    /// # Errors
    /// Returns the first visitor error, or a store error converted into `E`
    pub async fn for_each<F, Fut, E>(&self, mut visit: F) -> Result<(), E>
    where
        F: FnMut(Address, ActorRecord) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: From<StoreError>,
    {
        for idx in 0..FANOUT {
            let loaded;
            let bucket = match self.dirty.get(&idx) {
                Some(bucket) => bucket,
                None if self.buckets[idx].is_none() => continue,
                None => {
                    loaded = self.load_bucket(idx)?;
                    &loaded
                }
            };
            for (address, actor) in bucket {
                visit(*address, *actor).await?;
            }
        }
        Ok(())
    }

    /// Write modified buckets and the root node
    ///
    /// # Errors
    /// Returns error if any block write fails
    pub fn flush(&mut self) -> Result<Cid, StoreError> {
        for (idx, bucket) in std::mem::take(&mut self.dirty) {
            self.buckets[idx] = if bucket.is_empty() {
                None
            } else {
                let node = BucketNode {
                    entries: bucket.into_iter().collect(),
                };
                Some(self.store.put_obj(&node)?)
            };
        }
        self.store.put_obj(&RootNode {
            version: TREE_VERSION,
            buckets: self.buckets.clone(),
        })
    }

    fn load_bucket(&self, idx: usize) -> Result<Bucket, StoreError> {
        match &self.buckets[idx] {
            None => Ok(Bucket::new()),
            Some(cid) => {
                let node: BucketNode = self.store.get_obj(cid)?;
                Ok(node.entries.into_iter().collect())
            }
        }
    }
}

fn bucket_index(address: &Address) -> usize {
    usize::from(Cid::compute(&address.to_bytes()).as_bytes()[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBlockstore;
    use crate::types::TokenAmount;

    fn record(n: u64) -> ActorRecord {
        ActorRecord::new(
            Cid::compute(b"code"),
            Cid::compute(&n.to_be_bytes()),
            n,
            TokenAmount::from_atto(u128::from(n) * 10),
        )
    }

    fn store() -> Arc<dyn Blockstore> {
        Arc::new(MemoryBlockstore::new())
    }

    #[test]
    fn empty_tree_flushes_and_loads() {
        let store = store();
        let mut tree = StateTree::new(Arc::clone(&store)).unwrap();
        let root = tree.flush().unwrap();
        let loaded = StateTree::load(store, &root).unwrap();
        assert!(loaded.get_actor(&Address::new_id(1)).unwrap().is_none());
    }

    #[test]
    fn set_flush_load_get() {
        let store = store();
        let mut tree = StateTree::new(Arc::clone(&store)).unwrap();
        for i in 0..50 {
            tree.set_actor(Address::new_id(i), record(i)).unwrap();
        }
        let root = tree.flush().unwrap();

        let loaded = StateTree::load(store, &root).unwrap();
        for i in 0..50 {
            assert_eq!(loaded.get_actor(&Address::new_id(i)).unwrap(), Some(record(i)));
        }
    }

    #[test]
    fn overwrite_after_load_keeps_other_entries() {
        let store = store();
        let mut tree = StateTree::new(Arc::clone(&store)).unwrap();
        tree.set_actor(Address::new_id(1), record(1)).unwrap();
        tree.set_actor(Address::new_id(2), record(2)).unwrap();
        let root = tree.flush().unwrap();

        let mut tree = StateTree::load(Arc::clone(&store), &root).unwrap();
        tree.set_actor(Address::new_id(1), record(100)).unwrap();
        let root2 = tree.flush().unwrap();
        assert_ne!(root, root2);

        let loaded = StateTree::load(store, &root2).unwrap();
        assert_eq!(loaded.get_actor(&Address::new_id(1)).unwrap(), Some(record(100)));
        assert_eq!(loaded.get_actor(&Address::new_id(2)).unwrap(), Some(record(2)));
    }

    #[test]
    fn load_unknown_root_fails() {
        let err = StateTree::load(store(), &Cid::compute(b"no root")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn load_rejects_foreign_block() {
        let store = store();
        let cid = store.put_obj(&RootNode { version: 9, buckets: vec![] }).unwrap();
        let err = StateTree::load(store, &cid).unwrap_err();
        assert!(matches!(err, StoreError::Malformed { .. }));
    }

    #[tokio::test]
    async fn for_each_visits_every_entry_once() {
        let store = store();
        let mut tree = StateTree::new(Arc::clone(&store)).unwrap();
        for i in 0..200 {
            tree.set_actor(Address::new_id(i), record(i)).unwrap();
        }
        let root = tree.flush().unwrap();
        let tree = StateTree::load(store, &root).unwrap();

        let mut seen = Vec::new();
        tree.for_each(|addr, actor| {
            seen.push((addr, actor));
            async { Ok::<_, StoreError>(()) }
        })
        .await
        .unwrap();

        assert_eq!(seen.len(), 200);
        let mut addrs: Vec<_> = seen.iter().map(|(a, _)| a.id()).collect();
        addrs.sort_unstable();
        addrs.dedup();
        assert_eq!(addrs.len(), 200);
        assert!(seen.iter().all(|(a, r)| *r == record(a.id())));
    }

    #[tokio::test]
    async fn for_each_stops_at_first_error() {
        let store = store();
        let mut tree = StateTree::new(store).unwrap();
        for i in 0..20 {
            tree.set_actor(Address::new_id(i), record(i)).unwrap();
        }

        let mut visits = 0;
        let result = tree
            .for_each(|_, _| {
                visits += 1;
                let fail = visits == 5;
                async move {
                    if fail {
                        Err(StoreError::Backend("stop".into()))
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert!(matches!(result, Err(StoreError::Backend(_))));
        assert_eq!(visits, 5);
    }
}
