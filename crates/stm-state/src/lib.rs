//! Actor state storage
//!
//! Content-addressed blocks and the actor state tree that the migration
//! pipeline reads from and writes to.
//!
//! # Core Concepts
//!
//! - [`Cid`]: 32-byte blake3 content identifier, used for codes and blocks
//! - [`ActorRecord`]: code, head, call sequence number and balance of an actor
//! - [`Blockstore`]: concurrent block storage seam
//! - [`StateTree`]: address-keyed tree of actor records
//!
//! # Example
//!
//! ```rust,ignore
//! use stm_state::{ActorRecord, Address, MemoryBlockstore, StateTree};
//!
//! let store = Arc::new(MemoryBlockstore::new());
//! let mut tree = StateTree::new(store.clone())?;
//! tree.set_actor(Address::new_id(100), record)?;
//! let root = tree.flush()?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod cid;
mod store;
mod tree;
mod types;

pub mod builtin;

pub use builtin::{actor_name_by_code, ActorKind, ActorsVersion};
pub use cid::{Cid, CidError};
pub use store::{Blockstore, BlockstoreExt, MemoryBlockstore, StoreError};
pub use tree::{StateTree, FANOUT};
pub use types::{ActorRecord, Address, AddressError, ChainEpoch, TokenAmount};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
