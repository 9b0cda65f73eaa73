use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use stm_state::{ActorRecord, Address, Blockstore, Cid, MemoryBlockstore, StateTree, TokenAmount};

fn record(seed: u64) -> ActorRecord {
    ActorRecord::new(
        Cid::compute(&(seed % 3).to_be_bytes()),
        Cid::compute(&seed.to_be_bytes()),
        seed % 17,
        TokenAmount::from_atto(u128::from(seed)),
    )
}

fn flush_in_order(entries: &[(u64, u64)]) -> Cid {
    let store: Arc<dyn Blockstore> = Arc::new(MemoryBlockstore::new());
    let mut tree = StateTree::new(store).unwrap();
    for (id, seed) in entries {
        tree.set_actor(Address::new_id(*id), record(*seed)).unwrap();
    }
    tree.flush().unwrap()
}

proptest! {
    #[test]
    fn prop_root_independent_of_insertion_order(
        raw in prop::collection::btree_map(0u64..10_000, any::<u64>(), 0..64),
        shuffle_seed in any::<u64>(),
    ) {
        let entries: Vec<(u64, u64)> = raw.into_iter().collect();

        // Deterministic permutation driven by the seed.
        let mut permuted = entries.clone();
        permuted.sort_by_key(|(id, _)| Cid::compute(&(id ^ shuffle_seed).to_be_bytes()));

        prop_assert_eq!(flush_in_order(&entries), flush_in_order(&permuted));
    }

    #[test]
    fn prop_last_write_wins(
        id in 0u64..1000,
        first in any::<u64>(),
        second in any::<u64>(),
    ) {
        let store: Arc<dyn Blockstore> = Arc::new(MemoryBlockstore::new());
        let mut tree = StateTree::new(Arc::clone(&store)).unwrap();
        tree.set_actor(Address::new_id(id), record(first)).unwrap();
        tree.set_actor(Address::new_id(id), record(second)).unwrap();
        let root = tree.flush().unwrap();

        let loaded = StateTree::load(store, &root).unwrap();
        prop_assert_eq!(loaded.get_actor(&Address::new_id(id)).unwrap(), Some(record(second)));
    }
}

#[tokio::test]
async fn enumeration_is_stable_for_a_root() {
    let store: Arc<dyn Blockstore> = Arc::new(MemoryBlockstore::new());
    let mut tree = StateTree::new(Arc::clone(&store)).unwrap();
    for id in 0..500 {
        tree.set_actor(Address::new_id(id), record(id)).unwrap();
    }
    let root = tree.flush().unwrap();

    let mut orders = Vec::new();
    for _ in 0..2 {
        let tree = StateTree::load(Arc::clone(&store), &root).unwrap();
        let mut order = Vec::new();
        tree.for_each(|addr, _| {
            order.push(addr);
            async { Ok::<_, stm_state::StoreError>(()) }
        })
        .await
        .unwrap();
        orders.push(order);
    }
    assert_eq!(orders[0], orders[1]);

    let sorted: BTreeMap<_, _> = orders[0].iter().map(|a| (*a, ())).collect();
    assert_eq!(sorted.len(), 500);
    assert_ne!(
        orders[0],
        sorted.keys().copied().collect::<Vec<_>>(),
        "enumeration follows bucket order, not address order"
    );
}
