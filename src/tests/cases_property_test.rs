// Property tests: list counters against a simple model under random operations.

use proptest::prelude::*;
use std::sync::Arc;

use crate::lru::{LruItem, LruStatus};
use crate::memcg::Memcg;
use crate::registry::LruRegistry;
use crate::support::{items, memcg_lru, tree, TestItem};

const ITEMS: usize = 12;
const NODES: usize = 2;

#[derive(Debug, Clone)]
enum Op {
    Add { item: usize, nid: usize, memcg: usize },
    Del { item: usize },
    Walk { nid: usize, budget: usize, seed: u64 },
    Reparent { memcg: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..ITEMS, 0..NODES, 0..5usize).prop_map(|(item, nid, memcg)| Op::Add { item, nid, memcg }),
        2 => (0..ITEMS).prop_map(|item| Op::Del { item }),
        2 => (0..NODES, 0..8usize, any::<u64>()).prop_map(|(nid, budget, seed)| Op::Walk { nid, budget, seed }),
        1 => (1..5usize).prop_map(|memcg| Op::Reparent { memcg }),
    ]
}

fn verdict(item: &TestItem, seed: u64) -> LruStatus {
    match item.id.wrapping_add(seed) % 4 {
        0 => LruStatus::Removed,
        1 => LruStatus::Rotate,
        2 => LruStatus::Skip,
        _ => LruStatus::Retry,
    }
}

proptest! {
    #[test]
    fn prop_counts_follow_model(ops in proptest::collection::vec(op_strategy(), 1..80)) {
        let registry = LruRegistry::new();
        let lru = memcg_lru(NODES, &registry);
        let t = tree();
        let memcgs: [Option<&Arc<Memcg>>; 5] = [None, Some(&t.a), Some(&t.b), Some(&t.c), Some(&t.d)];
        let items: Vec<Arc<TestItem>> = items(ITEMS as u64);
        // Where each item was added: (node, memcg index).
        let mut model: Vec<Option<(usize, usize)>> = vec![None; ITEMS];

        for op in ops {
            match op {
                Op::Add { item, nid, memcg } => {
                    let owner = memcgs[memcg];
                    if let Some(m) = owner {
                        lru.memcg_alloc(m).unwrap();
                    }
                    let added = lru.add(&items[item], nid, owner.map(|m| &**m));
                    prop_assert_eq!(added, model[item].is_none());
                    if added {
                        model[item] = Some((nid, memcg));
                    }
                }
                Op::Del { item } => {
                    let (nid, memcg) = model[item].unwrap_or((0, 0));
                    let deleted = lru.del(&items[item], nid, memcgs[memcg].map(|m| &**m));
                    prop_assert_eq!(deleted, model[item].is_some());
                    model[item] = None;
                }
                Op::Walk { nid, budget, seed } => {
                    let before = lru.count_node(nid);
                    let mut left = budget;
                    let mut visits = 0;
                    let reclaimed = lru.walk_node(
                        nid,
                        |item, ctx| {
                            visits += 1;
                            let status = verdict(item, seed);
                            if status == LruStatus::Removed {
                                ctx.isolate();
                            }
                            status
                        },
                        &mut left,
                    );
                    prop_assert!(visits <= budget);
                    prop_assert_eq!(budget - left, visits);
                    prop_assert_eq!(lru.count_node(nid), before - reclaimed);

                    let mut gone = 0;
                    for (i, slot) in model.iter_mut().enumerate() {
                        if slot.is_some() && !items[i].lru_link().is_linked() {
                            *slot = None;
                            gone += 1;
                        }
                    }
                    prop_assert_eq!(gone, reclaimed);
                }
                Op::Reparent { memcg } => {
                    let dying = memcgs[memcg].unwrap();
                    let parent = dying.parent().unwrap();
                    let total = lru.count();
                    registry.reparent(dying, parent);
                    prop_assert_eq!(lru.count(), total);
                }
            }

            for nid in 0..NODES {
                let expected = model.iter().filter(|m| matches!(m, Some((n, _)) if *n == nid)).count();
                prop_assert_eq!(lru.count_node(nid), expected);
            }
            let linked = items.iter().filter(|i| i.lru_link().is_linked()).count();
            prop_assert_eq!(lru.count(), linked);
        }
    }

    #[test]
    fn prop_walk_respects_budget(n in 0u64..40, budget in 0usize..64, seed in any::<u64>()) {
        let registry = LruRegistry::new();
        let lru = memcg_lru(1, &registry);
        let t = tree();
        lru.memcg_alloc(&t.d).unwrap();
        let items = items(n);
        for item in &items {
            let owner = if item.id % 2 == 0 { None } else { Some(&*t.d) };
            lru.add(item, 0, owner);
        }

        let mut left = budget;
        let mut visits = 0;
        let reclaimed = lru.walk(
            |item, ctx| {
                visits += 1;
                let status = verdict(item, seed);
                match status {
                    LruStatus::Removed => {
                        ctx.isolate();
                    }
                    LruStatus::Retry => {
                        ctx.unlocked(|| ());
                    }
                    _ => {}
                }
                status
            },
            &mut left,
        );

        prop_assert!(visits <= budget);
        prop_assert!(reclaimed <= visits);
        prop_assert_eq!(lru.count(), items.len() - reclaimed);
    }
}
