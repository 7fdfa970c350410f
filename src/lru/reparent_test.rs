//! Tests for the per-instance half of reparenting.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use crate::lru::memcg_map::LruPerMemcg;
    use crate::lru::LruItem;
    use crate::registry::LruRegistry;
    use crate::support::{ids_on, items, memcg_lru, plain_lru, tree, TEST_SHRINKER};

    #[test]
    fn test_splices_onto_parent_tail_per_node() {
        let registry = LruRegistry::new();
        let lru = memcg_lru(2, &registry);
        let t = tree();
        lru.memcg_alloc(&t.b).unwrap();
        let items = items(5);

        lru.add(&items[0], 0, Some(&t.a));
        lru.add(&items[1], 0, Some(&t.b));
        lru.add(&items[2], 0, Some(&t.b));
        lru.add(&items[3], 1, Some(&t.b));
        lru.add(&items[4], 1, Some(&t.a));
        let before = lru.count();

        let moved = lru.reparent(2, &t.a);

        assert_eq!(moved, 3);
        assert_eq!(lru.count(), before, "reparenting never changes the total");
        assert_eq!(ids_on(&lru, 0, Some(&t.a)), vec![0, 1, 2]);
        assert_eq!(ids_on(&lru, 1, Some(&t.a)), vec![4, 3]);
        assert_eq!(lru.count_one(0, Some(&t.a)), 3);
        assert_eq!(lru.count_one(1, Some(&t.a)), 2);
        assert_eq!(lru.count_node(0), 3);
        assert_eq!(lru.nr_memcg_slots(), 1);
    }

    #[test]
    fn test_sets_parent_bit_only_where_items_moved() {
        let registry = LruRegistry::new();
        let lru = memcg_lru(2, &registry);
        let t = tree();
        lru.memcg_alloc(&t.b).unwrap();
        lru.add(&items(1)[0], 1, Some(&t.b));

        lru.reparent(2, &t.a);

        assert!(t.a.test_shrinker_bit(1, TEST_SHRINKER));
        assert!(!t.a.test_shrinker_bit(0, TEST_SHRINKER));
    }

    #[test]
    fn test_unknown_slot_moves_nothing() {
        let registry = LruRegistry::new();
        let lru = memcg_lru(1, &registry);
        let t = tree();
        lru.memcg_alloc(&t.a).unwrap();

        assert_eq!(lru.reparent(42, &t.a), 0);
        assert_eq!(lru.nr_memcg_slots(), 1);
    }

    #[test]
    fn test_unaware_list_moves_nothing() {
        let lru = plain_lru(1);
        let t = tree();
        lru.add(&items(1)[0], 0, Some(&t.b));

        assert_eq!(lru.reparent(2, &t.a), 0);
        assert_eq!(lru.count(), 1);
    }

    #[test]
    fn test_spliced_items_can_be_deleted_through_parent() {
        let registry = LruRegistry::new();
        let lru = memcg_lru(1, &registry);
        let t = tree();
        lru.memcg_alloc(&t.b).unwrap();
        let items = items(2);
        lru.add(&items[0], 0, Some(&t.b));
        lru.add(&items[1], 0, Some(&t.b));

        lru.reparent(2, &t.a);

        assert!(lru.del(&items[0], 0, Some(&t.a)));
        assert!(!items[0].lru_link().is_linked());
        assert_eq!(lru.count_one(0, Some(&t.a)), 1);
        assert_eq!(lru.count(), 1);
    }

    #[test]
    fn test_reparent_to_root_uses_global_list() {
        let registry = LruRegistry::new();
        let lru = memcg_lru(1, &registry);
        let t = tree();
        lru.memcg_alloc(&t.d).unwrap();
        let items = items(2);
        lru.add(&items[0], 0, None);
        lru.add(&items[1], 0, Some(&t.d));

        assert_eq!(lru.reparent(4, &t.root), 1);
        assert_eq!(ids_on(&lru, 0, None), vec![0, 1]);
        assert_eq!(lru.count_one(0, None), 2);
        assert_eq!(lru.nr_memcg_slots(), 0);
    }

    #[test]
    fn test_reparent_waits_for_install_in_flight() {
        let registry = LruRegistry::new();
        let lru = memcg_lru(1, &registry);
        let t = tree();
        lru.memcg_alloc(&t.a).unwrap();
        let map = lru.memcgs.as_ref().unwrap();
        let b_idx = t.b.own_kmem_id().unwrap();

        // An allocation that saw b online and is about to publish its slot.
        let mut writer = map.writer();
        assert_eq!(t.b.kmem_id(), Some(b_idx));
        writer.insert(b_idx, Arc::new(LruPerMemcg::try_new(1).unwrap()));

        let done = AtomicBool::new(false);
        thread::scope(|s| {
            s.spawn(|| {
                registry.reparent(&t.b, &t.a);
                done.store(true, Ordering::Release);
            });
            thread::sleep(Duration::from_millis(50));
            assert!(!done.load(Ordering::Acquire), "reparent ran while an install was pending");
            writer.commit();
        });

        assert!(!t.b.is_online());
        assert!(!map.contains(b_idx), "dead cgroup keeps no slot");
        assert_eq!(lru.nr_memcg_slots(), 1);
    }

    #[test]
    fn test_alloc_after_offline_installs_nothing_for_the_dead() {
        let registry = LruRegistry::new();
        let lru = memcg_lru(1, &registry);
        let t = tree();
        lru.memcg_alloc(&t.a).unwrap();

        registry.reparent(&t.b, &t.a);
        lru.memcg_alloc(&t.b).unwrap();

        assert!(!lru.memcgs.as_ref().unwrap().contains(t.b.own_kmem_id().unwrap()));
        assert_eq!(lru.nr_memcg_slots(), 1);
        assert!(lru.add(&items(1)[0], 0, Some(&t.b)));
        assert_eq!(lru.count_one(0, Some(&t.a)), 1);
    }
}
