#[cfg(test)]
mod tests {
    use crate::memcg::Memcg;

    #[test]
    fn test_root_has_no_kmem_id() {
        let root = Memcg::root();
        assert!(root.is_root());
        assert_eq!(root.level(), 0);
        assert_eq!(root.kmem_id(), None);
    }

    #[test]
    fn test_child_levels_and_ids() {
        let root = Memcg::root();
        let a = Memcg::new_child(&root, 3);
        let b = Memcg::new_child(&a, 7);
        assert_eq!(a.level(), 1);
        assert_eq!(b.level(), 2);
        assert_eq!(b.kmem_id(), Some(7));
        assert_eq!(b.parent().map(|p| p.css_id()), Some(a.css_id()));
    }

    #[test]
    fn test_offline_resolves_to_nearest_online_ancestor() {
        let root = Memcg::root();
        let a = Memcg::new_child(&root, 1);
        let b = Memcg::new_child(&a, 2);
        let c = Memcg::new_child(&b, 3);

        c.set_offline();
        assert_eq!(c.kmem_id(), Some(2));
        assert_eq!(c.own_kmem_id(), Some(3));

        b.set_offline();
        assert_eq!(c.kmem_id(), Some(1), "stale child must follow its parent's reparenting");
        assert_eq!(c.kmem_owner().css_id(), a.css_id());

        a.set_offline();
        assert_eq!(c.kmem_id(), None);
        assert!(c.kmem_owner().is_root());
    }

    #[test]
    fn test_shrinker_bits() {
        let root = Memcg::root();
        let a = Memcg::new_child(&root, 1);
        assert!(!a.test_shrinker_bit(0, 4));
        a.set_shrinker_bit(0, 4);
        assert!(a.test_shrinker_bit(0, 4));
        assert!(!a.test_shrinker_bit(1, 4));
        assert!(a.clear_shrinker_bit(0, 4));
        assert!(!a.clear_shrinker_bit(0, 4));
    }
}
