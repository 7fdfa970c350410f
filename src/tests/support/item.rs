use std::sync::Arc;

use crate::lru::{ListLru, LruItem, LruLink, LruStatus};
use crate::memcg::Memcg;
use crate::registry::LruRegistry;

/// Minimal list item carrying an id for order checks.
pub struct TestItem {
    pub id: u64,
    link: LruLink<TestItem>,
}

impl TestItem {
    pub fn new(id: u64) -> Arc<Self> {
        Arc::new(Self {
            id,
            link: LruLink::new(),
        })
    }
}

impl LruItem for TestItem {
    fn lru_link(&self) -> &LruLink<Self> {
        &self.link
    }
}

pub const TEST_SHRINKER: usize = 5;

/// Items with ids `0..n`.
pub fn items(n: u64) -> Vec<Arc<TestItem>> {
    (0..n).map(TestItem::new).collect()
}

/// Cgroup-unaware list with `nodes` nodes.
pub fn plain_lru(nodes: usize) -> Arc<ListLru<TestItem>> {
    ListLru::builder().name("test_plain").nodes(nodes).build().unwrap()
}

/// Cgroup-aware list on a private registry, with shrinker `TEST_SHRINKER`.
pub fn memcg_lru(nodes: usize, registry: &Arc<LruRegistry>) -> Arc<ListLru<TestItem>> {
    ListLru::builder()
        .name("test_memcg")
        .nodes(nodes)
        .memcg_aware(true)
        .shrinker(TEST_SHRINKER)
        .registry(registry)
        .build()
        .unwrap()
}

/// Ids on `(nid, memcg)` in list order, read with a non-destructive walk.
pub fn ids_on(lru: &ListLru<TestItem>, nid: usize, memcg: Option<&Memcg>) -> Vec<u64> {
    let mut ids = Vec::new();
    let mut budget = usize::MAX;
    lru.walk_one(
        nid,
        memcg,
        |item, _| {
            ids.push(item.id);
            LruStatus::Skip
        },
        &mut budget,
    );
    ids
}
