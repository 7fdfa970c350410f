//! Registry of cgroup-aware lists, consulted when a cgroup dies.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::debug;

use crate::memcg::Memcg;
use crate::metrics;

/// Per-instance half of reparenting, implemented by every `ListLru`.
pub(crate) trait Reparent: Send + Sync {
    /// Moves everything filed under `src_idx` to `parent` and drops the slot.
    /// Returns the number of items moved.
    fn reparent(&self, src_idx: u32, parent: &Memcg) -> usize;
}

static GLOBAL: Lazy<Arc<LruRegistry>> = Lazy::new(LruRegistry::new);

/// Set of live cgroup-aware lists.
///
/// `lrus` is only held long enough to snapshot or edit the set; `reparent_lock`
/// serializes whole reparent operations against each other.
pub struct LruRegistry {
    lrus: Mutex<Vec<(u64, Weak<dyn Reparent>)>>,
    reparent_lock: Mutex<()>,
}

impl LruRegistry {
    /// Creates a private registry (tests, embedded hierarchies).
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            lrus: Mutex::new(Vec::new()),
            reparent_lock: Mutex::new(()),
        })
    }

    /// Process-wide registry used when a list is built without one.
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL)
    }

    pub(crate) fn register(&self, id: u64, lru: Weak<dyn Reparent>) {
        self.lrus.lock().push((id, lru));
        metrics::inc_instances();
    }

    pub(crate) fn unregister(&self, id: u64) {
        let mut lrus = self.lrus.lock();
        let before = lrus.len();
        lrus.retain(|(lru_id, _)| *lru_id != id);
        if lrus.len() != before {
            metrics::dec_instances();
        }
    }

    /// Number of registered lists.
    pub fn len(&self) -> usize {
        self.lrus.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hands everything `dying` has on every registered list to `parent`.
    ///
    /// `parent` must be `dying`'s parent. After the call `dying` is offline,
    /// resolves to `parent` for adds, deletes and counts, and owns no slot
    /// in any list. Returns the number of items moved.
    pub fn reparent(&self, dying: &Memcg, parent: &Memcg) -> usize {
        debug_assert_eq!(
            dying.parent().map(|p| p.css_id()),
            Some(parent.css_id()),
            "reparenting to a cgroup that is not the parent"
        );

        let Some(src_idx) = dying.own_kmem_id() else {
            return 0;
        };

        let _serial = self.reparent_lock.lock();

        // Going offline first means no new slot for `dying` can be installed
        // and every add racing with us resolves to a list we splice or to
        // the parent's.
        dying.set_offline();

        let lrus: Vec<Arc<dyn Reparent>> = self
            .lrus
            .lock()
            .iter()
            .filter_map(|(_, lru)| lru.upgrade())
            .collect();

        let moved: usize = lrus
            .iter()
            .map(|lru| lru.reparent(src_idx, parent))
            .sum();

        debug!(
            component = "list_lru",
            event = "reparent",
            dying = dying.css_id(),
            parent = parent.css_id(),
            lrus = lrus.len(),
            moved,
            "cgroup lists reparented"
        );
        metrics::add_reparented(moved as u64);

        moved
    }
}
