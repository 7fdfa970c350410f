//! Per-NUMA-node container: the node lock, the node-global list and the node total.

use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicI64, Ordering};

use super::link::LruItem;
use super::one::LruOne;

/// Guard proving the node lock is held.
pub(crate) type NodeGuard<'a> = MutexGuard<'a, ()>;

/// One node of a ListLru.
///
/// The lock protects `lru` and every per-cgroup list of the same node, so the
/// number of locks never exceeds the number of nodes.
pub(crate) struct LruNode<I: LruItem> {
    lock: Mutex<()>,
    pub(crate) lru: LruOne<I>,
    nr_items: AtomicI64,
}

impl<I: LruItem> LruNode<I> {
    pub(crate) fn new() -> Self {
        Self {
            lock: Mutex::new(()),
            lru: LruOne::new(),
            nr_items: AtomicI64::new(0),
        }
    }

    pub(crate) fn lock(&self) -> NodeGuard<'_> {
        self.lock.lock()
    }

    /// Identity stamped into the link of every item linked on this node.
    pub(crate) fn tag(&self) -> usize {
        self as *const Self as usize
    }

    /// Items on this node across the global list and every cgroup list.
    pub(crate) fn count(&self) -> usize {
        self.nr_items.load(Ordering::Relaxed).max(0) as usize
    }

    pub(crate) fn inc(&self) {
        self.nr_items.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn dec(&self) {
        self.nr_items.fetch_sub(1, Ordering::Relaxed);
    }
}
