//! Walk / isolate engine.
//
// A walk holds one node lock and visits a list from the head, handing each
// item to a caller callback until the budget runs out. The callback may
// isolate the item and may drop the lock; when it does, the traversal is
// stale and restarts from the head. The budget is charged before every
// visit, so a callback that keeps asking for retries still terminates.

use std::sync::Arc;
use tracing::trace;

use crate::memcg::Memcg;
use crate::metrics;

use super::link::LruItem;
use super::list_lru::{ListLru, Target};
use super::node::{LruNode, NodeGuard};
use super::one::{Entry, Links, LruOne};

/// Callback verdict for one visited item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LruStatus {
    /// Item isolated; lock held throughout.
    Removed,
    /// Item isolated, then the lock was dropped and retaken.
    RemovedRetry,
    /// Keep the item; move it to the tail.
    Rotate,
    /// Keep the item in place.
    Skip,
    /// Item untouched, but the lock was dropped and retaken.
    Retry,
}

/// Handle given to the isolate callback for the item being visited.
pub struct LruIsolate<'a, 'g, I: LruItem> {
    guard: &'a mut NodeGuard<'g>,
    one: &'a LruOne<I>,
    entry: *mut Entry<I>,
    isolated: bool,
    unlocked: bool,
}

impl<I: LruItem> LruIsolate<'_, '_, I> {
    /// Takes the visited item off its list and returns the list's reference
    /// to it, e.g. to collect it on a private dispose list.
    ///
    /// # Panics
    /// If called twice, or after [`LruIsolate::unlocked`].
    pub fn isolate(&mut self) -> Arc<I> {
        assert!(!self.isolated, "list_lru: item isolated twice");
        assert!(
            !self.unlocked,
            "list_lru: isolate after the node lock was dropped"
        );
        // Safety: lock held since the visit began, so the entry is still on `one`.
        let entry = unsafe { self.one.remove(self.entry) };
        self.isolated = true;
        let item = entry.into_item();
        item.lru_link().release();
        item
    }

    /// Runs `f` with the node lock released. The walk restarts afterwards, so
    /// the callback must return [`LruStatus::Retry`] or
    /// [`LruStatus::RemovedRetry`].
    pub fn unlocked<F, R>(&mut self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        self.unlocked = true;
        parking_lot::MutexGuard::unlocked(self.guard, f)
    }

    pub fn is_isolated(&self) -> bool {
        self.isolated
    }
}

/// Walks `one` under an already held node lock. Returns items isolated.
pub(crate) fn walk_list<I, F>(
    nlru: &LruNode<I>,
    guard: &mut NodeGuard<'_>,
    one: &LruOne<I>,
    isolate: &mut F,
    budget: &mut usize,
) -> usize
where
    I: LruItem,
    F: FnMut(&Arc<I>, &mut LruIsolate<'_, '_, I>) -> LruStatus,
{
    let mut isolated = 0;
    let head = one.sentinel();

    'restart: loop {
        // Safety: lock held.
        let mut cur = unsafe { Links::next(head) };
        while cur != head {
            if *budget == 0 {
                break 'restart;
            }
            *budget -= 1;

            // Safety: lock held; `cur` is a live entry on `one`.
            let next = unsafe { Links::next(cur) };
            let entry = Entry::<I>::from_links(cur);
            let item = Arc::clone(unsafe { Entry::item(entry) });

            let mut ctx = LruIsolate {
                guard: &mut *guard,
                one,
                entry,
                isolated: false,
                unlocked: false,
            };
            let status = isolate(&item, &mut ctx);
            let (was_isolated, was_unlocked) = (ctx.isolated, ctx.unlocked);

            match status {
                LruStatus::Removed | LruStatus::RemovedRetry => {
                    assert!(
                        was_isolated,
                        "list_lru: {status:?} returned for an item that was not isolated"
                    );
                    assert!(
                        status == LruStatus::RemovedRetry || !was_unlocked,
                        "list_lru: Removed returned after dropping the node lock"
                    );
                    isolated += 1;
                    nlru.dec();
                    if status == LruStatus::RemovedRetry {
                        continue 'restart;
                    }
                }
                LruStatus::Rotate | LruStatus::Skip => {
                    assert!(
                        !was_isolated && !was_unlocked,
                        "list_lru: {status:?} returned after isolating or unlocking"
                    );
                    if status == LruStatus::Rotate {
                        // Safety: lock held throughout; entry still on `one`.
                        unsafe { one.move_tail(cur) };
                    }
                }
                LruStatus::Retry => {
                    assert!(
                        !was_isolated,
                        "list_lru: Retry returned for an isolated item"
                    );
                    continue 'restart;
                }
            }

            cur = next;
        }
        break;
    }

    isolated
}

impl<I: LruItem> ListLru<I> {
    /// Walks the list of `(nid, memcg)` from its head, visiting at most
    /// `*budget` items. Returns the number of items the callback removed.
    ///
    /// The node lock is held for the whole walk except where the callback
    /// drops it. The callback must not call back into this list's node.
    pub fn walk_one<F>(&self, nid: usize, memcg: Option<&Memcg>, mut isolate: F, budget: &mut usize) -> usize
    where
        F: FnMut(&Arc<I>, &mut LruIsolate<'_, '_, I>) -> LruStatus,
    {
        let target = self.target(memcg);
        self.walk_target(nid, &target, &mut isolate, budget)
    }

    /// Walks node `nid`: the node-global list first, then every cgroup list
    /// in ascending kmem id order, sharing one budget.
    pub fn walk_node<F>(&self, nid: usize, mut isolate: F, budget: &mut usize) -> usize
    where
        F: FnMut(&Arc<I>, &mut LruIsolate<'_, '_, I>) -> LruStatus,
    {
        self.walk_node_with(nid, &mut isolate, budget)
    }

    /// Walks every node in order while budget remains.
    pub fn walk<F>(&self, mut isolate: F, budget: &mut usize) -> usize
    where
        F: FnMut(&Arc<I>, &mut LruIsolate<'_, '_, I>) -> LruStatus,
    {
        let mut isolated = 0;
        for nid in 0..self.nodes.len() {
            if *budget == 0 {
                break;
            }
            isolated += self.walk_node_with(nid, &mut isolate, budget);
        }
        isolated
    }

    fn walk_node_with<F>(&self, nid: usize, isolate: &mut F, budget: &mut usize) -> usize
    where
        F: FnMut(&Arc<I>, &mut LruIsolate<'_, '_, I>) -> LruStatus,
    {
        let start = *budget;
        let mut isolated = self.walk_target(nid, &Target::Global, isolate, budget);

        if let Some(map) = &self.memcgs {
            for mlru in map.snapshot().values() {
                if *budget == 0 {
                    break;
                }
                let target = Target::Memcg(Arc::clone(mlru));
                isolated += self.walk_target(nid, &target, isolate, budget);
            }
        }

        trace!(
            component = "list_lru",
            event = "walk_node",
            lru = %self.name(),
            nid,
            walked = start - *budget,
            isolated,
            "node walked"
        );
        isolated
    }

    fn walk_target<F>(&self, nid: usize, target: &Target<I>, isolate: &mut F, budget: &mut usize) -> usize
    where
        F: FnMut(&Arc<I>, &mut LruIsolate<'_, '_, I>) -> LruStatus,
    {
        let nlru = &self.nodes[nid];
        let start = *budget;
        let isolated = {
            let mut guard = nlru.lock();
            match target {
                Target::Global => walk_list(nlru, &mut guard, &nlru.lru, isolate, budget),
                Target::Memcg(mlru) => walk_list(nlru, &mut guard, &mlru.nodes[nid], isolate, budget),
                Target::Missing => 0,
            }
        };
        metrics::add_walked((start - *budget) as u64);
        metrics::add_isolated(isolated as u64);
        isolated
    }
}
