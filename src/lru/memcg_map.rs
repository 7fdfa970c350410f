//! Sparse kmem-id -> per-cgroup lists map.
//
// Readers load an immutable snapshot without locking. Writers serialize on
// `lock`, copy the snapshot, edit and publish it. A removed entry lives on
// while any reader still holds its Arc, which gives the deferred reclamation
// concurrent walkers and counters rely on.

use arc_swap::{ArcSwap, Guard};
use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::alloc;
use super::error::LruError;
use super::link::LruItem;
use super::one::LruOne;

pub(crate) type Slots<I> = BTreeMap<u32, Arc<LruPerMemcg<I>>>;

/// One list per node, owned by a single cgroup.
pub(crate) struct LruPerMemcg<I: LruItem> {
    pub(crate) nodes: Box<[LruOne<I>]>,
}

impl<I: LruItem> LruPerMemcg<I> {
    /// Allocates lists for `nr_nodes` nodes, reporting exhaustion instead of aborting.
    pub(crate) fn try_new(nr_nodes: usize) -> Result<Self, LruError> {
        alloc::check_fault()?;
        let mut nodes = Vec::new();
        nodes.try_reserve_exact(nr_nodes)?;
        nodes.extend((0..nr_nodes).map(|_| LruOne::new()));
        Ok(Self {
            nodes: nodes.into_boxed_slice(),
        })
    }

    pub(crate) fn count(&self) -> usize {
        self.nodes.iter().map(LruOne::count).sum()
    }
}

pub(crate) struct MemcgMap<I: LruItem> {
    slots: ArcSwap<Slots<I>>,
    lock: Mutex<()>,
}

impl<I: LruItem> MemcgMap<I> {
    pub(crate) fn new() -> Self {
        Self {
            slots: ArcSwap::from_pointee(BTreeMap::new()),
            lock: Mutex::new(()),
        }
    }

    /// Lock-free snapshot of the current slots.
    pub(crate) fn load(&self) -> Guard<Arc<Slots<I>>> {
        self.slots.load()
    }

    /// Owned snapshot, for walks that outlive a single lookup.
    pub(crate) fn snapshot(&self) -> Arc<Slots<I>> {
        self.slots.load_full()
    }

    pub(crate) fn get(&self, idx: u32) -> Option<Arc<LruPerMemcg<I>>> {
        self.slots.load().get(&idx).cloned()
    }

    pub(crate) fn contains(&self, idx: u32) -> bool {
        self.slots.load().contains_key(&idx)
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.load().len()
    }

    /// Starts a batch of installs published atomically on commit.
    pub(crate) fn writer(&self) -> MapWriter<'_, I> {
        let guard = self.lock.lock();
        let slots = (**self.slots.load()).clone();
        MapWriter {
            map: self,
            _guard: guard,
            slots,
            dirty: false,
        }
    }

    /// Unpublishes `idx`; the entry is freed once the last reader lets go.
    pub(crate) fn remove(&self, idx: u32) -> Option<Arc<LruPerMemcg<I>>> {
        let mut writer = self.writer();
        let removed = writer.remove(idx);
        writer.commit();
        removed
    }
}

pub(crate) struct MapWriter<'a, I: LruItem> {
    map: &'a MemcgMap<I>,
    _guard: MutexGuard<'a, ()>,
    slots: Slots<I>,
    dirty: bool,
}

impl<I: LruItem> MapWriter<'_, I> {
    pub(crate) fn contains(&self, idx: u32) -> bool {
        self.slots.contains_key(&idx)
    }

    pub(crate) fn insert(&mut self, idx: u32, mlru: Arc<LruPerMemcg<I>>) {
        self.slots.insert(idx, mlru);
        self.dirty = true;
    }

    pub(crate) fn remove(&mut self, idx: u32) -> Option<Arc<LruPerMemcg<I>>> {
        let removed = self.slots.remove(&idx);
        self.dirty |= removed.is_some();
        removed
    }

    /// Publishes the edited snapshot. Dropping the writer without commit discards it.
    pub(crate) fn commit(self) {
        if self.dirty {
            self.map.slots.store(Arc::new(self.slots));
        }
    }
}
