//! Public list instance: per-node lists, optional per-cgroup lists and the
//! add/del/count entry points.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

use crate::config::LruConfig;
use crate::memcg::Memcg;
use crate::metrics;
use crate::registry::{LruRegistry, Reparent};

use super::error::LruError;
use super::link::LruItem;
use super::memcg_map::{LruPerMemcg, MemcgMap};
use super::node::LruNode;
use super::one::{Entry, LruOne};

static NEXT_LRU_ID: AtomicU64 = AtomicU64::new(1);

/// Shrinkable list partitioned per node and, optionally, per cgroup.
///
/// Items are filed under an explicit `(node, memcg)` owner supplied on every
/// add and del. A `None` or root memcg, or any memcg on a cgroup-unaware
/// instance, resolves to the node-global list. On a cgroup-aware instance a
/// cgroup must get its slot from [`ListLru::memcg_alloc`] before its first add.
///
/// Dropping the last `Arc` destroys the instance: it leaves the registry and
/// unlinks every item still on it.
pub struct ListLru<I: LruItem> {
    id: u64,
    name: String,
    pub(crate) nodes: Box<[LruNode<I>]>,
    pub(crate) memcgs: Option<MemcgMap<I>>,
    shrinker_id: Option<usize>,
    registry: Option<Arc<LruRegistry>>,
}

/// Where an `(node, memcg)` owner resolves to.
pub(crate) enum Target<I: LruItem> {
    Global,
    Memcg(Arc<LruPerMemcg<I>>),
    Missing,
}

/// Builder for [`ListLru`].
pub struct ListLruBuilder<I: LruItem> {
    name: String,
    nodes: usize,
    memcg_aware: bool,
    shrinker_id: Option<usize>,
    registry: Option<Arc<LruRegistry>>,
    _item: PhantomData<fn() -> I>,
}

impl<I: LruItem> ListLruBuilder<I> {
    /// Lock-class tag; shows up in every log line about this list.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn nodes(mut self, nodes: usize) -> Self {
        self.nodes = nodes;
        self
    }

    pub fn memcg_aware(mut self, aware: bool) -> Self {
        self.memcg_aware = aware;
        self
    }

    /// Shrinker whose per-cgroup bit is raised when a list becomes non-empty.
    pub fn shrinker(mut self, shrinker_id: usize) -> Self {
        self.shrinker_id = Some(shrinker_id);
        self
    }

    /// Registry to join instead of the global one.
    pub fn registry(mut self, registry: &Arc<LruRegistry>) -> Self {
        self.registry = Some(Arc::clone(registry));
        self
    }

    pub fn build(self) -> Result<Arc<ListLru<I>>, LruError> {
        if self.nodes == 0 {
            return Err(LruError::InvalidNodeCount);
        }

        let mut nodes = Vec::new();
        nodes.try_reserve_exact(self.nodes)?;
        nodes.extend((0..self.nodes).map(|_| LruNode::new()));

        let (memcgs, registry) = if self.memcg_aware {
            let registry = self.registry.unwrap_or_else(LruRegistry::global);
            (Some(MemcgMap::new()), Some(registry))
        } else {
            (None, None)
        };

        let lru = Arc::new(ListLru {
            id: NEXT_LRU_ID.fetch_add(1, Ordering::Relaxed),
            name: self.name,
            nodes: nodes.into_boxed_slice(),
            memcgs,
            shrinker_id: self.shrinker_id,
            registry,
        });

        if let Some(registry) = &lru.registry {
            let weak: Weak<dyn Reparent> = Arc::downgrade(&lru) as Weak<dyn Reparent>;
            registry.register(lru.id, weak);
        }

        debug!(
            component = "list_lru",
            event = "init",
            lru = %lru.name,
            nodes = lru.nodes.len(),
            memcg_aware = lru.is_memcg_aware(),
            shrinker_id = ?lru.shrinker_id,
            "list initialized"
        );

        Ok(lru)
    }
}

impl<I: LruItem> ListLru<I> {
    pub fn builder() -> ListLruBuilder<I> {
        ListLruBuilder {
            name: String::from("list_lru"),
            nodes: 1,
            memcg_aware: false,
            shrinker_id: None,
            registry: None,
            _item: PhantomData,
        }
    }

    /// Builds a list from configuration, joining `registry` if cgroup-aware.
    pub fn from_config(cfg: &LruConfig, registry: &Arc<LruRegistry>) -> Result<Arc<Self>, LruError> {
        let mut builder = Self::builder()
            .name(cfg.name.clone())
            .nodes(cfg.nodes)
            .memcg_aware(cfg.memcg_aware)
            .registry(registry);
        if let Some(id) = cfg.shrinker_id {
            builder = builder.shrinker(id);
        }
        builder.build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nr_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_memcg_aware(&self) -> bool {
        self.memcgs.is_some()
    }

    pub fn shrinker_id(&self) -> Option<usize> {
        self.shrinker_id
    }

    /// Number of cgroups currently holding a slot.
    pub fn nr_memcg_slots(&self) -> usize {
        self.memcgs.as_ref().map_or(0, MemcgMap::len)
    }

    /// Links `item` at the tail of its owner's list.
    ///
    /// Returns false, changing nothing, if the item is already linked anywhere
    /// or if `memcg` has no slot on this cgroup-aware list.
    ///
    /// # Panics
    /// If `nid` is not below [`ListLru::nr_nodes`].
    pub fn add(&self, item: &Arc<I>, nid: usize, memcg: Option<&Memcg>) -> bool {
        let nlru = &self.nodes[nid];
        let _guard = nlru.lock();

        let link = item.lru_link();
        let pushed = self.with_one(nid, memcg, |one| {
            if !link.claim(nlru.tag()) {
                return None;
            }
            let entry = Entry::alloc(Arc::clone(item));
            link.set_entry(entry);
            // Safety: node lock held; the entry is fresh.
            Some(unsafe { one.push_tail(entry) })
        });
        let first = match pushed {
            Some(Some(first)) => first,
            Some(None) => return false,
            None => {
                warn!(
                    component = "list_lru",
                    event = "add_without_slot",
                    lru = %self.name,
                    nid,
                    memcg = memcg.map(Memcg::css_id),
                    "add rejected: cgroup lists not allocated"
                );
                return false;
            }
        };
        nlru.inc();

        if first && self.is_memcg_aware() {
            self.set_shrinker_bit(memcg, nid);
        }
        metrics::add_added(1);
        true
    }

    /// Unlinks `item` from its owner's list.
    ///
    /// Returns true iff the item was linked on node `nid` of this list. The
    /// owner must be the one it was added with (or any cgroup resolving to
    /// the same list after a reparent); the item itself does not record its
    /// cgroup. An owner without a slot holds nothing, so it yields false.
    ///
    /// # Panics
    /// If `nid` is not below [`ListLru::nr_nodes`].
    pub fn del(&self, item: &Arc<I>, nid: usize, memcg: Option<&Memcg>) -> bool {
        let nlru = &self.nodes[nid];
        let removed = {
            let _guard = nlru.lock();

            let link = item.lru_link();
            if !link.is_owned_by(nlru.tag()) {
                return false;
            }

            let entry = link.entry();
            // Safety: node lock held and the link says the entry is on this node.
            let Some(removed) = self.with_one(nid, memcg, |one| unsafe { one.remove(entry) }) else {
                return false;
            };
            link.release();
            nlru.dec();
            removed
        };
        drop(removed);

        metrics::add_deleted(1);
        true
    }

    /// Items on node `nid`, across every cgroup.
    pub fn count_node(&self, nid: usize) -> usize {
        self.nodes[nid].count()
    }

    /// Items filed under `(nid, memcg)`. Lock-free and only eventually
    /// consistent; meant for statistics and shrinker sizing.
    pub fn count_one(&self, nid: usize, memcg: Option<&Memcg>) -> usize {
        match self.target(memcg) {
            Target::Global => self.nodes[nid].lru.count(),
            Target::Memcg(mlru) => mlru.nodes[nid].count(),
            Target::Missing => 0,
        }
    }

    /// Items filed under `memcg` across all nodes.
    pub fn count_memcg(&self, memcg: &Memcg) -> usize {
        match self.target(Some(memcg)) {
            Target::Global => self.nodes.iter().map(|nlru| nlru.lru.count()).sum(),
            Target::Memcg(mlru) => mlru.count(),
            Target::Missing => 0,
        }
    }

    /// Items on the whole list.
    pub fn count(&self) -> usize {
        self.nodes.iter().map(LruNode::count).sum()
    }

    pub(crate) fn set_shrinker_bit(&self, memcg: Option<&Memcg>, nid: usize) {
        if let (Some(memcg), Some(shrinker_id)) = (memcg, self.shrinker_id) {
            memcg.kmem_owner().set_shrinker_bit(nid, shrinker_id);
        }
    }

    /// Resolves an owner to a list for lock-holding callers. `None` when the
    /// owner is a cgroup without a slot.
    pub(crate) fn with_one<R>(
        &self,
        nid: usize,
        memcg: Option<&Memcg>,
        f: impl FnOnce(&LruOne<I>) -> R,
    ) -> Option<R> {
        match (&self.memcgs, memcg.and_then(Memcg::kmem_id)) {
            (Some(map), Some(idx)) => {
                let slots = map.load();
                slots.get(&idx).map(|mlru| f(&mlru.nodes[nid]))
            }
            _ => Some(f(&self.nodes[nid].lru)),
        }
    }

    /// Resolves an owner to a list that stays valid across lock drops.
    pub(crate) fn target(&self, memcg: Option<&Memcg>) -> Target<I> {
        match (&self.memcgs, memcg.and_then(Memcg::kmem_id)) {
            (Some(map), Some(idx)) => map.get(idx).map_or(Target::Missing, Target::Memcg),
            _ => Target::Global,
        }
    }
}

impl<I: LruItem> Drop for ListLru<I> {
    fn drop(&mut self) {
        if let Some(registry) = &self.registry {
            registry.unregister(self.id);
        }
        debug!(
            component = "list_lru",
            event = "destroy",
            lru = %self.name,
            items = self.count(),
            memcg_slots = self.nr_memcg_slots(),
            "list destroyed"
        );
    }
}
