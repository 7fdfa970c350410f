//! Memory cgroup handles as seen by the list machinery.
//!
//! The cgroup core owns the hierarchy and decides when a cgroup dies; lists
//! only need a handle's kmem id (its slot index in every ListLru), its parent
//! chain, its depth and a place to raise shrinker bits.

use dashmap::DashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_CSS_ID: AtomicU64 = AtomicU64::new(1);

pub struct Memcg {
    css_id: u64,
    kmem_id: Option<u32>,
    online: AtomicBool,
    parent: Option<Arc<Memcg>>,
    level: usize,
    shrinker_bits: DashSet<(usize, usize)>,
}

impl Memcg {
    /// Creates the root of a hierarchy. The root has no kmem id: its objects
    /// live on the node-global lists.
    pub fn root() -> Arc<Self> {
        Arc::new(Self {
            css_id: NEXT_CSS_ID.fetch_add(1, Ordering::Relaxed),
            kmem_id: None,
            online: AtomicBool::new(true),
            parent: None,
            level: 0,
            shrinker_bits: DashSet::new(),
        })
    }

    /// Creates an online child of `parent` using `kmem_id` as its slot index.
    /// The caller keeps kmem ids unique among live cgroups.
    pub fn new_child(parent: &Arc<Memcg>, kmem_id: u32) -> Arc<Self> {
        Arc::new(Self {
            css_id: NEXT_CSS_ID.fetch_add(1, Ordering::Relaxed),
            kmem_id: Some(kmem_id),
            online: AtomicBool::new(true),
            parent: Some(Arc::clone(parent)),
            level: parent.level + 1,
            shrinker_bits: DashSet::new(),
        })
    }

    pub fn css_id(&self) -> u64 {
        self.css_id
    }

    pub fn parent(&self) -> Option<&Arc<Memcg>> {
        self.parent.as_ref()
    }

    /// Depth below the root (root = 0).
    pub fn level(&self) -> usize {
        self.level
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Slot index this cgroup was created with, regardless of state.
    pub fn own_kmem_id(&self) -> Option<u32> {
        self.kmem_id
    }

    /// Slot index lists must use for this cgroup now. Once a cgroup has been
    /// reparented it resolves to its nearest online ancestor's id.
    pub fn kmem_id(&self) -> Option<u32> {
        self.kmem_owner().kmem_id
    }

    /// Nearest online cgroup at or above this one.
    pub fn kmem_owner(&self) -> &Memcg {
        let mut memcg = self;
        while !memcg.is_online() {
            match memcg.parent.as_deref() {
                Some(parent) => memcg = parent,
                None => break,
            }
        }
        memcg
    }

    pub(crate) fn set_offline(&self) {
        self.online.store(false, Ordering::Release);
    }

    /// Tells reclaim that `shrinker_id` has work on `nid` for this cgroup.
    pub fn set_shrinker_bit(&self, nid: usize, shrinker_id: usize) {
        self.shrinker_bits.insert((nid, shrinker_id));
    }

    pub fn test_shrinker_bit(&self, nid: usize, shrinker_id: usize) -> bool {
        self.shrinker_bits.contains(&(nid, shrinker_id))
    }

    /// Cleared by the shrinker once it finds the lists empty.
    pub fn clear_shrinker_bit(&self, nid: usize, shrinker_id: usize) -> bool {
        self.shrinker_bits.remove(&(nid, shrinker_id)).is_some()
    }
}

impl fmt::Debug for Memcg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memcg")
            .field("css_id", &self.css_id)
            .field("kmem_id", &self.kmem_id)
            .field("level", &self.level)
            .field("online", &self.is_online())
            .finish()
    }
}

#[cfg(test)]
mod memcg_test;
