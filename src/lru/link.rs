//! Linkage embedded in every object that can sit on a ListLru.

use std::fmt;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use super::one::Entry;

/// Objects tracked by a [`ListLru`](super::ListLru).
///
/// The implementor owns the link; the list only borrows it while the item is
/// linked. One link means one list: an item sits on at most one node of one
/// `ListLru` at a time.
pub trait LruItem: Send + Sync + Sized + 'static {
    fn lru_link(&self) -> &LruLink<Self>;
}

/// Embedded list linkage.
///
/// `owner` is the address of the node the item is linked on (0 = unlinked).
/// It only changes while that node's lock is held, so observing your own node
/// under its lock pins the state until you unlock. `entry` follows the same rule.
pub struct LruLink<I> {
    owner: AtomicUsize,
    entry: AtomicPtr<Entry<I>>,
}

impl<I> LruLink<I> {
    pub const fn new() -> Self {
        Self {
            owner: AtomicUsize::new(0),
            entry: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Reports whether the item currently sits on some list.
    /// Racy by nature; use it for diagnostics only.
    pub fn is_linked(&self) -> bool {
        self.owner.load(Ordering::Acquire) != 0
    }

    /// Claims the link for `owner`. Fails if linked anywhere.
    pub(crate) fn claim(&self, owner: usize) -> bool {
        self.owner
            .compare_exchange(0, owner, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn is_owned_by(&self, owner: usize) -> bool {
        self.owner.load(Ordering::Acquire) == owner
    }

    pub(crate) fn entry(&self) -> *mut Entry<I> {
        self.entry.load(Ordering::Relaxed)
    }

    pub(crate) fn set_entry(&self, entry: *mut Entry<I>) {
        self.entry.store(entry, Ordering::Relaxed);
    }

    /// Marks the item unlinked. The entry must already be off its list.
    pub(crate) fn release(&self) {
        self.entry.store(ptr::null_mut(), Ordering::Relaxed);
        self.owner.store(0, Ordering::Release);
    }
}

impl<I> Default for LruLink<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I> fmt::Debug for LruLink<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruLink")
            .field("linked", &self.is_linked())
            .finish()
    }
}
