//! Ordered item list with an item counter.
//
// Circular doubly-linked list with a heap-allocated sentinel and raw pointers:
// - push_tail: O(1)
// - remove: O(1), needs only the entry's neighbours
// - move_tail: O(1)
// - splice_tail_into: O(1)
//
// Every list operation requires the lock of the node the list belongs to.
// Only the counter may be read without it.

use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use super::link::LruItem;

/// Link pair shared by the sentinel and every entry.
#[repr(C)]
pub(crate) struct Links {
    prev: *mut Links,
    next: *mut Links,
}

impl Links {
    const fn dangling() -> Self {
        Links {
            prev: ptr::null_mut(),
            next: ptr::null_mut(),
        }
    }

    /// # Safety
    /// `links` must be on a list whose node lock is held.
    pub(crate) unsafe fn next(links: *mut Links) -> *mut Links {
        (*links).next
    }

    /// Detaches `links` from its neighbours.
    unsafe fn unlink(links: *mut Links) {
        let prev = (*links).prev;
        let next = (*links).next;
        (*prev).next = next;
        (*next).prev = prev;
        (*links).prev = ptr::null_mut();
        (*links).next = ptr::null_mut();
    }
}

/// Heap cell carrying one linked item. `links` must stay the first field so a
/// `*mut Links` taken from a list can be cast back to the entry.
#[repr(C)]
pub(crate) struct Entry<I> {
    links: Links,
    item: Arc<I>,
}

impl<I> Entry<I> {
    pub(crate) fn alloc(item: Arc<I>) -> *mut Entry<I> {
        Box::into_raw(Box::new(Entry {
            links: Links::dangling(),
            item,
        }))
    }

    pub(crate) fn from_links(links: *mut Links) -> *mut Entry<I> {
        links.cast()
    }

    /// # Safety
    /// `entry` must be live for `'a`.
    pub(crate) unsafe fn item<'a>(entry: *mut Entry<I>) -> &'a Arc<I> {
        &(*entry).item
    }

    pub(crate) fn into_item(self: Box<Self>) -> Arc<I> {
        self.item
    }
}

/// One ordered list (insertion order = recency order) plus its item count.
pub struct LruOne<I: LruItem> {
    head: Box<UnsafeCell<Links>>,
    nr_items: AtomicI64,
    // Entries are owned through raw pointers and freed on drop.
    _entries: PhantomData<Box<Entry<I>>>,
}

// Safety: the list is only walked or mutated under the owning node's lock and
// every entry pointer refers to a live Box<Entry<I>> owned by the list. The
// counter is atomic and may be read from anywhere.
unsafe impl<I: LruItem> Send for LruOne<I> {}
unsafe impl<I: LruItem> Sync for LruOne<I> {}

impl<I: LruItem> LruOne<I> {
    /// Creates an empty list.
    pub fn new() -> Self {
        let head = Box::new(UnsafeCell::new(Links::dangling()));
        let sentinel = head.get();
        unsafe {
            (*sentinel).prev = sentinel;
            (*sentinel).next = sentinel;
        }
        Self {
            head,
            nr_items: AtomicI64::new(0),
            _entries: PhantomData,
        }
    }

    /// Item count. A racing unlocked read may see a transiently negative
    /// counter; that reads as zero.
    pub fn count(&self) -> usize {
        self.nr_items.load(Ordering::Relaxed).max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub(crate) fn sentinel(&self) -> *mut Links {
        self.head.get()
    }

    /// Appends `entry` at the tail. Returns true if the list held no items before.
    ///
    /// # Safety
    /// Node lock held; `entry` is live and on no list.
    pub(crate) unsafe fn push_tail(&self, entry: *mut Entry<I>) -> bool {
        self.link_tail(entry.cast());
        self.nr_items.fetch_add(1, Ordering::Relaxed) == 0
    }

    /// Unlinks `entry` and hands its allocation back.
    ///
    /// # Safety
    /// Node lock held; `entry` is on this list.
    pub(crate) unsafe fn remove(&self, entry: *mut Entry<I>) -> Box<Entry<I>> {
        Links::unlink(entry.cast());
        self.nr_items.fetch_sub(1, Ordering::Relaxed);
        Box::from_raw(entry)
    }

    /// Moves `links` to the tail without touching the counter.
    ///
    /// # Safety
    /// Node lock held; `links` is an entry on this list.
    pub(crate) unsafe fn move_tail(&self, links: *mut Links) {
        Links::unlink(links);
        self.link_tail(links);
    }

    /// Moves every entry onto the tail of `dst`, transfers the counter and
    /// leaves this list empty. Returns the number of items moved.
    ///
    /// # Safety
    /// Node lock held, and `dst` belongs to the same node.
    pub(crate) unsafe fn splice_tail_into(&self, dst: &LruOne<I>) -> i64 {
        let src = self.sentinel();
        if (*src).next != src {
            let first = (*src).next;
            let last = (*src).prev;
            let dst_head = dst.sentinel();
            let dst_tail = (*dst_head).prev;

            (*dst_tail).next = first;
            (*first).prev = dst_tail;
            (*last).next = dst_head;
            (*dst_head).prev = last;

            (*src).next = src;
            (*src).prev = src;
        }

        let moved = self.nr_items.swap(0, Ordering::Relaxed);
        if moved != 0 {
            dst.nr_items.fetch_add(moved, Ordering::Relaxed);
        }
        moved
    }

    unsafe fn link_tail(&self, links: *mut Links) {
        let head = self.sentinel();
        let tail = (*head).prev;
        (*links).prev = tail;
        (*links).next = head;
        (*tail).next = links;
        (*head).prev = links;
    }
}

impl<I: LruItem> Default for LruOne<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: LruItem> Drop for LruOne<I> {
    fn drop(&mut self) {
        let head = self.sentinel();
        unsafe {
            let mut cur = (*head).next;
            while cur != head {
                let next = (*cur).next;
                let entry = Box::from_raw(Entry::<I>::from_links(cur));
                entry.item.lru_link().release();
                cur = next;
            }
            (*head).next = head;
            (*head).prev = head;
        }
        self.nr_items.store(0, Ordering::Relaxed);
    }
}
