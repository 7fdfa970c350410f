//! Per-instance half of cgroup reparenting.

use tracing::debug;

use crate::memcg::Memcg;
use crate::registry::Reparent;

use super::link::LruItem;
use super::list_lru::ListLru;
use super::one::LruOne;

impl<I: LruItem> ListLru<I> {
    /// Splices every list filed under `src_idx` onto `parent`'s lists, node by
    /// node, then unpublishes the `src_idx` slot. Returns the items moved.
    ///
    /// The map's writer lock is held throughout, so a racing `memcg_alloc`
    /// either installs the slot before the splice or finds the cgroup
    /// already offline. Lock order is map, then node; walk callbacks must
    /// not call `memcg_alloc` while the node lock is held.
    ///
    /// Only one node lock is held at a time, so other nodes keep working
    /// throughout. The retired slot stays alive for readers that already
    /// hold it; they find it empty.
    pub fn reparent(&self, src_idx: u32, parent: &Memcg) -> usize {
        let Some(map) = &self.memcgs else {
            return 0;
        };
        let mut writer = map.writer();
        let Some(src) = writer.remove(src_idx) else {
            return 0;
        };

        let mut moved = 0usize;
        for (nid, nlru) in self.nodes.iter().enumerate() {
            let _guard = nlru.lock();
            // Safety: node lock held; both lists belong to node `nid`.
            let splice = |dst: &LruOne<I>| unsafe { src.nodes[nid].splice_tail_into(dst) };
            let n = self
                .with_one(nid, Some(parent), splice)
                .unwrap_or_else(|| splice(&nlru.lru));
            if n > 0 {
                self.set_shrinker_bit(Some(parent), nid);
                moved += n as usize;
            }
        }

        writer.commit();

        debug!(
            component = "list_lru",
            event = "reparent_lru",
            lru = %self.name(),
            src_idx,
            parent = parent.css_id(),
            moved,
            "cgroup lists spliced into parent"
        );
        moved
    }
}

impl<I: LruItem> Reparent for ListLru<I> {
    fn reparent(&self, src_idx: u32, parent: &Memcg) -> usize {
        ListLru::reparent(self, src_idx, parent)
    }
}
