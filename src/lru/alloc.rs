//! Per-cgroup slot allocation.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::memcg::Memcg;
use crate::metrics;

use super::error::LruError;
use super::link::LruItem;
use super::list_lru::ListLru;
use super::memcg_map::{LruPerMemcg, MemcgMap};

impl<I: LruItem> ListLru<I> {
    /// Makes sure `memcg` and all its ancestors own a slot on this list.
    ///
    /// Called before the first add charged to `memcg`. Ancestors matter
    /// because a dying cgroup's items are spliced into its parent's lists,
    /// which must already exist. Every missing slot is allocated up front,
    /// outside any lock; then all of them are installed under one map lock,
    /// root-most first. Slots filled concurrently in the meantime are kept and
    /// the spare allocation dropped. On failure nothing is installed.
    pub fn memcg_alloc(&self, memcg: &Memcg) -> Result<(), LruError> {
        let Some(map) = &self.memcgs else {
            return Ok(());
        };
        if is_allocated(map, memcg) {
            return Ok(());
        }

        let table = match self.prepare(map, memcg) {
            Ok(table) => table,
            Err(err) => {
                warn!(
                    component = "list_lru",
                    event = "memcg_alloc_failed",
                    lru = %self.name(),
                    memcg = memcg.css_id(),
                    error = %err,
                    "per-cgroup lists allocation failed"
                );
                metrics::add_memcg_alloc_failures(1);
                return Err(err);
            }
        };

        let mut installed = 0usize;
        let mut writer = map.writer();
        for (m, mlru) in table.into_iter().rev() {
            // Re-read under the lock: a cgroup reparented meanwhile resolves
            // to an ancestor whose slot is already there.
            match m.kmem_id() {
                Some(idx) if !writer.contains(idx) => {
                    writer.insert(idx, Arc::new(mlru));
                    installed += 1;
                }
                _ => {}
            }
        }
        writer.commit();

        debug!(
            component = "list_lru",
            event = "memcg_alloc",
            lru = %self.name(),
            memcg = memcg.css_id(),
            installed,
            "per-cgroup lists installed"
        );
        Ok(())
    }

    /// Allocates lists for `memcg` and each ancestor up to the first one that
    /// already has a slot. Dropping the table on error frees whatever was
    /// prepared so far.
    fn prepare<'m>(
        &self,
        map: &MemcgMap<I>,
        memcg: &'m Memcg,
    ) -> Result<Vec<(&'m Memcg, LruPerMemcg<I>)>, LruError> {
        let mut table = Vec::new();
        table.try_reserve_exact(memcg.level())?;

        let mut cur = Some(memcg);
        while let Some(m) = cur {
            if is_allocated(map, m) {
                break;
            }
            table.push((m, LruPerMemcg::try_new(self.nodes.len())?));
            cur = m.parent().map(|p| &**p);
        }
        Ok(table)
    }

    /// Reports whether `memcg` resolves to a slot of its own (or needs none).
    pub fn memcg_allocated(&self, memcg: &Memcg) -> bool {
        self.memcgs.as_ref().map_or(true, |map| is_allocated(map, memcg))
    }
}

fn is_allocated<I: LruItem>(map: &MemcgMap<I>, memcg: &Memcg) -> bool {
    match memcg.kmem_id() {
        Some(idx) => map.contains(idx),
        None => true,
    }
}

#[cfg(not(test))]
pub(crate) fn check_fault() -> Result<(), LruError> {
    Ok(())
}

/// Fails the per-cgroup allocation about to be made when armed.
#[cfg(test)]
pub(crate) fn check_fault() -> Result<(), LruError> {
    if fault::hit() {
        return Err(LruError::NoMemory);
    }
    Ok(())
}
