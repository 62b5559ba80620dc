//! Make-Space-In-Cache: the eviction policy (spec §4.1.3).
//!
//! Walks the LRU tail inward, skipping protected/pinned/flush-blocked
//! candidates, serializing dirty victims before evicting them, until
//! `index_size` is back under the requested budget or the walk makes no
//! more progress.

use super::{Cache, Handle};
use crate::{Error, Result};

impl Cache {
    /// Evict (and, if dirty, flush first) entries from the LRU tail
    /// until `index_size` no longer exceeds `target_size`, or until no
    /// further progress is possible.
    pub(crate) fn run_msic(&mut self, target_size: usize) -> Result<()> {
        let mut restarts = 0u32;
        loop {
            if self.index_size <= target_size.min(self.max_cache_size) {
                return Ok(());
            }

            let (snapshot, epoch) = self.lru_snapshot_from_tail();
            let mut progressed = false;

            for handle in snapshot {
                if self.arena.epoch() != epoch {
                    restarts += 1;
                    self.stats_mut().lru_scan_restarts += 1;
                    break;
                }
                if self.index_size <= target_size.min(self.max_cache_size) {
                    return Ok(());
                }
                self.stats_mut().msic_scanned += 1;

                match self.evict_one(handle)? {
                    true => progressed = true,
                    false => self.stats_mut().msic_skipped += 1,
                }
            }

            if !progressed {
                self.stats_mut().oversize_events += 1;
                return Err(Error::Oversize { index_size: self.index_size, max_size: self.max_cache_size });
            }
            if restarts > self.arena.len() as u32 + 16 {
                // Pathological: the index keeps mutating under us faster
                // than we can make progress. Surface as oversize rather
                // than spin forever.
                self.stats_mut().oversize_events += 1;
                return Err(Error::Oversize { index_size: self.index_size, max_size: self.max_cache_size });
            }
        }
    }

    /// Try to evict a single candidate. Returns `Ok(true)` if it was
    /// evicted (after a flush, if dirty), `Ok(false)` if it had to be
    /// skipped.
    fn evict_one(&mut self, handle: Handle) -> Result<bool> {
        let entry = match self.arena.get(handle) {
            Some(e) => e,
            None => return Ok(false),
        };
        if !entry.is_evictable() {
            return Ok(false);
        }
        if entry.flush_dep.n_unserialized_children > 0 {
            if let Some(e) = self.arena.get_mut(handle) {
                e.last_skip_reason = Some("unserialized flush-dep children");
            }
            return Ok(false);
        }
        if entry.flags.contains(super::EntryFlags::PREFETCHED) && entry.is_dirty() {
            if let Some(e) = self.arena.get_mut(handle) {
                e.last_skip_reason = Some("dirty prefetched entry awaiting real type");
            }
            return Ok(false);
        }

        if entry.is_dirty() {
            self.flush_entry(handle)?;
        }
        self.detach_entry(handle)?;
        self.stats_mut().evictions += 1;
        Ok(true)
    }
}
