//! The intrusive LRU list over every resident, unprotected, unpinned
//! entry (spec §4.1.2 item 2).
//!
//! Head = most recently used. `lru_prev`/`lru_next`/`in_lru` live on
//! `Entry` itself (spec §9's generational-arena note keeps the links as
//! `Handle`s rather than raw pointers); `Cache` only tracks the two ends.

use super::{Cache, Handle};

impl Cache {
    pub(crate) fn lru_push_front(&mut self, handle: Handle) {
        if self.arena.get(handle).map(|e| e.in_lru).unwrap_or(false) {
            return;
        }
        let old_head = self.lru_head;
        if let Some(entry) = self.arena.get_mut(handle) {
            entry.lru_prev = None;
            entry.lru_next = old_head;
            entry.in_lru = true;
        }
        if let Some(head) = old_head {
            if let Some(head_entry) = self.arena.get_mut(head) {
                head_entry.lru_prev = Some(handle);
            }
        }
        self.lru_head = Some(handle);
        if self.lru_tail.is_none() {
            self.lru_tail = Some(handle);
        }
    }

    pub(crate) fn lru_remove(&mut self, handle: Handle) {
        let (prev, next, was_in_lru) = match self.arena.get(handle) {
            Some(e) => (e.lru_prev, e.lru_next, e.in_lru),
            None => return,
        };
        if !was_in_lru {
            return;
        }
        match prev {
            Some(p) => {
                if let Some(pe) = self.arena.get_mut(p) {
                    pe.lru_next = next;
                }
            }
            None => self.lru_head = next,
        }
        match next {
            Some(n) => {
                if let Some(ne) = self.arena.get_mut(n) {
                    ne.lru_prev = prev;
                }
            }
            None => self.lru_tail = prev,
        }
        if let Some(entry) = self.arena.get_mut(handle) {
            entry.lru_prev = None;
            entry.lru_next = None;
            entry.in_lru = false;
        }
    }

    /// Move a resident entry to the head without changing membership,
    /// used on a read hit that doesn't go through `protect` (e.g. a
    /// class peeking at a sibling during `serialize`).
    pub(crate) fn lru_touch(&mut self, handle: Handle) {
        if self.arena.get(handle).map(|e| e.in_lru).unwrap_or(false) {
            self.lru_remove(handle);
            self.lru_push_front(handle);
        }
    }

    /// Snapshot the LRU order from the tail inward, tagged with the
    /// arena epoch at the time of the walk. MSIC (spec §4.1.3) compares
    /// the epoch before acting on any entry in the snapshot and restarts
    /// if a concurrent mutation invalidated it.
    pub(crate) fn lru_snapshot_from_tail(&self) -> (Vec<Handle>, u64) {
        let mut out = Vec::new();
        let mut cursor = self.lru_tail;
        let epoch = self.arena.epoch();
        while let Some(h) = cursor {
            let entry = match self.arena.get(h) {
                Some(e) => e,
                None => break,
            };
            out.push(h);
            cursor = entry.lru_prev;
        }
        (out, epoch)
    }
}
