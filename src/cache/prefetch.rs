//! Cache image blocks: bulk prefetch of many entries in one read (spec
//! §4.1.9).
//!
//! A prefetched entry is staged with the generic `PREFETCHED` class id
//! and a saved `prefetch_type_id`; `Cache::protect` rebinds it to its
//! real class on first access by calling `deserialize` against the
//! image that's already resident, without a second store read.

use super::entry::Entry;
use super::{Address, Cache, EntryFlags, Handle};
use crate::Result;

/// One entry's worth of a cache image block, already split out by the
/// class that built the block.
pub struct PrefetchEntry {
    pub addr: Address,
    pub class_id: u32,
    pub image: Vec<u8>,
}

impl Cache {
    /// Materialize a batch of prefetched entries read as one contiguous
    /// region (spec §4.1.9). Entries already resident are skipped.
    pub fn load_cache_image(&mut self, entries: Vec<PrefetchEntry>) -> Result<()> {
        self.stats_mut().images_read += 1;
        for pe in entries {
            if self.index.contains(pe.addr) {
                continue;
            }
            let size = pe.image.len();
            self.make_room_for(size)?;

            let mut entry =
                Entry::new(pe.addr, crate::format::class_id::PREFETCHED, 0, size, Box::new(pe.image));
            entry.flags.insert(EntryFlags::IMAGE_UP_TO_DATE | EntryFlags::PREFETCHED);
            entry.prefetch_type_id = Some(pe.class_id);

            let handle = self.arena.insert(entry);
            self.index.insert(pe.addr, handle);
            self.index_size += size;
            self.lru_push_front(handle);

            self.stats_mut().prefetches += 1;
            self.stats_mut().images_loaded += 1;
        }
        Ok(())
    }

    /// Build a contiguous image block out of the current on-disk images
    /// of `addrs`, for a class that wants to write its own cache image
    /// (spec §4.1.9 `images_created`).
    pub fn build_cache_image(&mut self, addrs: &[Address]) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        for &addr in addrs {
            let handle: Handle = self.handle_for(addr).ok_or(crate::Error::NotFound(addr))?;
            let class_id = self.entry(handle)?.class_id;
            let class = self.class_of(class_id)?;

            let body = self
                .entry_mut(handle)?
                .body
                .take()
                .ok_or_else(|| crate::Error::corrupt("body", "missing while building cache image"))?;
            let mut entry_buf = Vec::new();
            let result = class.serialize(addr, &body, &mut entry_buf);
            self.entry_mut(handle)?.body = Some(body);
            result?;
            buf.extend_from_slice(&entry_buf);
        }
        self.stats_mut().images_created += 1;
        Ok(buf)
    }
}
