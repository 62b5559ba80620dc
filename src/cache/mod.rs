//! The metadata cache: the single authority for reading, writing, and
//! caching variable-size metadata entries against a byte store (spec
//! §4.1).
//!
//! Grounded on the teacher's buffer pool manager (page table + free
//! list + replacer) and buffer-frame pin/dirty bookkeeping, reshaped
//! around a generational arena instead of raw frame indices (spec §9).

pub mod address;
pub mod arena;
pub mod autosize;
pub mod class;
pub mod dirty_list;
pub mod entry;
pub mod flush;
pub mod flushdep;
pub mod index;
pub mod lru;
pub mod msic;
pub mod prefetch;
pub mod ring;
pub mod stats;
pub mod tag;

pub use address::Address;
pub use arena::{Arena, Handle};
pub use class::{CacheableClass, ClassRegistry, NotifyAction, PreSerializeAction, UserData};
pub use entry::{Body, Entry, Flags as EntryFlags, FlushDep, Tag as EntryTag};
pub use ring::{named as ring_named, Ring};
pub use stats::CacheStats;

use std::sync::Arc;

use dirty_list::DirtyList;
use index::HashIndex;
use tag::TagMap;

use crate::config::{AutoResizeConfig, CacheConfig};
use crate::store::ByteStore;
use crate::{Error, Result};

bitflags::bitflags! {
    /// Flags accepted by `insert` (spec §4.1.1).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct InsertFlags: u32 {
        const PIN   = 1 << 0;
        const DIRTY = 1 << 1;
    }
}

bitflags::bitflags! {
    /// Flags accepted by `protect` (spec §4.1.1).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ProtectFlags: u32 {
        const READ_ONLY = 1 << 0;
        const WRITE     = 1 << 1;
    }
}

bitflags::bitflags! {
    /// Flags accepted by `unprotect` (spec §4.1.1).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct UnprotectFlags: u32 {
        const DIRTIED        = 1 << 0;
        const SIZE_CHANGED   = 1 << 1;
        const PIN            = 1 << 2;
        const UNPIN          = 1 << 3;
        const DELETED        = 1 << 4;
        const TAKE_OWNERSHIP = 1 << 5;
    }
}

/// Scope argument to `flush` (spec §4.1.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushScope {
    All,
    Tagged(EntryTag),
    Ring(Ring),
}

/// Opaque context passed to `deserialize`/`initial_image_size`, and to
/// `insert` for a brand-new entry's body.
pub struct Aux<'a> {
    pub udata: UserData<'a>,
}

struct ProtectRecord {
    write: bool,
    read_count: u32,
}

/// The cache itself. Every publicly reachable mutation goes through one
/// of its methods; nothing outside this module touches `arena` or
/// `index` directly.
pub struct Cache {
    store: Arc<dyn ByteStore>,
    classes: ClassRegistry,

    arena: Arena<Entry>,
    index: HashIndex,
    dirty: DirtyList,
    tags: TagMap,

    lru_head: Option<Handle>,
    lru_tail: Option<Handle>,

    pinned: std::collections::HashSet<Handle>,
    protected: std::collections::HashMap<Handle, ProtectRecord>,

    autosize: Option<autosize::AutoResizeController>,
    autosize_cfg: Option<AutoResizeConfig>,

    stats: CacheStats,

    pub(crate) max_cache_size: usize,
    pub(crate) min_clean_size: usize,
    ring_count: usize,
    index_size: usize,
    evictions_enabled: bool,
    swmr_write: bool,
    serialization_in_progress: bool,
}

impl Cache {
    /// `create(store, class_registry, max_size, min_clean_size,
    /// ring_count, aux?) → Cache` (spec §4.1.1).
    pub fn create(
        store: Arc<dyn ByteStore>,
        classes: ClassRegistry,
        config: CacheConfig,
        autosize_cfg: Option<AutoResizeConfig>,
    ) -> Self {
        Self {
            store,
            classes,
            arena: Arena::new(),
            index: HashIndex::new(config.hash_buckets),
            dirty: DirtyList::new(),
            tags: TagMap::new(),
            lru_head: None,
            lru_tail: None,
            pinned: std::collections::HashSet::new(),
            protected: std::collections::HashMap::new(),
            autosize: autosize_cfg.map(autosize::AutoResizeController::new),
            autosize_cfg,
            stats: CacheStats::default(),
            max_cache_size: config.max_cache_size,
            min_clean_size: config.min_clean_size,
            ring_count: config.ring_count,
            index_size: 0,
            evictions_enabled: config.evictions_enabled,
            swmr_write: config.swmr_write,
            serialization_in_progress: false,
        }
    }

    pub fn store(&self) -> &Arc<dyn ByteStore> {
        &self.store
    }

    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    pub fn ring_count(&self) -> usize {
        self.ring_count
    }

    pub fn index_size(&self) -> usize {
        self.index_size
    }

    pub fn index_len(&self) -> usize {
        self.arena.len()
    }

    fn class_of(&self, class_id: u32) -> Result<Arc<dyn CacheableClass>> {
        self.classes
            .get(class_id)
            .ok_or_else(|| Error::Corrupt { field: "class_id", detail: format!("unregistered class {class_id}") })
    }

    pub fn entry(&self, handle: Handle) -> Result<&Entry> {
        self.arena.get(handle).ok_or(Error::NotFound(Address::UNDEF))
    }

    pub fn entry_mut(&mut self, handle: Handle) -> Result<&mut Entry> {
        self.arena.get_mut(handle).ok_or(Error::NotFound(Address::UNDEF))
    }

    pub fn handle_for(&mut self, addr: Address) -> Option<Handle> {
        self.index.get(addr)
    }

    /// `insert(addr, class_id, in_core, size, ring, flags) → ()` (spec
    /// §4.1.1). The entry is new; no on-disk image exists yet.
    pub fn insert(
        &mut self,
        addr: Address,
        class_id: u32,
        body: Body,
        size: usize,
        ring: Ring,
        flags: InsertFlags,
    ) -> Result<Handle> {
        if self.index.contains(addr) {
            return Err(Error::AlreadyExists(addr));
        }
        self.make_room_for(size)?;

        let mut entry = Entry::new(addr, class_id, ring, size, body);
        entry.flags.insert(entry::Flags::DIRTY | entry::Flags::IN_SLIST);
        let handle = self.arena.insert(entry);
        self.index.insert(addr, handle);
        self.dirty.insert(addr, handle);
        self.index_size += size;
        self.stats.insertions += 1;

        self.lru_push_front(handle);
        if flags.contains(InsertFlags::PIN) {
            self.pin(handle)?;
        }
        self.call_notify(handle, NotifyAction::Insert)?;
        self.propagate_dirtied(handle)?;
        Ok(handle)
    }

    /// `protect(addr, class_id, udata, flags) → &mut Entry` (spec
    /// §4.1.1). A miss fetches the image from the store and calls
    /// `deserialize`. Returns a `Handle`; callers reach the entry via
    /// [`Cache::entry_mut`] until the matching `unprotect`.
    pub fn protect(
        &mut self,
        addr: Address,
        class_id: u32,
        udata: UserData<'_>,
        flags: ProtectFlags,
    ) -> Result<Handle> {
        self.stats.read_attempts += 1;
        let handle = if let Some(handle) = self.index.get(addr) {
            self.stats.hits += 1;
            let is_prefetched = self.arena.get(handle).map(|e| e.class_id) == Some(crate::format::class_id::PREFETCHED);
            if is_prefetched {
                self.rebind_prefetched(handle, class_id, udata)?;
            }
            handle
        } else {
            self.stats.misses += 1;
            self.load_from_store(addr, class_id, udata)?
        };

        let write = flags.contains(ProtectFlags::WRITE) && !flags.contains(ProtectFlags::READ_ONLY);
        {
            let entry = self.entry_mut(handle)?;
            if entry.write_protected || (write && entry.read_protect_count > 0) {
                return Err(Error::Protected(addr));
            }
            if write {
                entry.write_protected = true;
            } else {
                entry.read_protect_count += 1;
            }
        }
        self.protected
            .entry(handle)
            .and_modify(|r| {
                r.write = r.write || write;
                r.read_count += if write { 0 } else { 1 };
            })
            .or_insert(ProtectRecord { write, read_count: if write { 0 } else { 1 } });

        self.lru_remove(handle);
        Ok(handle)
    }

    fn load_from_store(&mut self, addr: Address, class_id: u32, udata: UserData<'_>) -> Result<Handle> {
        let class = self.class_of(class_id)?;
        let initial_size = class.initial_image_size(udata);
        let image = self.store.read(addr.as_u64(), initial_size as u64)?;
        if !class.verify_checksum(&image) {
            return Err(Error::ChecksumMismatch { addr, class: class_id });
        }
        let body = class.deserialize(&image, addr, udata)?;
        let size = class.image_size(&body);

        self.make_room_for(size)?;
        let mut entry = Entry::new(addr, class_id, 0, size, body);
        entry.flags.insert(entry::Flags::IMAGE_UP_TO_DATE);
        let handle = self.arena.insert(entry);
        self.index.insert(addr, handle);
        self.index_size += size;
        self.lru_push_front(handle);
        self.call_notify(handle, NotifyAction::Load)?;
        Ok(handle)
    }

    fn rebind_prefetched(&mut self, handle: Handle, class_id: u32, udata: UserData<'_>) -> Result<()> {
        let class = self.class_of(class_id)?;
        let image = {
            let entry = self.entry(handle)?;
            entry
                .body
                .as_ref()
                .and_then(|b| b.downcast_ref::<Vec<u8>>())
                .cloned()
                .ok_or_else(|| Error::corrupt("prefetch_body", "prefetched body is not a raw image"))?
        };
        let addr = self.entry(handle)?.addr;
        let body = class.deserialize(&image, addr, udata)?;
        let entry = self.entry_mut(handle)?;
        entry.body = Some(body);
        entry.class_id = class_id;
        entry.prefetch_type_id = None;
        entry.flags.remove(entry::Flags::PREFETCHED);
        self.stats.prefetch_hits += 1;
        Ok(())
    }

    /// `unprotect(addr, flags) → ()` (spec §4.1.1).
    pub fn unprotect(&mut self, handle: Handle, flags: UnprotectFlags) -> Result<()> {
        let write = {
            let record = self.protected.get_mut(&handle).ok_or(Error::NotFound(Address::UNDEF))?;
            let write = record.write;
            if write {
                record.write = false;
            } else if record.read_count > 0 {
                record.read_count -= 1;
            }
            if !record.write && record.read_count == 0 {
                self.protected.remove(&handle);
            }
            write
        };

        {
            let entry = self.entry_mut(handle)?;
            if write {
                entry.write_protected = false;
            } else if entry.read_protect_count > 0 {
                entry.read_protect_count -= 1;
            }
        }

        if flags.contains(UnprotectFlags::DELETED) {
            return self.expunge(handle, None);
        }

        let became_dirty = flags.contains(UnprotectFlags::DIRTIED);
        if became_dirty {
            self.mark_dirty(handle)?;
        }
        if flags.contains(UnprotectFlags::SIZE_CHANGED) {
            // caller is expected to have already called resize_entry
        }
        if flags.contains(UnprotectFlags::PIN) {
            self.pin(handle)?;
        }
        if flags.contains(UnprotectFlags::UNPIN) {
            self.unpin(handle)?;
        }

        if !self.entry(handle)?.is_protected() {
            self.lru_push_front(handle);
        }
        Ok(())
    }

    fn mark_dirty(&mut self, handle: Handle) -> Result<()> {
        let addr = {
            let entry = self.entry_mut(handle)?;
            if entry.is_dirty() {
                return Ok(());
            }
            entry.flags.insert(entry::Flags::DIRTY | entry::Flags::IN_SLIST);
            entry.addr
        };
        self.dirty.insert(addr, handle);
        self.call_notify(handle, NotifyAction::Dirtied)?;
        self.propagate_dirtied(handle)?;
        Ok(())
    }

    fn propagate_dirtied(&mut self, handle: Handle) -> Result<()> {
        let parents = self.entry(handle)?.flush_dep.parents.clone();
        for parent in parents {
            if let Some(p) = self.arena.get_mut(parent) {
                p.flush_dep.n_dirty_children += 1;
            }
            self.call_notify(parent, NotifyAction::ChildDirtied)?;
        }
        Ok(())
    }

    /// `pin(addr)` (spec §4.1.1): client-side pin independent of
    /// protection.
    pub fn pin(&mut self, handle: Handle) -> Result<()> {
        let entry = self.entry_mut(handle)?;
        if !entry.flags.contains(entry::Flags::PINNED_FROM_CLIENT) {
            entry.flags.insert(entry::Flags::PINNED_FROM_CLIENT);
            self.lru_remove(handle);
            self.pinned.insert(handle);
        }
        Ok(())
    }

    /// `unpin(addr)` (spec §4.1.1).
    pub fn unpin(&mut self, handle: Handle) -> Result<()> {
        let should_relist = {
            let entry = self.entry_mut(handle)?;
            if entry.flags.contains(entry::Flags::PINNED_FROM_CLIENT) {
                entry.flags.remove(entry::Flags::PINNED_FROM_CLIENT);
                true
            } else {
                false
            }
        };
        if should_relist {
            self.pinned.remove(&handle);
            if !self.entry(handle)?.is_pinned() && !self.entry(handle)?.is_protected() {
                self.lru_push_front(handle);
            }
        }
        Ok(())
    }

    /// `move_entry(old_addr, new_addr)` (spec §4.1.1): changes the hash
    /// and dirty-list keys atomically.
    pub fn move_entry(&mut self, old_addr: Address, new_addr: Address) -> Result<()> {
        if self.index.contains(new_addr) {
            return Err(Error::AlreadyExists(new_addr));
        }
        let handle = self.index.get(old_addr).ok_or(Error::NotFound(old_addr))?;
        self.index.remove(old_addr);
        self.index.insert(new_addr, handle);

        let was_dirty = self.entry(handle)?.is_dirty();
        if was_dirty {
            self.dirty.remove(old_addr);
        }
        let entry = self.entry_mut(handle)?;
        entry.addr = new_addr;
        if was_dirty {
            self.dirty.insert(new_addr, handle);
        }
        Ok(())
    }

    /// `resize_entry(addr, new_size)` (spec §4.1.1).
    pub fn resize_entry(&mut self, handle: Handle, new_size: usize) -> Result<()> {
        let old_size = self.entry(handle)?.size;
        if new_size > old_size {
            self.make_room_for(new_size - old_size)?;
        }
        self.entry_mut(handle)?.size = new_size;
        self.index_size = self.index_size - old_size + new_size;
        Ok(())
    }

    /// `expunge(addr, free_bytes?)` (spec §4.1.1): forcibly evict,
    /// optionally freeing file-space bytes.
    pub fn expunge(&mut self, handle: Handle, free_bytes: Option<u64>) -> Result<()> {
        if self.entry(handle)?.is_protected() {
            return Err(Error::Protected(self.entry(handle)?.addr));
        }
        self.detach_entry(handle)?;
        let _ = free_bytes; // byte-store reclamation is a client concern above this layer
        Ok(())
    }

    /// Tear an entry out of every intrusive structure and hand its body
    /// back to the class for `free_in_core` (spec §3.2 destruction
    /// steps 2-3; step 1, the flush, is the caller's responsibility
    /// before calling this for a dirty entry).
    pub(crate) fn detach_entry(&mut self, handle: Handle) -> Result<()> {
        self.call_notify(handle, NotifyAction::BeforeEvict)?;

        let (addr, size, class_id, tag) = {
            let entry = self.entry(handle)?;
            (entry.addr, entry.size, entry.class_id, entry.tag)
        };

        self.lru_remove(handle);
        self.pinned.remove(&handle);
        self.protected.remove(&handle);
        self.index.remove(addr);
        self.dirty.remove(addr);
        if let Some(tag) = tag {
            self.tags.remove_member(tag, handle);
        }
        self.index_size -= size;

        if let Some(entry) = self.arena.remove(handle) {
            if let Some(body) = entry.body {
                if let Ok(class) = self.class_of(class_id) {
                    class.free_in_core(body);
                }
            }
        }
        Ok(())
    }

    /// `flush_dep_create(parent, child)` (spec §4.1.1, §4.1.5).
    pub fn flush_dep_create(&mut self, parent: Handle, child: Handle) -> Result<()> {
        if flushdep::would_cycle(&self.arena, parent, child) {
            let p = self.entry(parent)?.addr;
            let c = self.entry(child)?.addr;
            return Err(Error::DependencyCycle { parent: p, child: c });
        }
        {
            let child_entry = self.entry_mut(child)?;
            if !child_entry.flush_dep.parents.contains(&parent) {
                child_entry.flush_dep.parents.push(parent);
            }
        }
        let child_dirty = self.entry(child)?.is_dirty();
        let child_unserialized = !self.entry(child)?.flags.contains(entry::Flags::IMAGE_UP_TO_DATE);
        let parent_entry = self.entry_mut(parent)?;
        parent_entry.flush_dep.n_children += 1;
        if child_dirty {
            parent_entry.flush_dep.n_dirty_children += 1;
        }
        if child_unserialized {
            parent_entry.flush_dep.n_unserialized_children += 1;
        }
        Ok(())
    }

    /// `flush_dep_destroy(parent, child)` (spec §4.1.1).
    pub fn flush_dep_destroy(&mut self, parent: Handle, child: Handle) -> Result<()> {
        let (child_dirty, child_unserialized) = {
            let c = self.entry(child)?;
            (c.is_dirty(), !c.flags.contains(entry::Flags::IMAGE_UP_TO_DATE))
        };
        {
            let child_entry = self.entry_mut(child)?;
            child_entry.flush_dep.parents.retain(|&p| p != parent);
        }
        let parent_entry = self.entry_mut(parent)?;
        parent_entry.flush_dep.n_children = parent_entry.flush_dep.n_children.saturating_sub(1);
        if child_dirty {
            parent_entry.flush_dep.n_dirty_children = parent_entry.flush_dep.n_dirty_children.saturating_sub(1);
        }
        if child_unserialized {
            parent_entry.flush_dep.n_unserialized_children =
                parent_entry.flush_dep.n_unserialized_children.saturating_sub(1);
        }
        Ok(())
    }

    /// Allocate a zero-size proxy entry used as a shared flush-dep
    /// parent for a client subtree (spec §4.1.6 "top-proxy").
    pub fn create_proxy(&mut self, addr: Address, ring: Ring) -> Handle {
        let mut entry = Entry::new(addr, crate::format::class_id::PREFETCHED, ring, 0, Box::new(()));
        entry.flags.insert(entry::Flags::IMAGE_UP_TO_DATE);
        let handle = self.arena.insert(entry);
        self.index.insert(addr, handle);
        handle
    }

    pub fn set_evictions_enabled(&mut self, enabled: bool) {
        self.evictions_enabled = enabled;
    }

    pub fn evictions_enabled(&self) -> bool {
        self.evictions_enabled
    }

    pub fn swmr_write(&self) -> bool {
        self.swmr_write
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut CacheStats {
        &mut self.stats
    }

    pub fn get_serialization_in_progress(&self) -> bool {
        self.serialization_in_progress
    }

    /// `cache_is_clean(inner_ring)` (spec §4.1.1): true iff no entry in
    /// `inner_ring` or any more-inner ring is dirty.
    pub fn cache_is_clean(&self, inner_ring: Ring) -> bool {
        self.arena.iter().all(|(_, e)| e.ring < inner_ring || !e.is_dirty())
    }

    /// Tag an entry so `flush(Tagged(tag))` can find it without a full
    /// index walk (spec §4.1.6).
    pub fn set_tag(&mut self, handle: Handle, tag: EntryTag) -> Result<()> {
        self.entry_mut(handle)?.tag = Some(tag);
        self.tags.add_member(tag, handle);
        Ok(())
    }

    pub fn set_corked(&mut self, tag: EntryTag, corked: bool) -> Result<()> {
        self.tags.set_corked(tag, corked);
        if corked {
            for handle in self.tags.members(tag).collect::<Vec<_>>() {
                self.pin(handle)?;
            }
        } else {
            for handle in self.tags.members(tag).collect::<Vec<_>>() {
                self.unpin(handle)?;
            }
        }
        Ok(())
    }

    pub fn is_corked(&self, tag: EntryTag) -> bool {
        self.tags.is_corked(tag)
    }

    /// `dump(name)` (spec §4.1.1, debug): a human-readable snapshot,
    /// grounded on HDF5's `H5Cdbg.c` line-per-entry report.
    pub fn dump(&self, name: &str) -> String {
        let mut out = format!(
            "cache `{name}`: {} entries, {} bytes (budget {})\n",
            self.arena.len(),
            self.index_size,
            self.max_cache_size
        );
        for (handle, entry) in self.arena.iter() {
            out.push_str(&format!(
                "  {handle} addr={} class={} ring={} size={} dirty={} pinned={} protected={}\n",
                entry.addr,
                entry.class_id,
                entry.ring,
                entry.size,
                entry.is_dirty(),
                entry.is_pinned(),
                entry.is_protected(),
            ));
        }
        out
    }

    /// `validate()` (spec §4.1.1, debug): checks the invariants named in
    /// spec §3.1's Cache row.
    pub fn validate(&self) -> Result<()> {
        let mut computed_size = 0usize;
        let mut computed_len = 0usize;
        for (_, entry) in self.arena.iter() {
            computed_size += entry.size;
            computed_len += 1;
            if entry.is_protected() && entry.is_evictable() {
                return Err(Error::corrupt("entry", "protected entry reported evictable"));
            }
            if entry.is_dirty() && self.dirty.is_enabled() && !self.dirty.contains(entry.addr) {
                return Err(Error::corrupt("dirty_list", "dirty entry missing from dirty list"));
            }
        }
        if computed_size != self.index_size {
            return Err(Error::corrupt(
                "index_size",
                format!("tracked {} but entries sum to {computed_size}", self.index_size),
            ));
        }
        if computed_len != self.arena.len() {
            return Err(Error::corrupt("index_len", "arena length mismatch"));
        }
        Ok(())
    }

    /// Take the body out of an entry, hand it to its class's `notify`
    /// along with `&mut self`, then put it back. This is the only place
    /// a class callback ever observes `&mut Cache` (spec §9 "Class
    /// vtables" design note) — doing it this way sidesteps the
    /// simultaneous `&mut Cache` / `&mut Entry` borrow that a direct
    /// call would require.
    pub(crate) fn call_notify(&mut self, handle: Handle, action: NotifyAction) -> Result<()> {
        let (class_id, addr, body) = {
            let entry = match self.arena.get_mut(handle) {
                Some(e) => e,
                None => return Ok(()),
            };
            let body = entry.body.take();
            (entry.class_id, entry.addr, body)
        };
        let Some(mut body) = body else { return Ok(()) };
        let class = self.class_of(class_id)?;
        let result = class.notify(action, self, addr, &mut body);
        if let Some(entry) = self.arena.get_mut(handle) {
            entry.body = Some(body);
        }
        result
    }

    /// Grow room for `additional` bytes, running MSIC if the budget
    /// would be exceeded (spec §4.1.3).
    pub(crate) fn make_room_for(&mut self, additional: usize) -> Result<()> {
        if !self.evictions_enabled {
            return Ok(());
        }
        if let Some(ctl) = &self.autosize {
            if let Some(report) = ctl.consider_flash_increase(self.max_cache_size, self.min_clean_size, additional)
            {
                self.max_cache_size = report.new_max;
            }
        }
        if self.index_size + additional <= self.max_cache_size {
            return Ok(());
        }
        self.run_msic(self.index_size + additional)
    }

    /// Sample the auto-resize controller if an epoch has elapsed (spec
    /// §4.1.7). Call after recording an access.
    pub fn maybe_resample_autosize(&mut self) {
        let due = matches!(&self.autosize, Some(ctl) if ctl.due_for_sample());
        if !due {
            return;
        }
        if let Some(ctl) = &mut self.autosize {
            let report = ctl.sample(self.max_cache_size, self.min_clean_size);
            self.max_cache_size = report.new_max;
            self.min_clean_size = report.new_min_clean;
        }
    }

    pub fn autosize_config(&self) -> Option<&AutoResizeConfig> {
        self.autosize_cfg.as_ref()
    }
}
