//! The in-core `Entry` record (spec §3.1).

use std::any::Any;

use crate::cache::address::Address;
use crate::cache::arena::Handle;
use crate::cache::ring::Ring;

/// Type-erased in-core representation owned by the cache between
/// `protect`/`unprotect`. The class that registered the entry's class id
/// is the only code that downcasts it.
pub type Body = Box<dyn Any + Send>;

/// Tag identifying the object (typically an object-header address) an
/// entry belongs to (spec §4.1.6).
pub type Tag = Address;

bitflags::bitflags! {
    /// Mirrors spec §3.1's entry flag set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Flags: u32 {
        const DIRTY              = 1 << 0;
        const PINNED_FROM_CLIENT = 1 << 1;
        const PINNED_FROM_CACHE  = 1 << 2;
        const IN_SLIST           = 1 << 3;
        const IMAGE_UP_TO_DATE   = 1 << 4;
        const PREFETCHED         = 1 << 5;
        const VISITED            = 1 << 6;
    }
}

/// Flush-dependency bookkeeping kept per entry (spec §4.1.5).
#[derive(Debug, Default, Clone)]
pub struct FlushDep {
    pub parents: Vec<Handle>,
    pub n_children: u32,
    pub n_dirty_children: u32,
    pub n_unserialized_children: u32,
}

impl FlushDep {
    pub fn is_ready_to_serialize(&self) -> bool {
        self.n_unserialized_children == 0
    }
}

/// An in-core metadata record keyed by byte offset in the file.
pub struct Entry {
    pub addr: Address,
    pub size: usize,
    pub class_id: u32,
    pub ring: Ring,
    pub flags: Flags,
    /// `None` while protected for writing by an external caller via
    /// `protect`; `Some(0)` when idle.
    pub read_protect_count: u32,
    pub write_protected: bool,
    pub flush_dep: FlushDep,
    pub tag: Option<Tag>,
    pub body: Option<Body>,

    // --- intrusive LRU links (spec §4.1.2 item 2) ---
    pub lru_prev: Option<Handle>,
    pub lru_next: Option<Handle>,
    pub in_lru: bool,

    /// Saved class id for a prefetched entry awaiting rebind (spec
    /// §4.1.9); `class_id` itself is `class_id::PREFETCHED` until then.
    pub prefetch_type_id: Option<u32>,

    /// Recorded reason the last MSIC pass skipped this entry, for
    /// `dump()`/debugging only.
    pub last_skip_reason: Option<&'static str>,
}

impl Entry {
    pub fn new(addr: Address, class_id: u32, ring: Ring, size: usize, body: Body) -> Self {
        Self {
            addr,
            size,
            class_id,
            ring,
            flags: Flags::empty(),
            read_protect_count: 0,
            write_protected: false,
            flush_dep: FlushDep::default(),
            tag: None,
            body: Some(body),
            lru_prev: None,
            lru_next: None,
            in_lru: false,
            prefetch_type_id: None,
            last_skip_reason: None,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.flags.contains(Flags::DIRTY)
    }

    pub fn is_pinned(&self) -> bool {
        self.flags.intersects(Flags::PINNED_FROM_CLIENT | Flags::PINNED_FROM_CACHE)
    }

    pub fn is_protected(&self) -> bool {
        self.write_protected || self.read_protect_count > 0
    }

    pub fn is_evictable(&self) -> bool {
        !self.is_protected() && !self.is_pinned()
    }
}
