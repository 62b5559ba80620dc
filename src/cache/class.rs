//! The serialization registry: a process-wide table mapping a class id
//! to a class vtable (spec §2 item 2, §4.1.1).
//!
//! Modeled as a trait object held in a registry keyed by class id (spec
//! §9 design note "Class vtables"), so the cache itself never knows the
//! body types; clients do.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::address::Address;
use crate::cache::entry::Body;

/// `notify` action kinds (spec §4.1.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyAction {
    Insert,
    Load,
    Flush,
    Dirtied,
    Cleaned,
    ChildDirtied,
    ChildCleaned,
    ChildUnserialized,
    ChildSerialized,
    BeforeEvict,
}

/// What a class's `pre_serialize` asks the cache to do before calling
/// `serialize` (spec §4.1.1's `pre_serialize (optional)`).
#[derive(Debug, Clone, Copy, Default)]
pub struct PreSerializeAction {
    pub new_size: Option<usize>,
    pub new_addr: Option<Address>,
}

impl PreSerializeAction {
    pub fn unchanged() -> Self {
        Self::default()
    }
}

/// Opaque construction/lookup context handed to `deserialize` and
/// `initial_image_size`; each class downcasts it to whatever its
/// `protect`/`insert` callers pass in.
pub type UserData<'a> = &'a (dyn Any + 'a);

/// The per-class-id vtable. `Cache` never dereferences an entry's body
/// except through these methods.
pub trait CacheableClass: Send + Sync {
    fn class_id(&self) -> u32;
    fn name(&self) -> &'static str;

    /// Size of the on-disk image for a brand-new entry, before anything
    /// has been written (spec §4.1.1).
    fn initial_image_size(&self, udata: UserData<'_>) -> usize;

    /// Size the image will occupy once fully flushed, if knowable ahead
    /// of `pre_serialize` (rarely needed; default: unknown).
    fn final_image_size(&self, _body: &Body) -> Option<usize> {
        None
    }

    /// Verify a freshly-read image's checksum before `deserialize` is
    /// trusted with it. Default delegates to the format's fixed
    /// checksum framing (spec §4.2.4).
    fn verify_checksum(&self, image: &[u8]) -> bool {
        crate::format::checksum::verify(image)
    }

    /// Turn a verified on-disk image into an in-core body.
    fn deserialize(&self, image: &[u8], addr: Address, udata: UserData<'_>) -> crate::Result<Body>;

    /// Current in-core image size (may differ across the entry's
    /// lifetime as it mutates).
    fn image_size(&self, body: &Body) -> usize;

    /// Called immediately before `serialize`; may request a resize
    /// and/or relocation, which the cache applies before calling
    /// `serialize`.
    fn pre_serialize(&self, _addr: Address, _body: &mut Body) -> crate::Result<PreSerializeAction> {
        Ok(PreSerializeAction::unchanged())
    }

    /// Encode the current in-core body into `buf` (which the cache will
    /// write to the byte store verbatim, including the trailing
    /// checksum the class itself appends).
    fn serialize(&self, addr: Address, body: &Body, buf: &mut Vec<u8>) -> crate::Result<()>;

    /// Flush-dependency and lifecycle notifications (spec §4.1.5). The
    /// default is a no-op; classes that participate in flush
    /// dependencies or SWMR override this.
    fn notify(
        &self,
        _action: NotifyAction,
        _cache: &mut crate::cache::Cache,
        _addr: Address,
        _body: &mut Body,
    ) -> crate::Result<()> {
        Ok(())
    }

    /// Release the in-core body. Must have torn down any flush
    /// dependencies via `notify(BeforeEvict, ..)` first; the cache
    /// enforces the call order, not this method.
    fn free_in_core(&self, _body: Body) {}

    /// File-space size for classes whose allocation spans more than the
    /// image itself (spec §4.3's fixed-array data block).
    fn fsf_size(&self, _body: &Body) -> Option<u64> {
        None
    }
}

/// Process-wide table mapping class id to vtable (spec §2 item 2).
#[derive(Default, Clone)]
pub struct ClassRegistry {
    classes: HashMap<u32, Arc<dyn CacheableClass>>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self { classes: HashMap::new() }
    }

    pub fn register(&mut self, class: Arc<dyn CacheableClass>) {
        self.classes.insert(class.class_id(), class);
    }

    pub fn get(&self, class_id: u32) -> Option<Arc<dyn CacheableClass>> {
        self.classes.get(&class_id).cloned()
    }
}
