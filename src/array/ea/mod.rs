//! Extensible array: a paged, on-disk index structure whose element
//! count may grow without bound, built entirely as a client of the
//! metadata cache (spec §4.2).

pub mod data_block;
pub mod handle;
pub mod header;
pub mod index_block;
pub mod page;
pub mod super_block;

pub use handle::EaHandle;
pub use header::{EaLayout, Location, SblkInfo};

use std::sync::Arc;

use crate::cache::ClassRegistry;
use crate::format::class_id;

/// Register every extensible-array block class with a cache's registry.
/// Must be called once before any `create`/`open` against that cache
/// (spec §2 item 2).
pub fn register_classes(registry: &mut ClassRegistry) {
    registry.register(Arc::new(header::EaHeaderClass));
    registry.register(Arc::new(index_block::EaIndexBlockClass));
    registry.register(Arc::new(super_block::EaSuperBlockClass));
    registry.register(Arc::new(data_block::EaDataBlockClass));
    registry.register(Arc::new(page::EaDataBlockPageClass));
    debug_assert!(registry.get(class_id::EA_HEADER).is_some());
}
