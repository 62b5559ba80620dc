//! Fixed array: a paged, on-disk index structure whose element count is
//! fixed at creation, built entirely as a client of the metadata cache
//! (spec §4.3).

pub mod data_block;
pub mod handle;
pub mod header;
pub mod page;

pub use handle::FaHandle;

use std::sync::Arc;

use crate::cache::ClassRegistry;
use crate::format::class_id;

/// Register every fixed-array block class with a cache's registry. Must
/// be called once before any `create`/`open` against that cache (spec
/// §2 item 2).
pub fn register_classes(registry: &mut ClassRegistry) {
    registry.register(Arc::new(header::FaHeaderClass));
    registry.register(Arc::new(data_block::FaDataBlockClass));
    registry.register(Arc::new(page::FaDataBlockPageClass));
    debug_assert!(registry.get(class_id::FA_HEADER).is_some());
}
