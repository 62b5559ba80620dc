//! Extensible array (`ea`) and fixed array (`fa`): paged, on-disk index
//! structures built entirely as clients of the metadata cache (spec
//! §4.2, §4.3).
//!
//! Both register their block kinds as cache classes and do all of their
//! I/O through `Cache::protect`/`insert`/`unprotect` — neither module
//! touches a `ByteStore` except to allocate a header's initial address.

pub mod ea;
pub mod fa;

use crate::cache::Address;
use crate::store::ByteStore;

/// Bump-allocate `size` bytes at the current end-of-allocated-space
/// pointer. Neither array structure implements its own free-space
/// manager; `delete` simply stops referencing the bytes; reclaiming
/// them is the owning file format's concern, not this crate's (spec's
/// fsf_size hook exists precisely so a real free-space manager can do
/// that reclamation above this layer).
pub(crate) fn bump_alloc(store: &dyn ByteStore, size: u64) -> crate::Result<Address> {
    let addr = store.get_eoa()?;
    store.set_eoa(Address::new(addr.as_u64() + size))?;
    Ok(addr)
}
