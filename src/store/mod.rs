//! The byte-store contract (spec §2 item 1, §4.4, §4.5) and three
//! implementations: a local file (`file`), a read-only HTTP range-GET
//! store (`ros3`), and a fan-out writer (`splitter`).
//!
//! Everything above this module addresses bytes by `Address`; nothing
//! above it knows whether those bytes live in a file, over HTTP, or are
//! mirrored to several places at once.

pub mod file;
pub mod ros3;
pub mod splitter;

use crate::cache::Address;

pub use file::FileStore;
pub use ros3::Ros3Store;
pub use splitter::SplitterStore;

/// An opaque, seekable, byte-addressable medium (spec §2 item 1).
///
/// Implementations are free to be read-only (`ros3`); `write` and
/// `truncate` on such a store return `Error::WriteFailed`.
pub trait ByteStore: Send + Sync {
    /// Read exactly `len` bytes starting at `off`.
    fn read(&self, off: u64, len: u64) -> crate::Result<Vec<u8>>;

    /// Write `data` at `off`.
    fn write(&self, off: u64, data: &[u8]) -> crate::Result<()>;

    /// The end-of-allocated-space pointer: the first byte past the
    /// highest address this store has ever handed out.
    fn get_eoa(&self) -> crate::Result<Address>;

    /// Advance (or, for a fresh file, establish) the eoa pointer.
    fn set_eoa(&self, addr: Address) -> crate::Result<()>;

    /// Truncate the underlying medium to the current eoa.
    fn truncate(&self) -> crate::Result<()>;

    /// Advisory whole-file lock, held for the duration of a writer's
    /// session (spec §2 item 1 "advisory locking"). Returns `Ok(())`
    /// immediately for stores that don't support or need locking.
    fn lock(&self, exclusive: bool) -> crate::Result<()>;

    fn unlock(&self) -> crate::Result<()>;
}
