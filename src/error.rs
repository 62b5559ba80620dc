//! Error taxonomy for the cache, array, and byte-store layers.
//!
//! One variant per failure domain named in spec §7 (I/O, Format, State,
//! Resource, Client), each carrying structured detail rather than a bare
//! string wherever the spec names one.

use thiserror::Error;

use crate::cache::Address;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // --- I/O ---
    #[error("read failed at offset {offset} len {len}: {detail}")]
    ReadFailed { offset: u64, len: u64, detail: String },

    #[error("write failed at offset {offset} len {len}: {detail}")]
    WriteFailed { offset: u64, len: u64, detail: String },

    #[error("short read at offset {offset}: expected {expected} bytes, got {got}")]
    Truncated { offset: u64, expected: u64, got: u64 },

    #[error("unexpected end of file at offset {0}")]
    EndOfFile(u64),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    // --- Format ---
    #[error("bad magic at address {addr}: expected {expected:?}, found {found:?}")]
    BadMagic { addr: Address, expected: [u8; 4], found: [u8; 4] },

    #[error("unknown format version {version} for class {class} at address {addr}")]
    UnknownVersion { addr: Address, class: u32, version: u8 },

    #[error("checksum mismatch for class {class} at address {addr}")]
    ChecksumMismatch { addr: Address, class: u32 },

    #[error("corrupt metadata: field `{field}`: {detail}")]
    Corrupt { field: &'static str, detail: String },

    #[error("message version {version} is outside the file's format-version bounds [{low}, {high}]")]
    BadRange { version: u8, low: u8, high: u8 },

    // --- State ---
    #[error("no entry at address {0}")]
    NotFound(Address),

    #[error("entry already exists at address {0}")]
    AlreadyExists(Address),

    #[error("entry at address {0} is protected")]
    Protected(Address),

    #[error("cannot evict pinned entry at address {0}")]
    PinnedEvictAttempt(Address),

    #[error("flush-dependency cycle detected: parent {parent}, child {child}")]
    DependencyCycle { parent: Address, child: Address },

    #[error("serialization already in progress for address {0}")]
    SerializationInProgress(Address),

    // --- Resource ---
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    #[error("cache oversize: index holds {index_size} bytes against a budget of {max_size}")]
    Oversize { index_size: usize, max_size: usize },

    #[error("lock busy: {0}")]
    LockBusy(String),

    // --- Client ---
    #[error("flush failed for entry at {addr}: {source}")]
    FlushFailed { addr: Address, #[source] source: Box<Error> },

    #[error("serialize failed for class {class} at {addr}: {reason}")]
    SerializeFailed { addr: Address, class: u32, reason: String },

    #[error("callback `{class}` failed: {reason}")]
    CallbackFailed { class: u32, reason: String },
}

impl Error {
    pub fn corrupt(field: &'static str, detail: impl Into<String>) -> Self {
        Error::Corrupt { field, detail: detail.into() }
    }
}
