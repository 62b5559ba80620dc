//! On-disk framing shared by every metadata block (spec §6).
//!
//! Every block starts with a 4-byte magic, a 1-byte version, an optional
//! 1-byte class id, a body, and ends with a 4-byte little-endian
//! checksum over everything before it.

pub mod checksum;
pub mod dataspace;
pub mod fill;
pub mod fsinfo;

/// Fixed 8-byte file signature (spec §6).
pub const FILE_SIGNATURE: [u8; 8] = [0x89, b'H', b'D', b'F', b'\r', b'\n', 0x1a, b'\n'];

/// 4-byte magics for the extensible-array block kinds (spec §4.2.4).
pub mod magic {
    pub const EA_HEADER: [u8; 4] = *b"EAHD";
    pub const EA_INDEX_BLOCK: [u8; 4] = *b"EAIB";
    pub const EA_SUPER_BLOCK: [u8; 4] = *b"EASB";
    pub const EA_DATA_BLOCK: [u8; 4] = *b"EADB";
    pub const EA_DATA_BLOCK_PAGE: [u8; 4] = *b"EADP";

    pub const FA_HEADER: [u8; 4] = *b"FAHD";
    pub const FA_DATA_BLOCK: [u8; 4] = *b"FADB";
    pub const FA_DATA_BLOCK_PAGE: [u8; 4] = *b"FADP";
}

/// Class ids for the serialization registry (spec §2 item 2). Values for
/// the array classes this crate implements; the remainder of the id
/// space is reserved for out-of-scope clients (superblock, object
/// header, group B-tree node, local heap, …).
pub mod class_id {
    pub const EA_HEADER: u32 = 20;
    pub const EA_INDEX_BLOCK: u32 = 21;
    pub const EA_SUPER_BLOCK: u32 = 22;
    pub const EA_DATA_BLOCK: u32 = 23;
    pub const EA_DATA_BLOCK_PAGE: u32 = 24;

    pub const FA_HEADER: u32 = 30;
    pub const FA_DATA_BLOCK: u32 = 31;
    pub const FA_DATA_BLOCK_PAGE: u32 = 32;

    /// Reserved for cache-image prefetch staging (spec §4.1.9).
    pub const PREFETCHED: u32 = 0;
}

/// Format-version bounds: a message's encoded version must fall within
/// the file's configured `[low, high]` bound (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionBounds {
    pub low: u8,
    pub high: u8,
}

impl VersionBounds {
    pub const ANY: VersionBounds = VersionBounds { low: 0, high: u8::MAX };

    pub fn check(&self, version: u8) -> crate::Result<()> {
        if version < self.low || version > self.high {
            return Err(crate::Error::BadRange { version, low: self.low, high: self.high });
        }
        Ok(())
    }
}

/// Helper for building an on-disk image: magic + version + optional
/// class id + body + checksum.
pub struct ImageWriter {
    buf: Vec<u8>,
}

impl ImageWriter {
    pub fn new(magic: [u8; 4], version: u8) -> Self {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(&magic);
        buf.push(version);
        Self { buf }
    }

    pub fn push_class_id(&mut self, class_id: u8) -> &mut Self {
        self.buf.push(class_id);
        self
    }

    pub fn put_u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn put_u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn put_u64(&mut self, v: u64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn put_addr(&mut self, v: crate::cache::Address) -> &mut Self {
        self.put_u64(v.as_u64())
    }

    pub fn put_bytes(&mut self, v: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(v);
        self
    }

    /// Append the checksum over everything written so far and return the
    /// finished image.
    pub fn finish(mut self) -> Vec<u8> {
        let sum = checksum::checksum(&self.buf);
        self.buf.extend_from_slice(&sum.to_le_bytes());
        self.buf
    }
}

/// Cursor over an on-disk image used by `deserialize` implementations.
pub struct ImageReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ImageReader<'a> {
    /// Validate magic, verify the checksum, and return a reader
    /// positioned after the magic+version(+class) header is consumed by
    /// the caller via `expect_magic`/`read_u8`.
    pub fn new(data: &'a [u8], addr: crate::cache::Address) -> crate::Result<Self> {
        if !checksum::verify(data) {
            return Err(crate::Error::ChecksumMismatch { addr, class: 0 });
        }
        Ok(Self { data, pos: 0 })
    }

    pub fn expect_magic(&mut self, expected: [u8; 4], addr: crate::cache::Address) -> crate::Result<()> {
        let found: [u8; 4] = self.data.get(0..4).ok_or(crate::Error::EndOfFile(addr.as_u64()))?
            .try_into().unwrap();
        self.pos = 4;
        if found != expected {
            return Err(crate::Error::BadMagic { addr, expected, found });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> crate::Result<u8> {
        let b = *self.data.get(self.pos).ok_or(crate::Error::EndOfFile(self.pos as u64))?;
        self.pos += 1;
        Ok(b)
    }

    pub fn read_u32(&mut self) -> crate::Result<u32> {
        let bytes: [u8; 4] = self.data.get(self.pos..self.pos + 4)
            .ok_or(crate::Error::EndOfFile(self.pos as u64))?
            .try_into().unwrap();
        self.pos += 4;
        Ok(u32::from_le_bytes(bytes))
    }

    pub fn read_u64(&mut self) -> crate::Result<u64> {
        let bytes: [u8; 8] = self.data.get(self.pos..self.pos + 8)
            .ok_or(crate::Error::EndOfFile(self.pos as u64))?
            .try_into().unwrap();
        self.pos += 8;
        Ok(u64::from_le_bytes(bytes))
    }

    pub fn read_addr(&mut self) -> crate::Result<crate::cache::Address> {
        Ok(crate::cache::Address::new(self.read_u64()?))
    }

    pub fn read_bytes(&mut self, len: usize) -> crate::Result<&'a [u8]> {
        let out = self.data.get(self.pos..self.pos + len)
            .ok_or(crate::Error::EndOfFile(self.pos as u64))?;
        self.pos += len;
        Ok(out)
    }

    /// Bytes remaining, excluding the trailing 4-byte checksum.
    pub fn remaining_body(&self) -> usize {
        self.data.len().saturating_sub(4).saturating_sub(self.pos)
    }
}
