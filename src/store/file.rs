//! A local, sec2-style byte store: a single `std::fs::File` protected by
//! a lock, addressed by absolute byte offset (spec §4 "byte store").
//!
//! Grounded on the teacher's disk manager: one file handle, explicit
//! `seek`+`read_exact`/`write_all` pairs, and a coarse mutex rather than
//! per-region locking, since metadata I/O here is never large enough to
//! benefit from finer-grained concurrency.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::cache::Address;
use crate::store::ByteStore;
use crate::Error;

pub struct FileStore {
    file: Mutex<File>,
    eoa: AtomicU64,
    locked: Mutex<bool>,
}

impl FileStore {
    pub fn open(path: impl AsRef<Path>) -> crate::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).create(true).open(path.as_ref())?;
        let len = file.metadata()?.len();
        Ok(Self { file: Mutex::new(file), eoa: AtomicU64::new(len), locked: Mutex::new(false) })
    }

    pub fn create_new(path: impl AsRef<Path>) -> crate::Result<Self> {
        let file =
            OpenOptions::new().read(true).write(true).create(true).truncate(true).open(path.as_ref())?;
        Ok(Self { file: Mutex::new(file), eoa: AtomicU64::new(0), locked: Mutex::new(false) })
    }
}

impl ByteStore for FileStore {
    fn read(&self, off: u64, len: u64) -> crate::Result<Vec<u8>> {
        let mut buf = vec![0u8; len as usize];
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(off)).map_err(|e| Error::ReadFailed {
            offset: off,
            len,
            detail: e.to_string(),
        })?;
        match file.read_exact(&mut buf) {
            Ok(()) => Ok(buf),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(Error::EndOfFile(off))
            }
            Err(e) => Err(Error::ReadFailed { offset: off, len, detail: e.to_string() }),
        }
    }

    fn write(&self, off: u64, data: &[u8]) -> crate::Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(off)).map_err(|e| Error::WriteFailed {
            offset: off,
            len: data.len() as u64,
            detail: e.to_string(),
        })?;
        file.write_all(data).map_err(|e| Error::WriteFailed {
            offset: off,
            len: data.len() as u64,
            detail: e.to_string(),
        })?;
        let end = off + data.len() as u64;
        self.eoa.fetch_max(end, Ordering::SeqCst);
        Ok(())
    }

    fn get_eoa(&self) -> crate::Result<Address> {
        Ok(Address::new(self.eoa.load(Ordering::SeqCst)))
    }

    fn set_eoa(&self, addr: Address) -> crate::Result<()> {
        self.eoa.store(addr.as_u64(), Ordering::SeqCst);
        Ok(())
    }

    fn truncate(&self) -> crate::Result<()> {
        let file = self.file.lock();
        file.set_len(self.eoa.load(Ordering::SeqCst))?;
        Ok(())
    }

    fn lock(&self, exclusive: bool) -> crate::Result<()> {
        let mut locked = self.locked.lock();
        if *locked {
            return Err(Error::LockBusy("file store already locked".into()));
        }
        *locked = true;
        tracing::debug!(exclusive, "file store locked");
        Ok(())
    }

    fn unlock(&self) -> crate::Result<()> {
        *self.locked.lock() = false;
        Ok(())
    }
}
