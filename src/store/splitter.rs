//! Fan-out byte store (spec §4.5): mirrors every write to a primary
//! store and zero or more secondary stores, surfacing secondary
//! failures as log entries rather than aborting the write. Reads are
//! always served from the primary.

use crate::store::ByteStore;
use crate::Error;

pub struct SplitterStore {
    primary: Box<dyn ByteStore>,
    secondaries: Vec<Box<dyn ByteStore>>,
    /// If true, a secondary (write-only channel) failure is logged and
    /// swallowed; if false, it's propagated as a fatal error (spec
    /// §4.5).
    ignore_wo_errs: bool,
}

impl SplitterStore {
    pub fn new(primary: Box<dyn ByteStore>, secondaries: Vec<Box<dyn ByteStore>>, ignore_wo_errs: bool) -> Self {
        Self { primary, secondaries, ignore_wo_errs }
    }
}

impl ByteStore for SplitterStore {
    fn read(&self, off: u64, len: u64) -> crate::Result<Vec<u8>> {
        self.primary.read(off, len)
    }

    fn write(&self, off: u64, data: &[u8]) -> crate::Result<()> {
        self.primary.write(off, data)?;
        for (i, secondary) in self.secondaries.iter().enumerate() {
            if let Err(e) = secondary.write(off, data) {
                if self.ignore_wo_errs {
                    tracing::warn!(secondary = i, offset = off, error = %e, "secondary store write failed, ignoring");
                } else {
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn get_eoa(&self) -> crate::Result<crate::cache::Address> {
        self.primary.get_eoa()
    }

    fn set_eoa(&self, addr: crate::cache::Address) -> crate::Result<()> {
        self.primary.set_eoa(addr)?;
        for (i, secondary) in self.secondaries.iter().enumerate() {
            if let Err(e) = secondary.set_eoa(addr) {
                tracing::warn!(secondary = i, error = %e, "secondary store set_eoa failed");
            }
        }
        Ok(())
    }

    fn truncate(&self) -> crate::Result<()> {
        self.primary.truncate()
    }

    fn lock(&self, exclusive: bool) -> crate::Result<()> {
        self.primary.lock(exclusive).map_err(|e| match e {
            Error::LockBusy(msg) => Error::LockBusy(msg),
            other => other,
        })
    }

    fn unlock(&self) -> crate::Result<()> {
        self.primary.unlock()
    }
}
